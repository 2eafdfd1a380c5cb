//! Request handlers
//!
//! - `GET|POST /get_package` - zip archive for one package
//! - `POST /get_modules` - module tables for several packages
//! - `GET /health`

use super::error::ApiError;
use super::AppState;
use crate::errors::RelayError;
use crate::pipeline::{extract_modules, FetchOutcome};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub const X_ARTIFACT_SHA256: HeaderName = HeaderName::from_static("x-artifact-sha256");

/// Parameters of `/get_package`, from the query string or a JSON body
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PackageRequest {
    #[serde(default, alias = "name")]
    pub package: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub force: Option<bool>,
}

impl PackageRequest {
    /// Required fields, checked before any index access
    fn required(&self) -> Result<(&str, &str), RelayError> {
        let package = self
            .package
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RelayError::InvalidRequest("missing 'package' parameter".to_string()))?;
        let tags = self
            .tags
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::InvalidRequest("missing 'tags' parameter".to_string()))?;
        Ok((package, tags))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRequestItem {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesRequest {
    pub packages: Vec<ModuleRequestItem>,
    #[serde(default)]
    pub tags: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Extractor rejections become `InvalidRequest` so they share the error body
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, RelayError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| RelayError::InvalidRequest(rejection.body_text()))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, RelayError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| RelayError::InvalidRequest(rejection.body_text()))
}

pub async fn get_package_query(
    State(state): State<AppState>,
    query: Result<Query<PackageRequest>, QueryRejection>,
) -> Result<Response, ApiError> {
    let request = query_params(query)?;
    serve_package(&state, &request).await
}

pub async fn get_package_json(
    State(state): State<AppState>,
    body: Result<Json<PackageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(body)?;
    serve_package(&state, &request).await
}

async fn serve_package(state: &AppState, request: &PackageRequest) -> Result<Response, ApiError> {
    let (package, tags) = request.required()?;
    let version = request.version.as_deref().filter(|v| !v.is_empty());

    let outcome = state
        .pipeline
        .resolve_and_fetch(package, version, tags, request.force.unwrap_or(false))
        .await?;

    Ok(archive_response(outcome))
}

fn archive_response(outcome: FetchOutcome) -> Response {
    let disposition = format!("attachment; filename=\"{}.zip\"", outcome.package);
    let mut response = (StatusCode::OK, outcome.bytes).into_response();
    let headers = response.headers_mut();

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        X_CACHE,
        HeaderValue::from_static(if outcome.cache_hit { "hit" } else { "miss" }),
    );
    if let Ok(value) = HeaderValue::from_str(&outcome.sha256) {
        headers.insert(X_ARTIFACT_SHA256, value);
    }
    response
}

pub async fn get_modules(
    State(state): State<AppState>,
    query: Result<Query<ForceQuery>, QueryRejection>,
    body: Result<Json<ModulesRequest>, JsonRejection>,
) -> Result<Json<BTreeMap<String, BTreeMap<String, String>>>, ApiError> {
    let query = query_params(query)?;
    let request = json_body(body)?;
    let tags = request
        .tags
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| state.host_tags.to_wire());
    let force = query.force.unwrap_or(false);

    let mut tables = BTreeMap::new();
    for item in &request.packages {
        let outcome = state
            .pipeline
            .resolve_and_fetch(&item.name, item.version.as_deref(), &tags, force)
            .await?;
        let bytes = outcome.bytes;
        let modules = tokio::task::spawn_blocking(move || extract_modules(&bytes))
            .await
            .map_err(|e| RelayError::Archive(format!("module extraction task failed: {}", e)))??;
        tracing::debug!(package = %item.name, modules = modules.len(), "extracted modules");
        tables.insert(item.name.clone(), modules);
    }

    Ok(Json(tables))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}
