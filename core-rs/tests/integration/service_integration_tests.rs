//! HTTP Service Integration Tests
//!
//! Exercises the axum router in-process with `tower::ServiceExt::oneshot`,
//! and the client importer against a live listener on an ephemeral port.

#[path = "../common/mod.rs"]
mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::*;
use http_body_util::BodyExt;
use pkgrelay_core::client::{LoadedPackages, ModuleTable, ModuleTableLoader, RemoteImporter};
use pkgrelay_core::matcher::MatchPolicy;
use pkgrelay_core::server::{app, AppState, ErrorBody};
use pkgrelay_core::tags::TagSet;
use pkgrelay_core::{ContentCache, FetchPipeline};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn test_app() -> (TempDir, Arc<FakeIndex>, Router) {
    let temp = TempDir::new().unwrap();
    let cache = ContentCache::new(temp.path()).unwrap();
    let index = Arc::new(sample_index());
    let pipeline = FetchPipeline::new(index.clone(), cache, MatchPolicy::IndexOrder);
    let host_tags: TagSet = "cp39-cp39-manylinux_2_28_x86_64,py3-none-any".parse().unwrap();
    (temp, index, app(AppState::new(pipeline, host_tags)))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

fn package_uri(query: &str) -> String {
    format!("/get_package?{}", query)
}

const SAMPLE_QUERY: &str = "package=samplepkg&tags=cp39-cp39-manylinux_2_28_x86_64%2Cpy3-none-any";

#[tokio::test]
async fn test_get_package_returns_zip_with_headers() {
    let (_temp, index, app) = test_app();

    let response = app.clone().oneshot(get(&package_uri(SAMPLE_QUERY))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"samplepkg.zip\""
    );
    assert_eq!(headers["x-cache"], "miss");

    let bytes = body_bytes(response).await;
    assert_eq!(
        headers["x-artifact-sha256"].to_str().unwrap(),
        pkgrelay_core::artifact::sha256_hex(&bytes)
    );
    assert!(zip_names(&bytes).contains(&"samplepkg/core.py".to_string()));

    let again = app.oneshot(get(&package_uri(SAMPLE_QUERY))).await.unwrap();
    assert_eq!(again.headers()["x-cache"], "hit");
    assert_eq!(body_bytes(again).await, bytes);
    assert_eq!(index.downloads(), 1);
}

#[tokio::test]
async fn test_name_is_accepted_for_package() {
    let (_temp, _index, app) = test_app();
    let response = app
        .oneshot(get("/get_package?name=purepkg&tags=py3-none-any"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_post_get_package() {
    let (_temp, _index, app) = test_app();
    let response = app
        .oneshot(post_json(
            "/get_package",
            serde_json::json!({"package": "samplepkg", "version": "1.0.0", "tags": SAMPLE_TAGS}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_parameters_are_rejected_before_index_access() {
    let (_temp, index, app) = test_app();

    for uri in [
        "/get_package?tags=py3-none-any",
        "/get_package?package=samplepkg",
        "/get_package?package=&tags=",
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body: ErrorBody = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body.kind, "InvalidRequest");
    }

    assert_eq!(index.lookups(), 0);
}

async fn assert_invalid_request(response: axum::response::Response) {
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body: ErrorBody = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.kind, "InvalidRequest");
    assert!(!body.error.is_empty());
}

#[tokio::test]
async fn test_malformed_json_body_gets_error_body() {
    let (_temp, index, app) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/get_package")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"package\": "))
        .unwrap();
    assert_invalid_request(app.oneshot(request).await.unwrap()).await;
    assert_eq!(index.lookups(), 0);
}

#[tokio::test]
async fn test_missing_content_type_gets_error_body() {
    let (_temp, _index, app) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/get_package")
        .body(Body::from(serde_json::json!({"package": "samplepkg", "tags": SAMPLE_TAGS}).to_string()))
        .unwrap();
    assert_invalid_request(app.oneshot(request).await.unwrap()).await;
}

#[tokio::test]
async fn test_bad_query_values_get_error_body() {
    let (_temp, _index, app) = test_app();

    let response = app
        .clone()
        .oneshot(get("/get_package?package=samplepkg&tags=py3-none-any&force=yes"))
        .await
        .unwrap();
    assert_invalid_request(response).await;

    let response = app
        .oneshot(post_json("/get_modules?force=yes", serde_json::json!({"packages": []})))
        .await
        .unwrap();
    assert_invalid_request(response).await;
}

#[tokio::test]
async fn test_get_modules_without_packages_gets_error_body() {
    let (_temp, _index, app) = test_app();
    let response = app
        .oneshot(post_json("/get_modules", serde_json::json!({})))
        .await
        .unwrap();
    assert_invalid_request(response).await;
}

#[tokio::test]
async fn test_no_compatible_artifact_is_server_error() {
    let (temp, _index, app) = test_app();

    let response = app
        .oneshot(get("/get_package?package=nativeonly&tags=cp39-cp39-manylinux_2_28_x86_64"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: ErrorBody = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.kind, "NoCompatibleArtifact");
    assert!(body.error.contains("nativeonly"));

    let cache = ContentCache::new(temp.path()).unwrap();
    assert!(cache.entries().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_package_is_server_error() {
    let (_temp, _index, app) = test_app();
    let response = app
        .oneshot(get("/get_package?package=nosuchpkg&tags=py3-none-any"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorBody = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.kind, "PackageNotFound");
}

#[tokio::test]
async fn test_get_modules_uses_host_tags_by_default() {
    let (_temp, _index, app) = test_app();

    let response = app
        .oneshot(post_json(
            "/get_modules?force=true",
            serde_json::json!({"packages": [{"name": "samplepkg"}, {"name": "purepkg", "version": "2.0"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let tables: BTreeMap<String, BTreeMap<String, String>> =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(tables["samplepkg"]["samplepkg"], "from .core import answer\n");
    assert!(tables["samplepkg"].contains_key("samplepkg.core"));
    assert_eq!(tables["purepkg"]["purepkg"], "NAME = 'purepkg'\n");
}

#[tokio::test]
async fn test_health() {
    let (_temp, _index, app) = test_app();
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], pkgrelay_core::VERSION);
}

#[tokio::test]
async fn test_remote_importer_loads_once() {
    let (_temp, index, app) = test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let tags: TagSet = SAMPLE_TAGS.parse().unwrap();
    let importer = RemoteImporter::new(
        &format!("http://{}", address),
        tags,
        ModuleTableLoader,
        Duration::from_secs(10),
    )
    .unwrap();
    let mut registry: LoadedPackages<ModuleTable> = LoadedPackages::new();

    let loaded = importer.import(&mut registry, "samplepkg", None).await.unwrap();
    assert_eq!(loaded.unit.root_module(), Some("from .core import answer\n"));
    assert!(loaded.root.path().join("samplepkg/core.py").is_file());
    assert!(loaded.files.contains(&"samplepkg/__init__.py".to_string()));

    importer.import(&mut registry, "samplepkg", None).await.unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(index.lookups(), 1, "second import is served from the registry");

    let err = importer.import(&mut registry, "nativeonly", None).await.unwrap_err();
    assert_eq!(err.kind(), "DownloadError");
    assert!(err.to_string().contains("NoCompatibleArtifact"));
}
