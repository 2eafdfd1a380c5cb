//! PyPI JSON API client
//!
//! `GET {base}/{package}/json` returns `info.version` and a `releases` map of
//! version to file list. Each file carries `filename`, `url` and `digests`.

use super::retry::with_retries;
use super::{PackageIndex, ProjectMetadata};
use crate::artifact::{ArtifactDescriptor, ArtifactDigest};
use crate::errors::{RelayError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";

/// Project names: ASCII alphanumerics, with `.`, `_` or `-` only inside
static PROJECT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("project name pattern is valid")
});

/// Reject names that could not be a project before they reach a URL path
pub fn validate_project_name(package: &str) -> Result<()> {
    if PROJECT_NAME.is_match(package) {
        Ok(())
    } else {
        Err(RelayError::InvalidRequest(format!("invalid package name '{}'", package)))
    }
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    info: ProjectInfo,
    #[serde(default)]
    releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    name: Option<String>,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
    url: String,
    #[serde(default)]
    digests: HashMap<String, String>,
    #[serde(default)]
    yanked: bool,
}

impl ReleaseFile {
    fn into_descriptor(self) -> ArtifactDescriptor {
        let digest = self
            .digests
            .get("sha256")
            .filter(|v| !v.is_empty())
            .map(|v| ArtifactDigest::sha256(v));
        ArtifactDescriptor::new(&self.filename, &self.url, digest)
    }
}

/// Parse a project document into metadata. Yanked files are dropped.
pub fn parse_project_json(package: &str, body: &str) -> Result<ProjectMetadata> {
    let response: ProjectResponse = serde_json::from_str(body)
        .map_err(|e| RelayError::IndexLookup(format!("malformed metadata for {}: {}", package, e)))?;

    let releases = response
        .releases
        .into_iter()
        .map(|(version, files)| {
            let files = files
                .into_iter()
                .filter(|f| !f.yanked)
                .map(ReleaseFile::into_descriptor)
                .collect();
            (version, files)
        })
        .collect();

    Ok(ProjectMetadata {
        name: response.info.name.unwrap_or_else(|| package.to_string()),
        latest_version: response.info.version,
        releases,
    })
}

pub struct PypiIndex {
    client: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl PypiIndex {
    pub fn new(base_url: &str, timeout: Duration, retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pkgrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn project_url(&self, package: &str) -> String {
        format!("{}/{}/json", self.base_url, package)
    }

    async fn fetch_project(&self, package: &str) -> Result<ProjectMetadata> {
        let url = self.project_url(package);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::IndexLookup(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RelayError::PackageNotFound(package.to_string()));
        }
        if !status.is_success() {
            return Err(RelayError::IndexLookup(format!("GET {} returned {}", url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::IndexLookup(format!("reading {}: {}", url, e)))?;
        parse_project_json(package, &body)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::Download(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Download(format!("GET {} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::Download(format!("reading {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl PackageIndex for PypiIndex {
    async fn project(&self, package: &str) -> Result<ProjectMetadata> {
        validate_project_name(package)?;
        tracing::debug!(package, index = %self.base_url, "querying index");
        with_retries(self.retries, "index lookup", || self.fetch_project(package)).await
    }

    async fn download(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>> {
        tracing::info!(filename = %artifact.filename, "downloading artifact");
        let bytes = with_retries(self.retries, "download", || self.fetch_bytes(&artifact.url)).await?;
        tracing::debug!(filename = %artifact.filename, size = bytes.len(), "download complete");
        Ok(bytes)
    }
}
