//! Upstream package index
//!
//! The index is a read-only metadata and download service. `PackageIndex`
//! is the seam the fetch pipeline depends on; `PypiIndex` implements it
//! against the PyPI JSON API.

pub mod pypi;
mod retry;

use crate::artifact::ArtifactDescriptor;
use crate::errors::{RelayError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use pypi::PypiIndex;

/// Release metadata for one project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub name: String,
    /// Latest published version
    pub latest_version: String,
    /// Artifacts per version, each list in index order
    pub releases: BTreeMap<String, Vec<ArtifactDescriptor>>,
}

impl ProjectMetadata {
    /// Resolve the requested version (latest when unspecified) to its
    /// non-empty artifact list.
    pub fn release(&self, version: Option<&str>) -> Result<(String, &[ArtifactDescriptor])> {
        let version = version
            .filter(|v| !v.is_empty())
            .unwrap_or(self.latest_version.as_str());

        match self.releases.get(version) {
            Some(files) if !files.is_empty() => Ok((version.to_string(), files.as_slice())),
            _ => Err(RelayError::VersionNotFound {
                package: self.name.clone(),
                version: version.to_string(),
            }),
        }
    }
}

#[async_trait]
pub trait PackageIndex: Send + Sync {
    /// Fetch project metadata. Unknown projects yield `PackageNotFound`.
    async fn project(&self, package: &str) -> Result<ProjectMetadata>;

    /// Download an artifact's bytes
    async fn download(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>>;
}
