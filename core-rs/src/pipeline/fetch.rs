//! Resolve, download, verify, repackage and cache one package
//!
//! Steps for `resolve_and_fetch`:
//! 1. validate the request and parse the tag list
//! 2. resolve the version; only an unpinned request asks the index first
//! 3. serve from the cache unless `force`
//! 4. query the index for the release and select an artifact for the tags
//! 5. download, verify the published SHA-256, extract and repack as zip
//! 6. store in the cache and return the bytes
//!
//! Nothing is cached unless every step succeeds.

use super::archive;
use super::inflight::InFlight;
use crate::artifact::{sha256_hex, ArtifactDescriptor};
use crate::cache::ContentCache;
use crate::errors::{RelayError, Result};
use crate::index::PackageIndex;
use crate::matcher::{select_best_artifact, MatchPolicy, Selection};
use crate::tags::TagSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Archive served to a client
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub package: String,
    pub version: String,
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`
    pub sha256: String,
    pub cache_hit: bool,
    /// Upstream artifact filename; `None` when served from the cache
    pub artifact: Option<String>,
}

pub struct FetchPipeline {
    index: Arc<dyn PackageIndex>,
    cache: ContentCache,
    policy: MatchPolicy,
    inflight: InFlight,
    /// Parent of per-request scratch directories; system temp dir when unset
    scratch_root: Option<PathBuf>,
}

impl FetchPipeline {
    pub fn new(index: Arc<dyn PackageIndex>, cache: ContentCache, policy: MatchPolicy) -> Self {
        Self {
            index,
            cache,
            policy,
            inflight: InFlight::new(),
            scratch_root: None,
        }
    }

    /// Create download and extraction scratch space under `root`
    pub fn with_scratch_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.scratch_root = Some(root.as_ref().to_path_buf());
        self
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub async fn resolve_and_fetch(
        &self,
        package: &str,
        version: Option<&str>,
        tag_list: &str,
        force: bool,
    ) -> Result<FetchOutcome> {
        let package = package.trim();
        if package.is_empty() {
            return Err(RelayError::InvalidRequest("package is required".to_string()));
        }
        let tags: TagSet = tag_list.parse()?;
        if tags.is_empty() {
            return Err(RelayError::InvalidRequest("tags are required".to_string()));
        }

        // A pinned version can be served from the cache without the index
        let (version, metadata) = match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(pinned) => (pinned.to_string(), None),
            None => {
                let metadata = self.index.project(package).await?;
                let (latest, _) = metadata.release(None)?;
                (latest, Some(metadata))
            }
        };

        let key = self.cache.key(package, &version, tag_list)?;
        let _guard = self.inflight.acquire(key.as_str()).await;

        if !force {
            if let Some(hit) = self.lookup(package, &version, tag_list).await? {
                tracing::info!(package, version = %version, key = %hit.key, "serving cached archive");
                return Ok(FetchOutcome {
                    package: package.to_string(),
                    version,
                    bytes: hit.bytes,
                    sha256: hit.sha256,
                    cache_hit: true,
                    artifact: None,
                });
            }
        }

        let metadata = match metadata {
            Some(metadata) => metadata,
            None => self.index.project(package).await?,
        };
        let (version, files) = metadata.release(Some(&version))?;

        let artifact = match select_best_artifact(files, &tags, self.policy) {
            Selection::Binary(a) => a,
            Selection::SourceFallback(a) => {
                tracing::info!(package, version = %version, "no compatible binary, using source distribution");
                a
            }
            Selection::NotFound => {
                return Err(RelayError::NoCompatibleArtifact {
                    package: package.to_string(),
                    version,
                });
            }
        };
        tracing::info!(package, version = %version, artifact = %artifact.filename, "selected artifact");

        let downloaded = self.index.download(artifact).await?;
        verify_digest(artifact, &downloaded)?;

        let stored = self.repack_and_store(package, &version, tag_list, artifact, downloaded).await?;

        Ok(FetchOutcome {
            package: package.to_string(),
            version,
            bytes: stored.bytes,
            sha256: stored.sha256,
            cache_hit: false,
            artifact: Some(artifact.filename.clone()),
        })
    }

    async fn lookup(
        &self,
        package: &str,
        version: &str,
        tag_list: &str,
    ) -> Result<Option<crate::cache::CachedArtifact>> {
        let cache = self.cache.clone();
        let (package, version, tag_list) = (package.to_string(), version.to_string(), tag_list.to_string());
        tokio::task::spawn_blocking(move || cache.lookup(&package, &version, &tag_list))
            .await
            .map_err(join_error)?
    }

    async fn repack_and_store(
        &self,
        package: &str,
        version: &str,
        tag_list: &str,
        artifact: &ArtifactDescriptor,
        downloaded: Vec<u8>,
    ) -> Result<crate::cache::CachedArtifact> {
        let cache = self.cache.clone();
        let scratch_root = self.scratch_root.clone();
        let filename = artifact.filename.clone();
        let (package, version, tag_list) = (package.to_string(), version.to_string(), tag_list.to_string());

        tokio::task::spawn_blocking(move || {
            // Download and extraction scratch space, removed on every exit path
            let scratch = match &scratch_root {
                Some(root) => tempfile::TempDir::new_in(root)?,
                None => tempfile::TempDir::new()?,
            };
            let download_path = scratch.path().join(&filename);
            std::fs::write(&download_path, &downloaded)?;

            let workdir = scratch.path().join("extract");
            std::fs::create_dir(&workdir)?;
            let zipped = archive::normalize(&filename, &downloaded, &workdir)?;

            cache.store(&package, &version, &tag_list, &zipped)
        })
        .await
        .map_err(join_error)?
    }
}

/// Check downloaded bytes against the index-published digest
pub fn verify_digest(artifact: &ArtifactDescriptor, bytes: &[u8]) -> Result<()> {
    match &artifact.digest {
        Some(digest) if digest.is_verifiable() => {
            let actual = sha256_hex(bytes);
            if actual != digest.value {
                return Err(RelayError::IntegrityMismatch {
                    filename: artifact.filename.clone(),
                    expected: digest.value.clone(),
                    actual,
                });
            }
            tracing::debug!(filename = %artifact.filename, "digest verified");
        }
        Some(digest) => {
            tracing::warn!(filename = %artifact.filename, algorithm = ?digest.algorithm, "unsupported digest algorithm, skipping verification");
        }
        None => {
            tracing::warn!(filename = %artifact.filename, "index published no digest, skipping verification");
        }
    }
    Ok(())
}

fn join_error(e: tokio::task::JoinError) -> RelayError {
    RelayError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}
