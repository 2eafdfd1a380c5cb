//! Digest-verified artifact cache
//!
//! Layout:
//! ```text
//! <cache_root>/
//!   <package>-<version>-<tag-list digest>/
//!     artifact-<sha256 prefix>.zip   - served archive bytes
//!     entry.json                     - CacheEntry record naming the artifact
//! ```
//!
//! Every lookup recomputes the artifact digest and checks that the record was
//! written for the same package, version and tag list; sanitized key names
//! can coincide for different inputs. An entry that is missing, unreadable or
//! fails either check is a miss and the next store replaces it.
//!
//! A store writes the new artifact under its own name, then swaps the record,
//! then prunes older artifacts. Both renames are atomic, so a reader outside
//! the fetch lock always finds a record and the artifact it names.

use super::key::{CacheKey, MAX_DIGEST_LEN, MIN_DIGEST_LEN};
use crate::artifact::sha256_hex;
use crate::errors::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const ENTRY_FILE: &str = "entry.json";
const ARTIFACT_PREFIX: &str = "artifact-";

/// Times a reader follows a record that was swapped mid-read
const READ_ATTEMPTS: usize = 3;

fn artifact_file_name(sha256: &str) -> String {
    format!("{}{}.zip", ARTIFACT_PREFIX, &sha256[..16])
}

/// Persisted metadata for one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub package: String,
    pub version: String,
    /// Raw client tag-list string the entry was resolved for
    pub tags: String,
    /// Artifact file name inside the entry directory
    pub artifact: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub created_at: String,
}

/// Verified cache contents returned to callers
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub key: CacheKey,
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: Vec<u8>,
}

/// Result of re-verifying one entry
#[derive(Debug, Clone)]
pub struct EntryStatus {
    pub key: String,
    pub entry: Option<CacheEntry>,
    pub valid: bool,
}

/// Content cache rooted at a directory
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
    digest_len: usize,
}

impl ContentCache {
    /// Open (and create) a cache keeping the full tag-list digest in keys
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::with_digest_len(root, MAX_DIGEST_LEN)
    }

    pub fn with_digest_len<P: AsRef<Path>>(root: P, digest_len: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !(MIN_DIGEST_LEN..=MAX_DIGEST_LEN).contains(&digest_len) {
            return Err(RelayError::Config(format!(
                "cache key digest length must be between {} and {}, got {}",
                MIN_DIGEST_LEN, MAX_DIGEST_LEN, digest_len
            )));
        }
        fs::create_dir_all(&root).map_err(|e| {
            RelayError::Config(format!("Failed to create cache directory {}: {}", root.display(), e))
        })?;
        Ok(ContentCache { root, digest_len })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key(&self, package: &str, version: &str, tag_list: &str) -> Result<CacheKey> {
        CacheKey::new(package, version, tag_list, self.digest_len)
    }

    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Look up a verified entry. Corruption is reported as a miss.
    pub fn lookup(&self, package: &str, version: &str, tag_list: &str) -> Result<Option<CachedArtifact>> {
        let key = self.key(package, version, tag_list)?;
        let dir = self.entry_dir(&key);

        if !dir.join(ENTRY_FILE).is_file() {
            tracing::debug!(key = %key, "cache miss");
            return Ok(None);
        }

        match self.read_verified(&key, &dir, package, version, tag_list) {
            Ok(artifact) => {
                tracing::debug!(key = %key, sha256 = %artifact.sha256, "cache hit");
                Ok(Some(artifact))
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "ignoring corrupt cache entry");
                Ok(None)
            }
        }
    }

    fn read_entry(dir: &Path) -> Result<CacheEntry> {
        let raw = fs::read_to_string(dir.join(ENTRY_FILE))
            .map_err(|e| RelayError::CacheCorruption(format!("unreadable entry record: {}", e)))?;
        let entry: CacheEntry = serde_json::from_str(&raw)
            .map_err(|e| RelayError::CacheCorruption(format!("invalid entry record: {}", e)))?;
        if !entry.artifact.starts_with(ARTIFACT_PREFIX) || entry.artifact.contains(|c: char| c == '/' || c == '\\') {
            return Err(RelayError::CacheCorruption(format!(
                "record names an unexpected artifact '{}'",
                entry.artifact
            )));
        }
        Ok(entry)
    }

    /// Read the record and the artifact it names. A store landing between
    /// the two reads prunes the old artifact, so a vanished file is retried
    /// against the current record.
    fn read_artifact(dir: &Path) -> Result<(CacheEntry, PathBuf, Vec<u8>)> {
        let mut entry = Self::read_entry(dir)?;
        for _ in 0..READ_ATTEMPTS {
            let path = dir.join(&entry.artifact);
            match fs::read(&path) {
                Ok(bytes) => return Ok((entry, path, bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    let current = Self::read_entry(dir)?;
                    if current.artifact == entry.artifact {
                        return Err(RelayError::CacheCorruption(format!(
                            "missing artifact {}",
                            path.display()
                        )));
                    }
                    entry = current;
                }
                Err(e) => {
                    return Err(RelayError::CacheCorruption(format!(
                        "unreadable artifact {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Err(RelayError::CacheCorruption(format!(
            "entry {} changed on every read",
            dir.display()
        )))
    }

    fn read_verified(
        &self,
        key: &CacheKey,
        dir: &Path,
        package: &str,
        version: &str,
        tag_list: &str,
    ) -> Result<CachedArtifact> {
        let (entry, path, bytes) = Self::read_artifact(dir)?;

        if entry.package != package || entry.version != version || entry.tags != tag_list {
            return Err(RelayError::CacheCorruption(format!(
                "entry was stored for {}=={} with tags '{}'",
                entry.package, entry.version, entry.tags
            )));
        }

        let actual = sha256_hex(&bytes);
        if actual != entry.sha256 {
            return Err(RelayError::CacheCorruption(format!(
                "digest mismatch for {}: recorded {}, found {}",
                path.display(),
                entry.sha256,
                actual
            )));
        }

        Ok(CachedArtifact {
            key: key.clone(),
            path,
            sha256: actual,
            bytes,
        })
    }

    /// Store archive bytes under the key. Repeated stores overwrite.
    pub fn store(&self, package: &str, version: &str, tag_list: &str, bytes: &[u8]) -> Result<CachedArtifact> {
        let key = self.key(package, version, tag_list)?;
        let dir = self.entry_dir(&key);
        fs::create_dir_all(&dir)?;

        let sha256 = sha256_hex(bytes);
        let artifact = artifact_file_name(&sha256);
        let entry = CacheEntry {
            package: package.to_string(),
            version: version.to_string(),
            tags: tag_list.to_string(),
            artifact: artifact.clone(),
            sha256: sha256.clone(),
            size_bytes: bytes.len() as u64,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        // Artifact before record: the old record keeps naming the old file
        let path = dir.join(&artifact);
        write_atomic(&dir, &path, bytes)?;
        write_atomic(&dir, &dir.join(ENTRY_FILE), serde_json::to_string_pretty(&entry)?.as_bytes())?;
        prune_artifacts(&dir, &artifact);

        tracing::info!(key = %key, sha256 = %sha256, size = bytes.len(), "cached artifact");

        Ok(CachedArtifact {
            key,
            path,
            sha256,
            bytes: bytes.to_vec(),
        })
    }

    /// Entry records currently on disk, sorted by key
    pub fn entries(&self) -> Result<Vec<(String, CacheEntry)>> {
        Ok(self
            .verify_all()?
            .into_iter()
            .filter_map(|status| status.entry.map(|entry| (status.key, entry)))
            .collect())
    }

    /// Re-verify every entry directory
    pub fn verify_all(&self) -> Result<Vec<EntryStatus>> {
        let mut statuses = Vec::new();

        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let dir = dir_entry.path();
            if !dir.is_dir() {
                continue;
            }
            let key = dir_entry.file_name().to_string_lossy().to_string();

            let (entry, valid) = match Self::read_artifact(&dir) {
                Ok((entry, _, bytes)) => {
                    let valid = sha256_hex(&bytes) == entry.sha256;
                    (Some(entry), valid)
                }
                Err(_) => (Self::read_entry(&dir).ok(), false),
            };
            statuses.push(EntryStatus { key, entry, valid });
        }

        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(statuses)
    }
}

/// Write `data` to a temp file in `dir`, then rename it over `target`
fn write_atomic(dir: &Path, target: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| RelayError::Io(e.error))?;
    Ok(())
}

/// Remove artifacts other than `keep` from an entry directory
fn prune_artifacts(dir: &Path, keep: &str) {
    let Ok(read) = fs::read_dir(dir) else {
        return;
    };
    for file in read.flatten() {
        let name = file.file_name().to_string_lossy().to_string();
        if name.starts_with(ARTIFACT_PREFIX) && name != keep {
            if let Err(e) = fs::remove_file(file.path()) {
                tracing::debug!(file = %name, error = %e, "could not prune stale artifact");
            }
        }
    }
}
