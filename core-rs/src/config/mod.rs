/*!
 * config
 * Service configuration for pkgrelay
 *
 * Layering, later wins:
 *   defaults → YAML file → PKGRELAY_* environment → CLI flags
 *
 * File format:
 * ```yaml
 * bind: 0.0.0.0:5000
 * cache_dir: ./cache
 * index_url: https://pypi.org/pypi
 * request_timeout_secs: 30
 * retries: 2
 * match_policy: index-order
 * key_digest_len: 64
 * scratch_dir: /var/tmp/pkgrelay   # optional, system temp dir when absent
 * ```
 */

use crate::cache::key::{MAX_DIGEST_LEN, MIN_DIGEST_LEN};
use crate::errors::{RelayError, Result};
use crate::index::pypi::DEFAULT_INDEX_URL;
use crate::matcher::MatchPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "PKGRELAY_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listen address
    pub bind: String,
    pub cache_dir: PathBuf,
    /// Base URL of the index JSON API
    pub index_url: String,
    pub request_timeout_secs: u64,
    /// Extra attempts for transient index failures
    pub retries: u32,
    pub match_policy: MatchPolicy,
    /// Hex characters of the tag-list digest kept in cache keys
    pub key_digest_len: usize,
    /// Parent directory for download scratch space
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            bind: "0.0.0.0:5000".to_string(),
            cache_dir: PathBuf::from("./cache"),
            index_url: DEFAULT_INDEX_URL.to_string(),
            request_timeout_secs: 30,
            retries: 2,
            match_policy: MatchPolicy::default(),
            key_digest_len: MAX_DIGEST_LEN,
            scratch_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Load a YAML file; fields it omits keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: ServiceConfig = serde_yaml::from_str(&content).map_err(|e| {
            RelayError::Config(format!("Invalid config YAML in {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the optional file, then the process environment
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `PKGRELAY_*` variables provided by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("BIND") {
            self.bind = v;
        }
        if let Some(v) = var("CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = var("INDEX_URL") {
            self.index_url = v;
        }
        if let Some(v) = var("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("RETRIES") {
            self.retries = parse_number("RETRIES", &v)?;
        }
        if let Some(v) = var("MATCH_POLICY") {
            self.match_policy = v.parse().map_err(RelayError::Config)?;
        }
        if let Some(v) = var("KEY_DIGEST_LEN") {
            self.key_digest_len = parse_number("KEY_DIGEST_LEN", &v)?;
        }
        if let Some(v) = var("SCRATCH_DIR") {
            self.scratch_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind.trim().is_empty() {
            return Err(RelayError::Config("bind cannot be empty".to_string()));
        }
        if self.index_url.trim().is_empty() {
            return Err(RelayError::Config("index_url cannot be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(RelayError::Config("request_timeout_secs must be positive".to_string()));
        }
        if !(MIN_DIGEST_LEN..=MAX_DIGEST_LEN).contains(&self.key_digest_len) {
            return Err(RelayError::Config(format!(
                "key_digest_len must be between {} and {}, got {}",
                MIN_DIGEST_LEN, MAX_DIGEST_LEN, self.key_digest_len
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), yaml)?;
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        RelayError::Config(format!("{}{} must be a number, got '{}'", ENV_PREFIX, name, value))
    })
}
