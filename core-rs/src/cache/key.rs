//! Cache keys
//!
//! A key is derived from (package, version, raw tag-list string), never from
//! the artifact filename, so clients with different tag needs never share an
//! entry and every artifact resolved for one key replaces the previous one.

use crate::artifact::sha256_hex;
use crate::errors::{RelayError, Result};

/// Full SHA-256 hex width
pub const MAX_DIGEST_LEN: usize = 64;

/// Narrowest tag-list digest accepted
pub const MIN_DIGEST_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    dir_name: String,
}

impl CacheKey {
    /// Derive a key. `digest_len` is the number of hex characters of the
    /// tag-list digest kept in the key.
    pub fn new(package: &str, version: &str, tag_list: &str, digest_len: usize) -> Result<Self> {
        if !(MIN_DIGEST_LEN..=MAX_DIGEST_LEN).contains(&digest_len) {
            return Err(RelayError::Config(format!(
                "cache key digest length must be between {} and {}, got {}",
                MIN_DIGEST_LEN, MAX_DIGEST_LEN, digest_len
            )));
        }

        let digest = sha256_hex(tag_list.as_bytes());
        Ok(CacheKey {
            dir_name: format!(
                "{}-{}-{}",
                sanitize_component(package),
                sanitize_component(version),
                &digest[..digest_len]
            ),
        })
    }

    /// Filesystem-safe directory name for this key
    pub fn as_str(&self) -> &str {
        &self.dir_name
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dir_name)
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`; a leading dot is
/// prefixed so no component can be `.`/`..` or hidden.
pub fn sanitize_component(s: &str) -> String {
    let mut out: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with('.') {
        out.insert(0, '_');
    }
    out
}
