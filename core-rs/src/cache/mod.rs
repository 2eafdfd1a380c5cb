//! Cache module for served package archives
//!
//! Entries are keyed on (package, version, client tag list) and verified
//! against their recorded SHA-256 on every read.

pub mod content_cache;
pub mod key;

pub use content_cache::{CacheEntry, CachedArtifact, ContentCache, EntryStatus};
pub use key::{sanitize_component, CacheKey};
