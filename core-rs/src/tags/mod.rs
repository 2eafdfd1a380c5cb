//! Compatibility tag model
//!
//! - `tag` - `CompatibilityTag` triples and ordered `TagSet`s (wire format)
//! - `environment` - client runtime descriptor
//! - `generator` - ordered tag generation for an environment

pub mod environment;
pub mod generator;
pub mod tag;

pub use environment::{Environment, OsFamily, RuntimeFamily};
pub use generator::compute_client_tags;
pub use tag::{CompatibilityTag, TagSet, ANY_PLATFORM, NO_ABI, STABLE_ABI};
