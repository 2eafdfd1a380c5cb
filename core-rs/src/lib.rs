//! # pkgrelay core
//!
//! Resolves a package request into the one distribution artifact that best
//! fits a client's runtime, verifies it, repacks it as a zip archive and
//! caches the result.
//!
//! ## Key Features
//!
//! - Ordered compatibility tags for a client environment
//! - Tag parsing for binary distribution filenames
//! - Artifact selection with source-distribution fallback
//! - Digest-verified cache keyed on (package, version, tag list)
//! - HTTP service and client loader
//!
//! ## Architecture
//!
//! ```text
//!   client tags ──► /get_package ──► FetchPipeline
//!                                      │
//!          ┌───────────────┬───────────┼──────────────┐
//!          ▼               ▼           ▼              ▼
//!     ContentCache   PackageIndex   matcher    archive repack
//! ```

pub mod artifact;
pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod index;
pub mod matcher;
pub mod pipeline;
pub mod server;
pub mod tags;

pub use artifact::{parse_artifact_tags, ArtifactDescriptor, ArtifactDigest, ArtifactKind, WheelName};
pub use cache::{CacheEntry, CacheKey, ContentCache};
pub use client::{LoadedPackages, ModuleTableLoader, RemoteImporter, UnitLoader};
pub use config::ServiceConfig;
pub use errors::{RelayError, Result};
pub use index::{PackageIndex, ProjectMetadata, PypiIndex};
pub use matcher::{select_best_artifact, MatchPolicy, Selection};
pub use pipeline::{extract_modules, FetchOutcome, FetchPipeline};
pub use server::{app, AppState};
pub use tags::{compute_client_tags, CompatibilityTag, Environment, TagSet};

/// Crate version, reported by `/health`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
