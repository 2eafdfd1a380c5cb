//! Distribution artifacts
//!
//! Descriptors for the files an index offers per release, and filename
//! parsing for the tags a binary distribution declares.

pub mod descriptor;
pub mod filename;

pub use descriptor::{sha256_hex, ArtifactDescriptor, ArtifactDigest, DigestAlgorithm};
pub use filename::{declared_tags, parse_artifact_tags, ArtifactKind, WheelName};
