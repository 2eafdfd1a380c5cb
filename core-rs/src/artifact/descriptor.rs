//! Candidate files offered by the index for one release

use super::filename::{declared_tags, ArtifactKind};
use crate::tags::CompatibilityTag;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Digest algorithm named by the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
    Other(String),
}

/// Integrity digest published for an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex
    pub value: String,
}

impl ArtifactDigest {
    pub fn sha256(hex_value: &str) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            value: hex_value.to_lowercase(),
        }
    }

    /// Whether this digest can be checked locally
    pub fn is_verifiable(&self) -> bool {
        self.algorithm == DigestAlgorithm::Sha256
    }
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// One distribution file of a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub filename: String,
    pub url: String,
    pub digest: Option<ArtifactDigest>,
}

impl ArtifactDescriptor {
    pub fn new(filename: &str, url: &str, digest: Option<ArtifactDigest>) -> Self {
        Self {
            filename: filename.to_string(),
            url: url.to_string(),
            digest,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        ArtifactKind::classify(&self.filename)
    }

    /// Tags this artifact declares. Source distributions declare none; they
    /// are matched by kind alone.
    pub fn declared_tags(&self) -> BTreeSet<CompatibilityTag> {
        match self.kind() {
            ArtifactKind::Wheel => declared_tags(&self.filename),
            _ => BTreeSet::new(),
        }
    }
}
