//! Artifact filename parsing
//!
//! Binary distributions are named `name-version[-build]-runtime-abi-platform.whl`.
//! Each of the last three fields may hold several values joined by `.`
//! (e.g. `py2.py3-none-any`), which expand to one tag per combination.

use crate::errors::{RelayError, Result};
use crate::tags::CompatibilityTag;
use std::collections::BTreeSet;

/// Suffix of packed binary distributions
pub const WHEEL_SUFFIX: &str = ".whl";

/// Recognized source-distribution suffixes
pub const SOURCE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar.bz2", ".zip"];

/// Minimum number of `-` separated fields in a wheel stem
const MIN_WHEEL_FIELDS: usize = 5;

/// Kind of distribution file, decided by suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Wheel,
    SourceDist,
    Other,
}

impl ArtifactKind {
    pub fn classify(filename: &str) -> Self {
        let lower = filename.to_lowercase();
        if lower.ends_with(WHEEL_SUFFIX) {
            ArtifactKind::Wheel
        } else if SOURCE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
            ArtifactKind::SourceDist
        } else {
            ArtifactKind::Other
        }
    }
}

/// Fields of a parsed wheel filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelName {
    pub name: String,
    pub version: String,
    pub build: Option<String>,
    pub runtime: String,
    pub abi: String,
    pub platform: String,
}

impl WheelName {
    pub fn parse(filename: &str) -> Result<Self> {
        // Suffix match ignores case, as in `ArtifactKind::classify`
        let stem = filename
            .len()
            .checked_sub(WHEEL_SUFFIX.len())
            .filter(|&cut| filename.is_char_boundary(cut) && filename[cut..].eq_ignore_ascii_case(WHEEL_SUFFIX))
            .map(|cut| &filename[..cut])
            .ok_or_else(|| RelayError::MalformedArtifactName(format!(
                "{}: not a {} file",
                filename, WHEEL_SUFFIX
            )))?;

        let parts: Vec<&str> = stem.split('-').collect();
        if parts.len() < MIN_WHEEL_FIELDS || parts.iter().any(|p| p.is_empty()) {
            return Err(RelayError::MalformedArtifactName(format!(
                "{}: expected name-version-runtime-abi-platform",
                filename
            )));
        }

        // A build tag always starts with a digit and only appears as the
        // third of exactly six fields
        let (build, tag_start) = if parts.len() == 6 && parts[2].starts_with(|c: char| c.is_ascii_digit()) {
            (Some(parts[2].to_string()), 3)
        } else {
            (None, 2)
        };

        Ok(WheelName {
            name: parts[0].to_string(),
            version: parts[1].to_string(),
            build,
            runtime: parts[tag_start].to_string(),
            abi: parts[tag_start + 1].to_string(),
            platform: parts[tag_start + 2..].join("-"),
        })
    }

    /// Cartesian expansion of the compressed tag fields
    pub fn tags(&self) -> BTreeSet<CompatibilityTag> {
        let mut tags = BTreeSet::new();
        for runtime in self.runtime.split('.') {
            for abi in self.abi.split('.') {
                for platform in self.platform.split('.') {
                    tags.insert(CompatibilityTag::new(runtime, abi, platform));
                }
            }
        }
        tags
    }
}

/// Parse the tag set a binary distribution filename declares
pub fn parse_artifact_tags(filename: &str) -> Result<BTreeSet<CompatibilityTag>> {
    Ok(WheelName::parse(filename)?.tags())
}

/// Non-fatal variant of [`parse_artifact_tags`]: malformed names yield an
/// empty set and a warning so resolution can continue.
pub fn declared_tags(filename: &str) -> BTreeSet<CompatibilityTag> {
    match parse_artifact_tags(filename) {
        Ok(tags) => tags,
        Err(e) => {
            tracing::warn!(filename, error = %e, "skipping artifact with unparseable tags");
            BTreeSet::new()
        }
    }
}
