//! Artifact selection
//!
//! Picks one artifact of a release for a client tag set. Binary
//! distributions sharing at least one tag with the client win; otherwise the
//! first source distribution is used.

use crate::artifact::{ArtifactDescriptor, ArtifactKind};
use crate::tags::TagSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How compatible binary candidates are ranked against each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// First compatible candidate in the index's listing order
    #[default]
    IndexOrder,
    /// Candidate sharing the client's most preferred tag; ties keep index order
    PreferenceRank,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index-order" => Ok(MatchPolicy::IndexOrder),
            "preference-rank" => Ok(MatchPolicy::PreferenceRank),
            other => Err(format!(
                "unknown match policy '{}' (expected index-order or preference-rank)",
                other
            )),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::IndexOrder => write!(f, "index-order"),
            MatchPolicy::PreferenceRank => write!(f, "preference-rank"),
        }
    }
}

/// Outcome of artifact selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    Binary(&'a ArtifactDescriptor),
    SourceFallback(&'a ArtifactDescriptor),
    NotFound,
}

impl<'a> Selection<'a> {
    pub fn artifact(&self) -> Option<&'a ArtifactDescriptor> {
        match self {
            Selection::Binary(a) | Selection::SourceFallback(a) => Some(a),
            Selection::NotFound => None,
        }
    }
}

/// Best client rank among the tags an artifact shares with the client
fn best_rank(artifact: &ArtifactDescriptor, client_tags: &TagSet) -> Option<usize> {
    artifact
        .declared_tags()
        .iter()
        .filter_map(|tag| client_tags.rank(tag))
        .min()
}

/// Select the artifact to serve for `client_tags`
pub fn select_best_artifact<'a>(
    artifacts: &'a [ArtifactDescriptor],
    client_tags: &TagSet,
    policy: MatchPolicy,
) -> Selection<'a> {
    let binaries = artifacts.iter().filter(|a| a.kind() == ArtifactKind::Wheel);

    let chosen = match policy {
        MatchPolicy::IndexOrder => binaries
            .into_iter()
            .find(|a| a.declared_tags().iter().any(|t| client_tags.contains(t))),
        MatchPolicy::PreferenceRank => binaries
            .filter_map(|a| best_rank(a, client_tags).map(|rank| (rank, a)))
            // min_by_key returns the first of equal minima, keeping index order
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, a)| a),
    };

    if let Some(artifact) = chosen {
        return Selection::Binary(artifact);
    }

    match artifacts.iter().find(|a| a.kind() == ArtifactKind::SourceDist) {
        Some(sdist) => Selection::SourceFallback(sdist),
        None => Selection::NotFound,
    }
}
