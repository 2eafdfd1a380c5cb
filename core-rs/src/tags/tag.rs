//! Compatibility tags and ordered tag sets
//!
//! A tag is a `runtime-abi-platform` triple, e.g. `cp39-cp39-manylinux_2_28_x86_64`.
//! Tag lists travel between client and server as comma-joined triples.

use crate::errors::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// ABI token for artifacts that carry no compiled extension
pub const NO_ABI: &str = "none";

/// ABI token for the stable (limited) C API
pub const STABLE_ABI: &str = "abi3";

/// Platform token matching every platform
pub const ANY_PLATFORM: &str = "any";

/// One compatibility tag. Tokens are opaque; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompatibilityTag {
    pub runtime: String,
    pub abi: String,
    pub platform: String,
}

impl CompatibilityTag {
    pub fn new(runtime: impl Into<String>, abi: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            abi: abi.into(),
            platform: platform.into(),
        }
    }
}

impl fmt::Display for CompatibilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.runtime, self.abi, self.platform)
    }
}

impl FromStr for CompatibilityTag {
    type Err = RelayError;

    /// Parse `runtime-abi-platform`. Only the first two hyphens separate
    /// fields; the platform keeps any further hyphens.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().splitn(3, '-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(runtime), Some(abi), Some(platform))
                if !runtime.is_empty() && !abi.is_empty() && !platform.is_empty() =>
            {
                Ok(CompatibilityTag::new(runtime, abi, platform))
            }
            _ => Err(RelayError::InvalidRequest(format!(
                "Invalid tag '{}': expected runtime-abi-platform",
                s.trim()
            ))),
        }
    }
}

/// Ordered, duplicate-free sequence of tags. Earlier entries are preferred.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<CompatibilityTag>,
    seen: HashSet<CompatibilityTag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tag unless it is already present.
    ///
    /// Returns true if the tag was added.
    pub fn push(&mut self, tag: CompatibilityTag) -> bool {
        if self.seen.contains(&tag) {
            return false;
        }
        self.seen.insert(tag.clone());
        self.tags.push(tag);
        true
    }

    /// Remove a tag, keeping the order of the rest
    pub fn remove(&mut self, tag: &CompatibilityTag) -> bool {
        if !self.seen.remove(tag) {
            return false;
        }
        self.tags.retain(|t| t != tag);
        true
    }

    pub fn contains(&self, tag: &CompatibilityTag) -> bool {
        self.seen.contains(tag)
    }

    /// Preference rank of a tag (0 = most preferred)
    pub fn rank(&self, tag: &CompatibilityTag) -> Option<usize> {
        if !self.contains(tag) {
            return None;
        }
        self.tags.iter().position(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompatibilityTag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn first(&self) -> Option<&CompatibilityTag> {
        self.tags.first()
    }

    pub fn last(&self) -> Option<&CompatibilityTag> {
        self.tags.last()
    }

    /// Render the comma-joined wire form
    pub fn to_wire(&self) -> String {
        self.tags
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl FromStr for TagSet {
    type Err = RelayError;

    /// Parse the comma-joined wire form. Empty items are skipped and
    /// duplicates keep their first position.
    fn from_str(s: &str) -> Result<Self> {
        let mut set = TagSet::new();
        for item in s.split(',') {
            if item.trim().is_empty() {
                continue;
            }
            set.push(item.parse()?);
        }
        Ok(set)
    }
}

impl FromIterator<CompatibilityTag> for TagSet {
    fn from_iter<I: IntoIterator<Item = CompatibilityTag>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.push(tag);
        }
        set
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a CompatibilityTag;
    type IntoIter = std::slice::Iter<'a, CompatibilityTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}
