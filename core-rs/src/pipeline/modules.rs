//! Module tables from served archives
//!
//! Maps dotted module names to the source text of every `.py` file in a
//! repacked archive.

use crate::errors::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Metadata directories (`pkg-1.0.dist-info/`, `pkg.egg-info/`) never hold
/// importable modules
static METADATA_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^/]*[-.](dist|egg)[^/]*/").expect("metadata segment pattern is valid"));

/// Dotted module name for an archive path, `None` for non-module files
pub fn module_name(path: &str) -> Option<String> {
    let path = path.strip_prefix("./").unwrap_or(path);
    if path.starts_with("tests") {
        return None;
    }
    let stem = path.strip_suffix(".py")?;
    let stem = METADATA_SEGMENT.replace_all(stem, "");
    let dotted = stem.replace('/', ".");
    let dotted = dotted.strip_suffix(".__init__").unwrap_or(&dotted);
    if dotted.is_empty() {
        return None;
    }
    Some(dotted.to_string())
}

/// Module name → UTF-8 source for every module in a zip archive
pub fn extract_modules(archive_bytes: &[u8]) -> Result<BTreeMap<String, String>> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    let mut modules = BTreeMap::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let Some(name) = module_name(file.name()) else {
            continue;
        };

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        match String::from_utf8(raw) {
            Ok(source) => {
                modules.insert(name, source);
            }
            Err(_) => tracing::debug!(path = file.name(), "skipping non-UTF-8 module"),
        }
    }

    Ok(modules)
}
