//! Archive extraction and zip repacking
//!
//! Wheels and zip sdists are read with `zip`, tarball sdists with
//! `flate2` + `tar`. Extraction goes into a caller-owned directory so the
//! caller controls cleanup.

use crate::artifact::ArtifactKind;
use crate::errors::{RelayError, Result};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Container format, decided from the artifact filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn from_filename(filename: &str) -> Result<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".whl") || lower.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else {
            Err(RelayError::Archive(format!("unsupported archive format: {}", filename)))
        }
    }
}

/// Unpack `bytes` into `dest`
pub fn extract(bytes: &[u8], format: ArchiveFormat, dest: &Path) -> Result<()> {
    match format {
        ArchiveFormat::Zip => {
            let mut archive = ZipArchive::new(Cursor::new(bytes))?;
            archive.extract(dest)?;
        }
        ArchiveFormat::TarGz => {
            use flate2::read::GzDecoder;
            use tar::Archive;

            let mut archive = Archive::new(GzDecoder::new(Cursor::new(bytes)));
            archive
                .unpack(dest)
                .map_err(|e| RelayError::Archive(format!("Failed to extract tarball: {}", e)))?;
        }
    }
    Ok(())
}

/// Content root of an extracted tree. A tree holding exactly one directory
/// and nothing else is unwrapped (`pkg-1.0/...` in source distributions).
pub fn content_root(dir: &Path) -> Result<PathBuf> {
    let mut children = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    if children.len() == 1 {
        let only = children.remove(0).path();
        if only.is_dir() {
            return Ok(only);
        }
    }
    Ok(dir.to_path_buf())
}

/// Pack every file under `root` into a zip archive. Entry order and
/// timestamps are fixed so identical trees give identical bytes.
pub fn repack_zip(root: &Path) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| RelayError::Archive(format!("walked outside archive root: {}", e)))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut buffer = Vec::new();
        fs::File::open(entry.path())?.read_to_end(&mut buffer)?;
        zip.start_file(name, options)?;
        zip.write_all(&buffer)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Extract a downloaded artifact into `workdir` and repack it as one zip
pub fn normalize(filename: &str, bytes: &[u8], workdir: &Path) -> Result<Vec<u8>> {
    let format = ArchiveFormat::from_filename(filename)?;
    extract(bytes, format, workdir)?;

    let root = match ArtifactKind::classify(filename) {
        ArtifactKind::Wheel => workdir.to_path_buf(),
        _ => content_root(workdir)?,
    };
    tracing::debug!(filename, root = %root.display(), "repacking artifact");
    repack_zip(&root)
}
