//! Shared fixtures for integration tests
//!
//! `FakeIndex` is an in-memory `PackageIndex` that counts lookups and
//! downloads so tests can assert on upstream traffic.

#![allow(dead_code)]

use async_trait::async_trait;
use pkgrelay_core::artifact::{sha256_hex, ArtifactDescriptor, ArtifactDigest};
use pkgrelay_core::errors::{RelayError, Result};
use pkgrelay_core::index::{PackageIndex, ProjectMetadata};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const SAMPLE_WHEEL: &str = "samplepkg-1.0.0-cp39-cp39-manylinux_2_28_x86_64.whl";
pub const SAMPLE_SDIST: &str = "samplepkg-1.0.0.tar.gz";
pub const SAMPLE_TAGS: &str = "cp39-cp39-manylinux_2_28_x86_64,py3-none-any";

/// How a fake artifact advertises its digest
#[derive(Clone, Copy)]
pub enum Digest {
    Correct,
    Wrong,
    Absent,
}

#[derive(Default)]
pub struct FakeIndex {
    projects: HashMap<String, ProjectMetadata>,
    blobs: HashMap<String, Vec<u8>>,
    lookups: AtomicUsize,
    downloads: AtomicUsize,
    download_delay: Option<Duration>,
    offline: AtomicBool,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a release. The first release added for a project is its latest.
    pub fn with_release(mut self, package: &str, version: &str, files: Vec<(&str, Vec<u8>, Digest)>) -> Self {
        let descriptors = files
            .into_iter()
            .map(|(filename, bytes, digest)| {
                let url = format!("https://files.example/{}/{}", package, filename);
                let digest = match digest {
                    Digest::Correct => Some(ArtifactDigest::sha256(&sha256_hex(&bytes))),
                    Digest::Wrong => Some(ArtifactDigest::sha256(&"0".repeat(64))),
                    Digest::Absent => None,
                };
                self.blobs.insert(url.clone(), bytes);
                ArtifactDescriptor::new(filename, &url, digest)
            })
            .collect();

        let project = self.projects.entry(package.to_string()).or_insert_with(|| ProjectMetadata {
            name: package.to_string(),
            latest_version: version.to_string(),
            releases: BTreeMap::new(),
        });
        project.releases.insert(version.to_string(), descriptors);
        self
    }

    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = Some(delay);
        self
    }

    /// While offline, project lookups fail with `IndexLookup`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PackageIndex for FakeIndex {
    async fn project(&self, package: &str) -> Result<ProjectMetadata> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelayError::IndexLookup("index offline".to_string()));
        }
        self.projects
            .get(package)
            .cloned()
            .ok_or_else(|| RelayError::PackageNotFound(package.to_string()))
    }

    async fn download(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.download_delay {
            tokio::time::sleep(delay).await;
        }
        self.blobs
            .get(&artifact.url)
            .cloned()
            .ok_or_else(|| RelayError::Download(format!("no blob at {}", artifact.url)))
    }
}

pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        zip.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn tar_gz_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, body.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn sample_wheel() -> Vec<u8> {
    zip_bytes(&[
        ("samplepkg/__init__.py", "from .core import answer\n"),
        ("samplepkg/core.py", "def answer():\n    return 42\n"),
        ("samplepkg-1.0.0.dist-info/METADATA", "Name: samplepkg\nVersion: 1.0.0\n"),
    ])
}

pub fn sample_sdist() -> Vec<u8> {
    tar_gz_bytes(&[
        ("samplepkg-1.0.0/samplepkg/__init__.py", "from .core import answer\n"),
        ("samplepkg-1.0.0/samplepkg/core.py", "def answer():\n    return 42\n"),
        ("samplepkg-1.0.0/setup.py", "from setuptools import setup\nsetup()\n"),
    ])
}

/// samplepkg 1.0.0 with a manylinux wheel and an sdist, plus a pure
/// `purepkg` and a wheel-only `nativeonly`
pub fn sample_index() -> FakeIndex {
    FakeIndex::new()
        .with_release(
            "samplepkg",
            "1.0.0",
            vec![
                (SAMPLE_WHEEL, sample_wheel(), Digest::Correct),
                (SAMPLE_SDIST, sample_sdist(), Digest::Correct),
            ],
        )
        .with_release(
            "purepkg",
            "2.0",
            vec![(
                "purepkg-2.0-py3-none-any.whl",
                zip_bytes(&[("purepkg/__init__.py", "NAME = 'purepkg'\n")]),
                Digest::Absent,
            )],
        )
        .with_release(
            "nativeonly",
            "0.1",
            vec![(
                "nativeonly-0.1-cp312-cp312-win_amd64.whl",
                zip_bytes(&[("nativeonly/__init__.py", "")]),
                Digest::Correct,
            )],
        )
}

/// Sorted entry names of a zip archive
pub fn zip_names(bytes: &[u8]) -> Vec<String> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = archive.file_names().map(String::from).collect();
    names.sort();
    names
}
