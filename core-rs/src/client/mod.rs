//! Client-side package loading
//!
//! A client computes its own tags, asks a relay for `/get_package`, unpacks
//! the returned zip into a private temp directory and hands the archive to a
//! `UnitLoader`. Loaded packages live in an explicit `LoadedPackages`
//! registry owned by the caller; there is no process-global state.
//!
//! Loading never executes fetched code. `ModuleTableLoader` resolves an
//! archive into a module-name → source table; running that source belongs to
//! an embedding runtime.

use crate::errors::{RelayError, Result};
use crate::pipeline::archive::{self, ArchiveFormat};
use crate::pipeline::extract_modules;
use crate::server::ErrorBody;
use crate::tags::TagSet;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Turns a fetched archive into a usable unit
pub trait UnitLoader: Send + Sync {
    type Unit;

    fn load(&self, name: &str, archive: &[u8]) -> Result<Self::Unit>;
}

/// Module table of one package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTable {
    pub package: String,
    pub modules: BTreeMap<String, String>,
}

impl ModuleTable {
    pub fn source(&self, module: &str) -> Option<&str> {
        self.modules.get(module).map(String::as_str)
    }

    /// Module matching the package name, if the archive has one
    pub fn root_module(&self) -> Option<&str> {
        self.source(&self.package)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleTableLoader;

impl UnitLoader for ModuleTableLoader {
    type Unit = ModuleTable;

    fn load(&self, name: &str, archive: &[u8]) -> Result<ModuleTable> {
        Ok(ModuleTable {
            package: name.to_string(),
            modules: extract_modules(archive)?,
        })
    }
}

/// One package unpacked on the client
#[derive(Debug)]
pub struct LoadedPackage<U> {
    pub name: String,
    pub version: Option<String>,
    /// SHA-256 of the archive as served
    pub sha256: String,
    /// Unpacked archive; removed when the package is dropped
    pub root: TempDir,
    /// Archive-relative paths of the unpacked files
    pub files: Vec<String>,
    pub unit: U,
}

/// Packages loaded by this process, keyed by name
#[derive(Debug)]
pub struct LoadedPackages<U> {
    packages: BTreeMap<String, LoadedPackage<U>>,
}

impl<U> Default for LoadedPackages<U> {
    fn default() -> Self {
        Self {
            packages: BTreeMap::new(),
        }
    }
}

impl<U> LoadedPackages<U> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&LoadedPackage<U>> {
        self.packages.get(name)
    }

    pub fn insert(&mut self, package: LoadedPackage<U>) {
        self.packages.insert(package.name.clone(), package);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Fetches packages from a relay server
pub struct RemoteImporter<L: UnitLoader> {
    server_url: String,
    http: reqwest::Client,
    tags: TagSet,
    loader: L,
}

impl<L: UnitLoader> RemoteImporter<L> {
    pub fn new(server_url: &str, tags: TagSet, loader: L, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            http,
            tags,
            loader,
        })
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Return the loaded package, fetching it on first use
    pub async fn import<'r>(
        &self,
        registry: &'r mut LoadedPackages<L::Unit>,
        name: &str,
        version: Option<&str>,
    ) -> Result<&'r LoadedPackage<L::Unit>> {
        if !registry.contains(name) {
            let package = self.fetch(name, version).await?;
            registry.insert(package);
        } else {
            tracing::debug!(package = name, "already loaded");
        }

        registry
            .get(name)
            .ok_or_else(|| RelayError::PackageNotFound(name.to_string()))
    }

    async fn fetch(&self, name: &str, version: Option<&str>) -> Result<LoadedPackage<L::Unit>> {
        let url = format!("{}/get_package", self.server_url);
        let wire_tags = self.tags.to_wire();
        let mut query = vec![("package", name), ("tags", wire_tags.as_str())];
        if let Some(version) = version {
            query.push(("version", version));
        }

        tracing::info!(package = name, server = %self.server_url, "fetching package");
        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| RelayError::Download(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        let sha256 = response
            .headers()
            .get("x-artifact-sha256")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::Download(format!("reading {}: {}", url, e)))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorBody>(&body)
                .map(|b| format!("{}: {}", b.kind, b.error))
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string());
            return Err(RelayError::Download(format!("relay returned {} for {}: {}", status, name, detail)));
        }

        let actual = crate::artifact::sha256_hex(&body);
        if let Some(expected) = sha256 {
            if expected != actual {
                return Err(RelayError::IntegrityMismatch {
                    filename: format!("{}.zip", name),
                    expected,
                    actual,
                });
            }
        }

        let root = TempDir::new()?;
        let files = unpack_archive(&body, root.path())?;
        let unit = self.loader.load(name, &body)?;

        Ok(LoadedPackage {
            name: name.to_string(),
            version: version.map(str::to_string),
            sha256: actual,
            root,
            files,
            unit,
        })
    }
}

/// Unpack a served zip into `dest`, returning the relative file paths
pub fn unpack_archive(bytes: &[u8], dest: &Path) -> Result<Vec<String>> {
    archive::extract(bytes, ArchiveFormat::Zip, dest)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(dest).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(dest) {
            files.push(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            );
        }
    }
    Ok(files)
}
