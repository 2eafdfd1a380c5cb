//! Error types for pkgrelay core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Version {version} not found for package '{package}'")]
    VersionNotFound { package: String, version: String },

    #[error("Malformed artifact name: {0}")]
    MalformedArtifactName(String),

    #[error("No compatible artifact for {package}=={version}")]
    NoCompatibleArtifact { package: String, version: String },

    #[error("SHA256 mismatch for {filename}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("Index lookup error: {0}")]
    IndexLookup(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RelayError {
    /// Stable machine-readable name of the error class, used in service
    /// responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "InvalidRequest",
            RelayError::PackageNotFound(_) => "PackageNotFound",
            RelayError::VersionNotFound { .. } => "VersionNotFound",
            RelayError::MalformedArtifactName(_) => "MalformedArtifactName",
            RelayError::NoCompatibleArtifact { .. } => "NoCompatibleArtifact",
            RelayError::IntegrityMismatch { .. } => "IntegrityMismatch",
            RelayError::IndexLookup(_) => "IndexLookupError",
            RelayError::Download(_) => "DownloadError",
            RelayError::Archive(_) => "ArchiveError",
            RelayError::CacheCorruption(_) => "CacheCorruption",
            RelayError::Config(_) => "ConfigError",
            RelayError::Io(_) => "IoError",
            RelayError::Json(_) => "JsonError",
            RelayError::Yaml(_) => "YamlError",
        }
    }

    /// True for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RelayError::InvalidRequest(_))
    }

    /// True for network failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::IndexLookup(_) | RelayError::Download(_))
    }
}

impl From<zip::result::ZipError> for RelayError {
    fn from(err: zip::result::ZipError) -> Self {
        RelayError::Archive(err.to_string())
    }
}

impl From<walkdir::Error> for RelayError {
    fn from(err: walkdir::Error) -> Self {
        RelayError::Archive(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
