//! Error types for package operations.

use std::path::PathBuf;

/// Errors that can occur while installing, removing, or recording packages.
#[derive(Debug, thiserror::Error)]
pub enum CnshError {
    /// The package name cannot be mapped to an install directory.
    #[error("invalid package name '{name}': {detail}")]
    InvalidPackageName { name: String, detail: String },

    /// Registry lookup failed (network, unknown package, bad metadata).
    #[error("failed to resolve '{name}': {detail}")]
    Resolution { name: String, detail: String },

    /// Archive transfer failed or the archive is too small to be valid.
    #[error("failed to download '{name}': {detail}")]
    Download { name: String, detail: String },

    /// Archive could not be unpacked.
    #[error("failed to extract '{name}': {detail}")]
    Extraction { name: String, detail: String },

    /// Bulk install was requested without a project manifest.
    #[error("{} not found", path.display())]
    ManifestNotFound { path: PathBuf },

    /// A lock file or manifest exists but is not valid JSON of the expected shape.
    #[error("failed to parse {}: {detail}", path.display())]
    Parse { path: PathBuf, detail: String },

    /// `cnsh.toml` could not be read or parsed.
    #[error("invalid configuration at {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    /// The lock-store actor is no longer running.
    #[error("lock store for {} is closed", path.display())]
    LockStoreClosed { path: PathBuf },

    /// Filesystem error at a specific path.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of a [`CnshError`], used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad command-line input, including unusable package names.
    Usage,
    Resolution,
    Download,
    Extraction,
    ManifestNotFound,
    Parse,
    /// Configuration, filesystem, or lock-store failures.
    Internal,
}

impl CnshError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CnshError::InvalidPackageName { .. } => ErrorKind::Usage,
            CnshError::Resolution { .. } => ErrorKind::Resolution,
            CnshError::Download { .. } => ErrorKind::Download,
            CnshError::Extraction { .. } => ErrorKind::Extraction,
            CnshError::ManifestNotFound { .. } => ErrorKind::ManifestNotFound,
            CnshError::Parse { .. } => ErrorKind::Parse,
            CnshError::Config { .. }
            | CnshError::LockStoreClosed { .. }
            | CnshError::Io { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CnshError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for package operations.
pub type Result<T> = std::result::Result<T, CnshError>;
