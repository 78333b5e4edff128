//! Error taxonomy shared by the catalog mutations.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("entry '{key}' not found in {}", path.display())]
    EntryNotFound { path: PathBuf, key: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("at least two distinct packs are required (got {got})")]
    InsufficientPacks { got: usize },

    #[error("unknown pack '{0}'")]
    UnknownPack(String),

    #[error("already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("restore target is occupied: {}", .0.display())]
    Conflict(PathBuf),

    #[error("failed to write merged manifest {}: {source}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog is locked by another process ({})", .0.display())]
    Locked(PathBuf),
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

impl CatalogError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CatalogError::Io { path: path.as_ref().to_path_buf(), source }
    }

    /// Stable machine-readable code for JSON reports.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::EntryNotFound { .. } => "entry_not_found",
            CatalogError::Io { .. } => "io",
            CatalogError::InvalidName { .. } => "invalid_name",
            CatalogError::InsufficientPacks { .. } => "insufficient_packs",
            CatalogError::UnknownPack(_) => "unknown_pack",
            CatalogError::AlreadyExists(_) => "already_exists",
            CatalogError::NotFound(_) => "not_found",
            CatalogError::Conflict(_) => "conflict",
            CatalogError::ManifestWrite { .. } => "manifest_write",
            CatalogError::Locked(_) => "locked",
        }
    }
}

/// Extension for attaching a path to raw I/O results.
pub trait IoResultExt<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| CatalogError::io(path, e))
    }
}
