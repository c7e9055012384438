//! Error taxonomy for library population, persistence and metadata reads.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing the library cache file.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache file not found: {0}")]
    NotFound(PathBuf),

    #[error("cache file is corrupt: {0}")]
    CorruptCache(String),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Maps an I/O error on `path` onto the cache taxonomy.
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => CacheError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                CacheError::PermissionDenied(path.to_path_buf())
            }
            _ => CacheError::Io(err),
        }
    }
}

/// Failures starting a scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("a scan is already in progress")]
    AlreadyScanning,

    #[error("music folder is unavailable: {0}")]
    RootUnavailable(PathBuf),
}

/// Per-file metadata failures. These never abort a scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("unreadable file {0}: {1}")]
    Unreadable(PathBuf, String),

    #[error("unsupported file: {0}")]
    Unsupported(PathBuf),
}

pub type CacheResult<T> = Result<T, CacheError>;
