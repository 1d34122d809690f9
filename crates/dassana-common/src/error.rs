//! Error types for shared utilities

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to compress '{path}': {source}")]
    Compression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decompress gzip data: {0}")]
    Decompression(#[source] std::io::Error),
}

impl CommonError {
    pub fn compression(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Compression {
            path: path.into(),
            source,
        }
    }
}
