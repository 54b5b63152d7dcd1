//! Error types for the guardian core library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building or loading classification structures.
#[derive(Error, Debug)]
pub enum GuardianError {
    #[error("Invalid filter configuration: {0}")]
    InvalidFilterConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read blocklist {path}: {source}")]
    BlocklistRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Proxy error: {0}")]
    Proxy(String),

    #[error("Editor failed: {0}")]
    Editor(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for guardian operations.
pub type Result<T> = std::result::Result<T, GuardianError>;
