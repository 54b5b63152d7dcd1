//! Error types for the guardian-proxy crate.

use thiserror::Error;

/// Errors that can occur in the proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Proxy bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP parse error: {0}")]
    HttpParse(String),

    #[error("Not an HTTP proxy request")]
    UnknownMethod,

    #[error("Request denied by classifier: {target}")]
    Denied { target: String },

    #[error("Upstream connection failed to {host}: {reason}")]
    UpstreamConnect { host: String, reason: String },

    #[error("Client sent no request within the I/O timeout")]
    ReadTimeout,

    #[error("Relay idle for longer than the I/O timeout")]
    RelayTimeout,

    #[error("System proxy registration failed: {0}")]
    SystemProxy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Proxy shutdown")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Whether this is the shutdown signal rather than a fault.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProxyError::Cancelled)
    }
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
