//! Error types shared by the event loop and the orchestrator.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::http::ParseError;

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors that can occur while running the proxy.
///
/// Only [`ProxyError::Bind`], [`ProxyError::InvalidAddress`] and
/// [`ProxyError::Poll`] reach the caller of the event loop. Everything else
/// is scoped to a single connection (or pair) and resolved by closing it.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Failed to bind the listening socket.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The configured bind address is not a socket address.
    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    /// The readiness poll itself failed. Fatal.
    #[error("Poll failed: {0}")]
    Poll(#[source] std::io::Error),

    /// Registering a socket with the poller failed.
    #[error("Failed to register socket: {0}")]
    Register(#[source] std::io::Error),

    /// The upstream target did not resolve to any address.
    #[error("Could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    /// Connecting to the upstream origin failed.
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Connecting to the upstream origin took longer than allowed.
    #[error("Connection to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// A header block could not be parsed.
    #[error("Malformed header block: {0}")]
    Parse(#[from] ParseError),

    /// A buffer would have to grow past the configured maximum.
    #[error("Buffer limit of {limit} bytes exceeded")]
    BufferLimit { limit: usize },

    /// Socket level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
