//! HTTP/1.1 header handling.
//!
//! # Data Flow
//! ```text
//! connection buffer
//!     → boundary.rs (find the blank line ending the header block)
//!     → request.rs (client side: classify GET / CONNECT, rebuild outbound GET)
//!     → response.rs (upstream side: header length + Content-Length framing)
//! ```
//!
//! Only an allow-list of fields is captured. Any other header line is
//! syntactically accepted and dropped with a debug log.

pub mod boundary;
pub mod request;
pub mod response;

use thiserror::Error;

pub use boundary::{end_of_header_block, HEADER_TERMINATOR};
pub use request::{Request, RequestFields, RequestKind};
pub use response::{Response, ResponseFields};

/// Protocol version used in every frame the proxy builds.
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Identity the proxy presents as `User-Agent` and in the captured `Server`.
pub const PROXY_AGENT: &str = "MYProxy/1.0";

/// Frame queued to the client once a CONNECT tunnel is established.
pub const CONNECT_ESTABLISHED: &[u8] =
    b"HTTP/1.1 200 Connection established\r\nProxy-Agent: ProxyServer/1.0\r\n\r\n";

pub(crate) const LINE_SEPARATOR: &str = "\r\n";

/// Errors raised while turning a header block into a structured message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Header block is not valid UTF-8.
    #[error("header block is not valid UTF-8")]
    InvalidUtf8,

    /// Header block contains no start line.
    #[error("empty header block")]
    Empty,

    /// Request line is not `METHOD TARGET VERSION`.
    #[error("malformed request line: {0}")]
    MalformedRequestLine(String),

    /// Status line does not start with an HTTP version.
    #[error("malformed status line: {0}")]
    MalformedStatusLine(String),

    /// Neither the request target nor a Host field names a host.
    #[error("request names no target host")]
    MissingHost,

    /// Port is not a valid 16-bit number.
    #[error("invalid port in {0}")]
    InvalidPort(String),

    /// Content-Length is not a decimal number.
    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),
}

/// Split a header line into a trimmed `(name, value)` pair.
pub(crate) fn split_field(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}
