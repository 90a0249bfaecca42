//! Client request parsing and outbound request construction.
//!
//! # Responsibilities
//! - Classify the request line as GET, CONNECT, or unsupported
//! - Extract target host/port (URL, CONNECT authority, or Host field)
//! - Capture the allow-listed fields: Host, Accept, Accept-Encoding, Connection
//! - Rebuild a canonical GET; the client's request is never forwarded verbatim

use std::borrow::Cow;
use std::net::Ipv6Addr;

use url::{Host, Position, Url};

use super::{split_field, ParseError, HTTP_VERSION, LINE_SEPARATOR, PROXY_AGENT};

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_TUNNEL_PORT: u16 = 443;

/// Request classification taken from the request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Get,
    Connect,
    /// Any other method; carries the method token for logging.
    Unsupported(String),
}

/// Allow-listed request fields. Everything else is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFields {
    pub host: Option<String>,
    pub accept: Option<String>,
    pub accept_encoding: Option<String>,
    pub connection: Option<String>,
}

/// A parsed client request header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub kind: RequestKind,
    /// Target host, without brackets for IPv6 literals.
    pub host: String,
    pub port: u16,
    /// Path and query to request from the origin. GET only.
    pub path: Option<String>,
    pub fields: RequestFields,
}

impl Request {
    /// Parse a complete header block (terminator included).
    pub fn parse(block: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(block).map_err(|_| ParseError::InvalidUtf8)?;
        let mut lines = text.split(LINE_SEPARATOR).filter(|line| !line.is_empty());

        let request_line = lines.next().ok_or(ParseError::Empty)?;
        let mut parts = request_line.split_whitespace();
        let (method, target) = match (parts.next(), parts.next()) {
            (Some(method), Some(target)) => (method, target),
            _ => return Err(ParseError::MalformedRequestLine(request_line.to_string())),
        };

        let mut fields = RequestFields::default();
        for line in lines {
            match split_field(line) {
                Some((name, value)) if name.eq_ignore_ascii_case("Host") => {
                    fields.host = Some(value.to_string());
                }
                Some((name, value)) if name.eq_ignore_ascii_case("Accept") => {
                    fields.accept = Some(value.to_string());
                }
                Some((name, value)) if name.eq_ignore_ascii_case("Accept-Encoding") => {
                    fields.accept_encoding = Some(value.to_string());
                }
                Some((name, value)) if name.eq_ignore_ascii_case("Connection") => {
                    fields.connection = Some(value.to_string());
                }
                _ => tracing::debug!(line, "Request header field not implemented, dropping"),
            }
        }

        let (kind, host, port, path) = match method {
            "GET" => {
                let (host, port, path) = resolve_get_target(target, &fields)?;
                (RequestKind::Get, host, port, Some(path))
            }
            "CONNECT" => {
                let (host, port) = split_authority(target, DEFAULT_TUNNEL_PORT)?;
                (RequestKind::Connect, host, port, None)
            }
            other => {
                let (host, port) = match fields.host.as_deref() {
                    Some(value) => split_authority(value, DEFAULT_HTTP_PORT)?,
                    None => (String::new(), DEFAULT_HTTP_PORT),
                };
                (RequestKind::Unsupported(other.to_string()), host, port, None)
            }
        };

        if host.is_empty() && !matches!(kind, RequestKind::Unsupported(_)) {
            return Err(ParseError::MissingHost);
        }

        Ok(Self {
            kind,
            host,
            port,
            path,
            fields,
        })
    }

    /// Whether `other` targets the same `(host, port)` as this request.
    pub fn same_target(&self, other: &Request) -> bool {
        self.port == other.port && self.host.eq_ignore_ascii_case(&other.host)
    }

    /// Build the canonical outbound GET.
    ///
    /// Field order is fixed: request line, User-Agent, Accept, Host,
    /// Accept-Encoding, Connection. Only meaningful for [`RequestKind::Get`].
    pub fn build_forward_request(&self) -> Vec<u8> {
        let path = self.path.as_deref().unwrap_or("/");

        let mut out = format!("GET {path} {HTTP_VERSION}{LINE_SEPARATOR}");
        out.push_str(&format!("User-Agent: {PROXY_AGENT}{LINE_SEPARATOR}"));
        if let Some(accept) = &self.fields.accept {
            out.push_str(&format!("Accept: {accept}{LINE_SEPARATOR}"));
        }
        out.push_str(&format!("Host: {}{LINE_SEPARATOR}", self.host_field()));
        if let Some(encoding) = &self.fields.accept_encoding {
            out.push_str(&format!("Accept-Encoding: {encoding}{LINE_SEPARATOR}"));
        }
        out.push_str("Connection: Keep-Alive");
        out.push_str(LINE_SEPARATOR);
        out.push_str(LINE_SEPARATOR);

        out.into_bytes()
    }

    /// Host as written in a Host field; IPv6 literals get their brackets back.
    fn host_field(&self) -> Cow<'_, str> {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            Cow::Owned(format!("[{}]", self.host))
        } else {
            Cow::Borrowed(&self.host)
        }
    }
}

/// Resolve host, port and path for a GET target.
///
/// Absolute-form targets carry everything; origin-form targets take host and
/// port from the Host field.
fn resolve_get_target(
    target: &str,
    fields: &RequestFields,
) -> Result<(String, u16, String), ParseError> {
    if target.contains("://") {
        let url = Url::parse(target)
            .map_err(|_| ParseError::MalformedRequestLine(format!("GET {target}")))?;
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(ParseError::MissingHost),
        };
        let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);
        let path = match &url[Position::BeforePath..Position::AfterQuery] {
            "" => "/".to_string(),
            path => path.to_string(),
        };
        return Ok((host, port, path));
    }

    let value = fields.host.as_deref().ok_or(ParseError::MissingHost)?;
    let (host, port) = split_authority(value, DEFAULT_HTTP_PORT)?;
    let path = if target.starts_with('/') {
        target.to_string()
    } else {
        "/".to_string()
    };
    Ok((host, port, path))
}

/// Split `host[:port]` (or `[v6]:port`) using `default_port` when absent.
fn split_authority(authority: &str, default_port: u16) -> Result<(String, u16), ParseError> {
    let parse_port = |port: &str| {
        port.parse::<u16>()
            .map_err(|_| ParseError::InvalidPort(authority.to_string()))
    };

    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ParseError::InvalidPort(authority.to_string()))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(port)?,
            None => default_port,
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), parse_port(port)?)),
        None => Ok((authority.to_string(), default_port)),
    }
}
