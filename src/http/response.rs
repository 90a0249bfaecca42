//! Upstream response header parsing.
//!
//! Only framing matters to the relay: the header length and Content-Length
//! decide when an exchange is complete. A response without Content-Length is
//! never complete by count.

use super::{split_field, ParseError, LINE_SEPARATOR, PROXY_AGENT};

/// Allow-listed response fields. `server` always holds the proxy identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFields {
    pub date: Option<String>,
    pub server: Option<String>,
    pub accept_ranges: Option<String>,
    pub content_type: Option<String>,
    pub connection: Option<String>,
}

/// A parsed upstream response header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Length of the header block including the terminator.
    pub header_length: usize,
    pub content_length: Option<u64>,
    pub fields: ResponseFields,
}

impl Response {
    /// Parse a complete header block (terminator included).
    pub fn parse(block: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(block).map_err(|_| ParseError::InvalidUtf8)?;
        let mut lines = text.split(LINE_SEPARATOR).filter(|line| !line.is_empty());

        let status_line = lines.next().ok_or(ParseError::Empty)?;
        let status = parse_status_line(status_line)?;

        let mut content_length = None;
        let mut fields = ResponseFields::default();
        for line in lines {
            let Some((name, value)) = split_field(line) else {
                tracing::debug!(line, "Malformed response header line, dropping");
                continue;
            };

            if name.eq_ignore_ascii_case("Content-Length") {
                let length = value
                    .parse::<u64>()
                    .map_err(|_| ParseError::InvalidContentLength(value.to_string()))?;
                content_length = Some(length);
            } else if name.eq_ignore_ascii_case("Date") {
                fields.date = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("Server") {
                fields.server = Some(PROXY_AGENT.to_string());
            } else if name.eq_ignore_ascii_case("Accept-Ranges") {
                fields.accept_ranges = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("Content-Type") {
                fields.content_type = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("Connection") {
                fields.connection = Some(value.to_string());
            } else {
                tracing::debug!(line, "Response header field not implemented, dropping");
            }
        }

        Ok(Self {
            status,
            header_length: block.len(),
            content_length,
            fields,
        })
    }

    /// Total bytes of the exchange (header + body), if framed by length.
    pub fn total_length(&self) -> Option<u64> {
        self.content_length
            .map(|length| self.header_length as u64 + length)
    }

    /// Bytes still owed after `transferred` bytes, if framed by length.
    pub fn remaining(&self, transferred: u64) -> Option<u64> {
        self.total_length()
            .map(|total| total.saturating_sub(transferred))
    }

    /// Whether `transferred` bytes cover the whole exchange.
    pub fn is_complete(&self, transferred: u64) -> bool {
        self.total_length()
            .is_some_and(|total| transferred >= total)
    }
}

fn parse_status_line(line: &str) -> Result<u16, ParseError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map_err(|_| ParseError::MalformedStatusLine(line.to_string())),
        _ => Err(ParseError::MalformedStatusLine(line.to_string())),
    }
}
