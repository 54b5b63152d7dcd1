//! Request head parsing and origin-form rewriting.
//!
//! The whole request head must arrive in the connection's first read. A
//! request whose line or headers do not fit is rejected as malformed; the
//! proxy does not reassemble heads spanning several reads.

use crate::error::{ProxyError, Result};

/// Methods accepted for forwarding.
pub const KNOWN_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];

/// The tunnelling method.
pub const CONNECT: &str = "CONNECT";

/// Port assumed for CONNECT targets without one.
pub const DEFAULT_CONNECT_PORT: u16 = 443;

const CRLF: &[u8] = b"\r\n";
const END_OF_HEADER: &[u8] = b"\r\n\r\n";

/// Whether `data` starts with a method this proxy handles.
///
/// The leading token is compared case-insensitively against
/// [`KNOWN_METHODS`] and [`CONNECT`].
#[must_use]
pub fn is_proxy_request(data: &[u8]) -> bool {
    let token_end = data
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let token = &data[..token_end];

    KNOWN_METHODS
        .iter()
        .chain(std::iter::once(&CONNECT))
        .any(|method| token.eq_ignore_ascii_case(method.as_bytes()))
}

/// Parsed `METHOD target VERSION` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub version: String,
    /// Offset of the CRLF terminating the line
    line_end: usize,
}

impl RequestLine {
    /// Parse the request line at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let line_end = find(data, CRLF).ok_or_else(|| {
            ProxyError::HttpParse("request line not terminated within read buffer".to_string())
        })?;
        let line = std::str::from_utf8(&data[..line_end])
            .map_err(|_| ProxyError::HttpParse("request line is not valid UTF-8".to_string()))?;

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(ProxyError::HttpParse(format!(
                "malformed request line: {}",
                line
            )));
        }

        Ok(Self {
            method: parts[0].to_string(),
            target: parts[1].to_string(),
            version: parts[2].to_string(),
            line_end,
        })
    }

    /// Whether this is a CONNECT request.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case(CONNECT)
    }
}

/// Offset of the blank line ending the request head in `data`.
///
/// A head without one did not fit in the read buffer and is malformed.
pub fn header_end(data: &[u8]) -> Result<usize> {
    find(data, END_OF_HEADER)
        .ok_or_else(|| ProxyError::HttpParse("request headers exceed read buffer".to_string()))
}

/// Parse the `host[:port]` target of a CONNECT request.
pub fn parse_connect_target(target: &str) -> Result<(String, u16)> {
    let parts: Vec<&str> = target.split(':').collect();
    let (host, port) = match parts.as_slice() {
        [host] => (*host, DEFAULT_CONNECT_PORT),
        [host, port] => {
            let port = port.parse::<u16>().map_err(|_| {
                ProxyError::HttpParse(format!("invalid port in CONNECT: {}", target))
            })?;
            (*host, port)
        }
        _ => {
            return Err(ProxyError::HttpParse(format!(
                "invalid host/port in CONNECT: {}",
                target
            )))
        }
    };

    if host.is_empty() {
        return Err(ProxyError::HttpParse(format!(
            "missing host in CONNECT: {}",
            target
        )));
    }
    Ok((host.to_string(), port))
}

/// Upstream location of an absolute-form request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub host: String,
    pub port: u16,
    /// Path plus query, always starting with `/`
    pub path_and_query: String,
}

impl ForwardTarget {
    /// Parse an absolute `http://` or `https://` URL.
    pub fn parse(target: &str) -> Result<Self> {
        let parsed = url::Url::parse(target)
            .map_err(|e| ProxyError::HttpParse(format!("invalid request URL '{}': {}", target, e)))?;

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ProxyError::HttpParse(format!(
                "unsupported URL scheme: {}",
                target
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ProxyError::HttpParse(format!("missing host in URL: {}", target)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| ProxyError::HttpParse(format!("missing port in URL: {}", target)))?;

        let path = match parsed.path() {
            "" => "/",
            path => path,
        };
        let path_and_query = match parsed.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path.to_string(),
        };

        Ok(Self {
            host,
            port,
            path_and_query,
        })
    }
}

/// Rebuild a request for the origin server.
///
/// The request line becomes `METHOD path?query VERSION`; the header block
/// and any body bytes already read are passed through unmodified.
pub fn to_origin_form(data: &[u8], line: &RequestLine, path_and_query: &str) -> Result<Vec<u8>> {
    let end_of_header = header_end(data)?;

    let request_line = format!("{} {} {}\r\n", line.method, path_and_query, line.version);
    let headers_start = line.line_end + CRLF.len();
    let body = &data[end_of_header + END_OF_HEADER.len()..];

    let mut out = Vec::with_capacity(request_line.len() + data.len());
    out.extend_from_slice(request_line.as_bytes());
    if end_of_header > line.line_end {
        out.extend_from_slice(&data[headers_start..end_of_header]);
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(CRLF);
    out.extend_from_slice(body);
    Ok(out)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
