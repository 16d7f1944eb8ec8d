//! Minimal HTTP/1.0 request parsing and response serialization.
//!
//! Just enough protocol support for a single-purpose test double: request
//! line plus headers in, a fixed or computed response out, one request per
//! connection.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;

use crate::error::{Error, Result};
use crate::server::responder::Response;

/// Upper bound on the request head (request line + headers).
const MAX_REQUEST_HEAD: usize = 8192;

/// A parsed inbound request, handed to computed responders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Request path, e.g. `/status`.
    pub path: String,
    /// Headers with lowercase names and trimmed values.
    pub headers: HashMap<String, String>,
}

impl Request {
    /// Look up a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Read one request head from the stream, up to the empty line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on read failures or timeout and
    /// [`Error::InvalidRequest`] on malformed data.
    pub(crate) fn read_from(stream: &mut TcpStream) -> Result<Self> {
        let mut data = Vec::new();
        let mut chunk = [0_u8; 1024];
        while !contains_head_terminator(&data) {
            if data.len() > MAX_REQUEST_HEAD {
                return Err(Error::InvalidRequest("request head too large".into()));
            }
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(Error::InvalidRequest(
                    "connection closed before request was complete".into(),
                ));
            }
            data.extend_from_slice(&chunk[..n]);
        }
        Self::parse(&data)
    }

    /// Parse a request head from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the data is not UTF-8 or the
    /// request line is malformed.
    pub(crate) fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidRequest("request is not valid UTF-8".into()))?;

        let mut lines = text.lines();

        // Parse request line: "GET /path HTTP/1.x"
        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidRequest("empty request".into()))?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(Error::InvalidRequest(format!(
                "invalid request line: {request_line}"
            )));
        }
        if !parts[2].starts_with("HTTP/") {
            return Err(Error::InvalidRequest(format!(
                "invalid protocol version: {}",
                parts[2]
            )));
        }

        Ok(Self {
            method: parts[0].to_string(),
            path: parts[1].to_string(),
            headers: parse_headers(lines),
        })
    }
}

/// Parse header lines into a case-insensitive map (lowercase keys, trimmed
/// values). Stops at the first empty line.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

fn contains_head_terminator(data: &[u8]) -> bool {
    data.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Standard reason phrase for the status codes the test double produces.
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Serialize and send a response, closing semantics left to the caller.
pub(crate) fn write_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let head = format!(
        "HTTP/1.0 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason_phrase(response.status),
        response.content_type,
        response.body.len(),
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(response.body.as_bytes())?;
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line_and_headers() {
        let raw = b"GET /status HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n";
        let request = Request::parse(raw).unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/status");
        assert_eq!(request.header("host"), Some("localhost"));
        assert_eq!(request.header("Accept"), Some("*/*"));
        assert_eq!(request.header("missing"), None);
    }

    #[test]
    fn test_parse_rejects_bad_request_line() {
        assert!(matches!(
            Request::parse(b"GET /\r\n\r\n"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Request::parse(b"GET / SMTP/1.0\r\n\r\n"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Request::parse(&[0xff, 0xfe, 0x20]),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_reason_phrases() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(500), "Internal Server Error");
        assert_eq!(reason_phrase(999), "Unknown");
    }
}
