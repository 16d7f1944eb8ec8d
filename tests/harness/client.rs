//! Minimal blocking HTTP client for exercising the mock server.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::time::Duration;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A parsed client-side view of one mock-server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// GET `/` on the given local port.
pub fn get(port: u16) -> io::Result<HttpResponse> {
    get_path(port, "/")
}

/// GET an arbitrary path on the given local port.
pub fn get_path(port: u16, path: &str) -> io::Result<HttpResponse> {
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port))?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.set_write_timeout(Some(CLIENT_TIMEOUT))?;

    let request = format!("GET {path} HTTP/1.0\r\nHost: localhost\r\n\r\n");
    stream.write_all(request.as_bytes())?;

    let mut raw = String::new();
    stream.read_to_string(&mut raw)?;
    parse(&raw)
}

fn parse(raw: &str) -> io::Result<HttpResponse> {
    let invalid = || io::Error::new(io::ErrorKind::InvalidData, "malformed response");

    let status_line = raw.lines().next().ok_or_else(invalid)?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)?;
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .ok_or_else(invalid)?;

    Ok(HttpResponse { status, body })
}
