//! The mock HTTP server: port claiming, background dispatch, teardown.
//!
//! Use it as follows:
//!
//! ```rust
//! use testbench::{MIME_PLAINTEXT, MockServer};
//!
//! let server = MockServer::fixed(200, MIME_PLAINTEXT, "OK").unwrap();
//! // point the client under test at server.port() ...
//! drop(server); // or server.close() explicitly
//! ```

use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::config::{PortRange, REQUEST_READ_TIMEOUT};
use crate::error::Result;
use crate::server::http::{Request, write_response};
use crate::server::responder::{Responder, Response};
use crate::threads::ThreadGuard;

/// Token carried in every dispatch thread's name, so quiesce waits can
/// target the server's background work by substring.
pub const DISPATCH_THREAD_TOKEN: &str = "mock-http";

/// A claimed port together with its bound listener.
///
/// Valid only while the listener is open; once dropped, the OS may hand the
/// port to anyone else.
struct PortLease {
    port: u16,
    listener: TcpListener,
}

/// Scan the range sequentially and claim the first free port.
///
/// The successful bind itself is the availability proof; the listener is
/// kept and handed to the dispatcher, so there is no release-and-rebind
/// window.
fn claim_port(range: PortRange) -> Result<PortLease> {
    for port in range.candidates() {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => return Ok(PortLease { port, listener }),
            Err(err) => {
                warn!(port, %err, "port seems to be used already, trying next one");
            }
        }
    }
    Err(range.exhausted())
}

/// Simple mock HTTP server for exercising client code in tests.
///
/// Binds a free port from a fixed candidate range and serves the configured
/// [`Responder`] on a background dispatch thread until closed or dropped.
#[derive(Debug)]
pub struct MockServer {
    port: u16,
    stop: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Start a server answering every request with the given fixed
    /// (status, content-type, body) triple, on a port from the default
    /// range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFreePort`](crate::Error::NoFreePort) when every
    /// candidate port is in use.
    pub fn fixed(status: u16, content_type: &str, body: &str) -> Result<Self> {
        Self::start(Responder::Fixed(Response::new(status, content_type, body)))
    }

    /// Like [`fixed`](Self::fixed), additionally running `hook` before each
    /// response.
    pub fn fixed_with_hook<H>(hook: H, status: u16, content_type: &str, body: &str) -> Result<Self>
    where
        H: FnMut() + Send + 'static,
    {
        Self::start(Responder::FixedWithHook {
            hook: Box::new(hook),
            response: Response::new(status, content_type, body),
        })
    }

    /// Start a server that computes each response from the inbound request.
    ///
    /// A failure or panic inside `compute` is converted into a 500 response;
    /// it never tears down the listener.
    pub fn computed<C>(compute: C) -> Result<Self>
    where
        C: FnMut(&Request) -> Result<Response> + Send + 'static,
    {
        Self::start(Responder::Computed(Box::new(compute)))
    }

    /// Start a server with the given responder on the default port range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFreePort`](crate::Error::NoFreePort) when every
    /// candidate port is in use.
    pub fn start(responder: Responder) -> Result<Self> {
        Self::start_in_range(responder, PortRange::default())
    }

    /// Start a server scanning the given candidate range instead of the
    /// default one.
    pub fn start_in_range(responder: Responder, range: PortRange) -> Result<Self> {
        let lease = claim_port(range)?;
        let port = lease.port;
        let stop = Arc::new(AtomicBool::new(false));

        let name = format!("{DISPATCH_THREAD_TOKEN}-{port}");
        let guard = ThreadGuard::register(&name);
        let stop_flag = Arc::clone(&stop);
        let dispatcher = thread::Builder::new()
            .name(name)
            .spawn(move || dispatch(lease, responder, &stop_flag, guard))?;

        debug!(port, "mock server started");
        Ok(Self {
            port,
            stop,
            dispatcher: Some(dispatcher),
        })
    }

    /// The bound port, for client-side request construction.
    ///
    /// Only valid between start and [`close`](Self::close).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Shut down the listener and release the port.
    ///
    /// Blocks until the dispatch thread has been reclaimed, so a subsequent
    /// quiesce wait on [`DISPATCH_THREAD_TOKEN`] observes no stragglers.
    /// Idempotent: a second close is a no-op.
    pub fn close(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        // unblock the accept loop; the dispatcher sees the flag and exits
        let _ = TcpStream::connect((Ipv4Addr::LOCALHOST, self.port));
        if dispatcher.join().is_err() {
            warn!(port = self.port, "dispatch thread panicked during shutdown");
        }
        debug!(port = self.port, "mock server closed");
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Accept loop; owns the listener so the port is released exactly when the
/// dispatch thread ends.
fn dispatch(lease: PortLease, mut responder: Responder, stop: &AtomicBool, guard: ThreadGuard) {
    let _guard = guard;
    loop {
        match lease.listener.accept() {
            Ok((stream, _peer)) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                serve_connection(stream, &mut responder);
            }
            Err(err) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                warn!(port = lease.port, %err, "accept failed");
            }
        }
    }
}

/// Serve a single connection: one request in, one response out.
fn serve_connection(mut stream: TcpStream, responder: &mut Responder) {
    if let Err(err) = stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT)) {
        warn!(%err, "failed to set read timeout");
        return;
    }
    let response = match Request::read_from(&mut stream) {
        Ok(request) => responder.respond(&request),
        Err(err) => Response::bad_request(err.to_string()),
    };
    if let Err(err) = write_response(&mut stream, &response) {
        debug!(%err, "client went away before the response was written");
    }
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::responder::MIME_PLAINTEXT;
    use std::io::{self, Read, Write};

    fn http_get(port: u16) -> io::Result<String> {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port))?;
        stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;
        stream.write_all(b"GET / HTTP/1.0\r\nHost: localhost\r\n\r\n")?;
        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        Ok(response)
    }

    #[test]
    fn test_fixed_response_roundtrip() {
        let server = MockServer::start_in_range(
            Responder::Fixed(Response::ok("hello world")),
            PortRange::new(15200, 15210),
        )
        .unwrap();

        let response = http_get(server.port()).unwrap();
        assert!(response.starts_with("HTTP/1.0 200 OK"));
        assert!(response.contains("Content-Type: text/plain"));
        assert!(response.ends_with("hello world"));
    }

    #[test]
    fn test_close_is_idempotent_and_port_is_released() {
        let mut server = MockServer::start_in_range(
            Responder::Fixed(Response::ok("x")),
            PortRange::new(15210, 15220),
        )
        .unwrap();
        let port = server.port();

        server.close();
        server.close();

        // after close the canned success must be unobservable
        match http_get(port) {
            Err(_) => {}
            Ok(response) => assert!(!response.contains('x')),
        }

        // the port is free for the next instance
        let next = MockServer::start_in_range(
            Responder::Fixed(Response::ok("y")),
            PortRange::new(port, port + 1),
        )
        .unwrap();
        assert_eq!(next.port(), port);
    }

    #[test]
    fn test_port_exhaustion_names_range() {
        let range = PortRange::new(15220, 15222);
        let first =
            MockServer::start_in_range(Responder::Fixed(Response::ok("1")), range).unwrap();
        let second =
            MockServer::start_in_range(Responder::Fixed(Response::ok("2")), range).unwrap();

        let err = MockServer::start_in_range(Responder::Fixed(Response::ok("3")), range)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("15220"), "missing start in: {msg}");
        assert!(msg.contains("15222"), "missing end in: {msg}");

        // earlier instances remain independently reachable
        assert!(http_get(first.port()).unwrap().ends_with('1'));
        assert!(http_get(second.port()).unwrap().ends_with('2'));
    }

    #[test]
    fn test_malformed_request_gets_400() {
        let server = MockServer::start_in_range(
            Responder::Fixed(Response::ok("fine")),
            PortRange::new(15230, 15240),
        )
        .unwrap();

        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, server.port())).unwrap();
        stream.write_all(b"NONSENSE\r\n\r\n").unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.0 400 Bad Request"));
    }

    #[test]
    fn test_computed_error_becomes_500() {
        let server = MockServer::start_in_range(
            Responder::Computed(Box::new(|_| {
                Err(crate::Error::InvalidRequest("cannot compute".into()))
            })),
            PortRange::new(15240, 15250),
        )
        .unwrap();

        let response = http_get(server.port()).unwrap();
        assert!(response.starts_with("HTTP/1.0 500 Internal Server Error"));
        assert!(response.contains("cannot compute"));

        // the listener survives the failure
        let again = http_get(server.port()).unwrap();
        assert!(again.starts_with("HTTP/1.0 500"));
    }

    #[test]
    fn test_dispatch_thread_quiesces_after_close() {
        let mut server = MockServer::start_in_range(
            Responder::Fixed(Response::new(200, MIME_PLAINTEXT, "OK")),
            PortRange::new(15250, 15260),
        )
        .unwrap();
        let token = format!("{DISPATCH_THREAD_TOKEN}-{}", server.port());

        server.close();
        crate::threads::assert_no_thread("dispatcher left running", &token).unwrap();
    }
}
