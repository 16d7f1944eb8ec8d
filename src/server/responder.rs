//! Responder behavior of the mock HTTP server.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::Result;
use crate::server::http::Request;

/// Mime type for plain-text responses.
pub const MIME_PLAINTEXT: &str = "text/plain";

/// Mime type for HTML responses.
pub const MIME_HTML: &str = "text/html";

/// An HTTP response produced by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header.
    pub content_type: String,
    /// Response body.
    pub body: String,
}

impl Response {
    /// Create a response from a (status, content-type, body) triple.
    #[must_use]
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// A `200 OK` plain-text response.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, MIME_PLAINTEXT, body)
    }

    /// A `500 Internal Server Error` plain-text response with the given
    /// detail in the body.
    #[must_use]
    pub fn server_error(detail: impl Into<String>) -> Self {
        Self::new(500, MIME_PLAINTEXT, detail)
    }

    /// A `400 Bad Request` plain-text response.
    #[must_use]
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(400, MIME_PLAINTEXT, detail)
    }
}

/// The configured behavior of the mock server; exactly one mode is active
/// per instance.
pub enum Responder {
    /// Return the same fixed response for every request.
    Fixed(Response),
    /// Run a side-effecting hook, then return the fixed response.
    FixedWithHook {
        /// Invoked once per request, before the response is produced.
        hook: Box<dyn FnMut() + Send>,
        /// The fixed response.
        response: Response,
    },
    /// Compute the response per request.
    Computed(Box<dyn FnMut(&Request) -> Result<Response> + Send>),
}

impl Responder {
    /// Produce the response for one inbound request.
    ///
    /// Failures and panics while computing a response are converted into a
    /// server-error response so the client side observes a failed call
    /// instead of the listener crashing.
    pub(crate) fn respond(&mut self, request: &Request) -> Response {
        match self {
            Responder::Fixed(response) => response.clone(),
            Responder::FixedWithHook { hook, response } => {
                match catch_unwind(AssertUnwindSafe(|| hook())) {
                    Ok(()) => response.clone(),
                    Err(payload) => {
                        Response::server_error(crate::harness::panic_message(payload))
                    }
                }
            }
            Responder::Computed(compute) => {
                match catch_unwind(AssertUnwindSafe(|| compute(request))) {
                    Ok(Ok(response)) => response,
                    Ok(Err(err)) => Response::server_error(err.to_string()),
                    Err(payload) => {
                        Response::server_error(crate::harness::panic_message(payload))
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Responder::Fixed(response) => f.debug_tuple("Fixed").field(response).finish(),
            Responder::FixedWithHook { response, .. } => f
                .debug_struct("FixedWithHook")
                .field("response", response)
                .finish_non_exhaustive(),
            Responder::Computed(_) => f.debug_tuple("Computed").finish_non_exhaustive(),
        }
    }
}
