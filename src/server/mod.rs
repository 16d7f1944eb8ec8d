//! Ephemeral HTTP test double.
//!
//! A minimal, single-purpose responder bound to a free local port, used to
//! exercise client code against controllable HTTP behavior without a real
//! backend.

mod http;
mod responder;
#[allow(clippy::module_inception)]
mod server;

pub use http::{Request, reason_phrase};
pub use responder::{MIME_HTML, MIME_PLAINTEXT, Responder, Response};
pub use server::{DISPATCH_THREAD_TOKEN, MockServer};
