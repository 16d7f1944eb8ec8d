//! Test harness utilities shared by the integration suites.
//!
//! Provides a tiny blocking HTTP client for talking to the mock server
//! without pulling a real client stack into the tests.

mod client;

pub use client::{HttpResponse, get, get_path};

/// Install an env-filtered fmt subscriber for the test process.
///
/// Safe to call from every test; only the first call in the process wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
