//! # testbench - Test Instrumentation Primitives
//!
//! `testbench` supplies reusable building blocks for exercising the
//! concurrency, lifecycle and network behavior of other code inside a test
//! process.
//!
//! ## Components
//!
//! - **Stress harness** ([`WorkerPlan`], [`run_with_barrier`]) - runs test
//!   logic across many parallel OS threads with synchronized starts and a
//!   single aggregated verdict
//! - **Leak verifier** ([`LeakVerifier`]) - proves that reference-counted
//!   objects are released once their legitimate holders drop them, with
//!   bounded retries and pacing
//! - **Mock HTTP server** ([`MockServer`]) - a short-lived responder on a
//!   dynamically chosen local port, for simulating a remote endpoint
//! - **Thread quiesce helpers** ([`threads`]) - wait for named background
//!   work to finish, or fail loudly when it straggles
//!
//! ## Quick Start
//!
//! ```rust
//! use testbench::{MockServer, WorkerPlan, MIME_PLAINTEXT};
//!
//! let server = MockServer::fixed(200, MIME_PLAINTEXT, "OK").unwrap();
//! WorkerPlan::new(4, 25)
//!     .unwrap()
//!     .execute(|_worker, _iteration| {
//!         // hammer server.port() with the client under test ...
//!         Ok(())
//!     })
//!     .unwrap();
//! drop(server);
//! testbench::threads::wait_for_thread_substring(testbench::DISPATCH_THREAD_TOKEN);
//! ```
//!
//! These are deterministic, bounded-time verification primitives for use
//! inside a test process, not a production concurrency library.

pub mod config;
pub mod error;
pub mod harness;
pub mod leak;
pub mod server;
pub mod threads;

pub use config::PortRange;
pub use error::{BoxError, Error, Result};
pub use harness::{ExecutionOutcome, WorkerPlan, run_with_barrier};
pub use leak::{AbortHandle, LeakVerifier};
pub use server::{
    DISPATCH_THREAD_TOKEN, MIME_HTML, MIME_PLAINTEXT, MockServer, Request, Responder, Response,
};
pub use threads::RESERVED_THREAD_PREFIX;
