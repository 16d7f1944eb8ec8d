//! Error types for the test instrumentation primitives.
//!
//! This module defines all fatal conditions a test can observe from the
//! stress harness, the leak verifier and the mock HTTP server. Every variant
//! carries enough context to locate the defect without re-running.

use thiserror::Error;

/// Result type alias for test instrumentation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type accepted from user-supplied work closures.
///
/// Any test error converts into this via `?`, so workloads can use their own
/// error types without adapters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during test instrumentation operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Every candidate port in the scanned range was already in use.
    ///
    /// The message names both range endpoints verbatim so tests can assert
    /// on the exact range.
    #[error("No free port found in the range of [{start} - {end}]")]
    NoFreePort {
        /// First candidate port (inclusive).
        start: u16,
        /// End of the candidate range (exclusive).
        end: u16,
    },

    /// The first failure captured from a stress-harness worker, replayed
    /// after all workers have joined.
    #[error("Worker {worker} failed at iteration {iteration}: {source}")]
    Worker {
        /// Index of the worker that failed.
        worker: usize,
        /// Iteration at which the failure occurred.
        iteration: usize,
        /// The original failure, unmodified.
        source: BoxError,
    },

    /// A stress-harness worker panicked; the panic payload is captured as text.
    #[error("Worker {worker} panicked at iteration {iteration}: {message}")]
    WorkerPanic {
        /// Index of the worker that panicked.
        worker: usize,
        /// Iteration at which the panic occurred.
        iteration: usize,
        /// Stringified panic payload.
        message: String,
    },

    /// A worker finished with fewer completed iterations than planned and no
    /// captured failure. Signals a silent early stop in the workload.
    #[error("Worker {worker} did not execute all iterations: {completed} of {expected}")]
    Incomplete {
        /// Index of the offending worker.
        worker: usize,
        /// Iterations the worker actually completed.
        completed: usize,
        /// Iterations the plan required.
        expected: usize,
    },

    /// A tracked object remained reachable after exhausting all collection
    /// attempts.
    #[error("Object '{label}' should not exist after {attempts} collection attempts, but still had: {description}")]
    Leak {
        /// Label supplied at registration (or the referent's type name).
        label: String,
        /// Number of attempts that were exhausted.
        attempts: usize,
        /// Description of the still-reachable object.
        description: String,
    },

    /// A thread matching the given name pattern was still running.
    #[error("{label}: thread still running: {thread}")]
    ThreadStillRunning {
        /// Caller-supplied error label.
        label: String,
        /// Name of the offending thread.
        thread: String,
    },

    /// A barrier-synchronized run failed; the original error is propagated
    /// unwrapped from the execution machinery.
    #[error("Run {run} failed: {source}")]
    Task {
        /// Index of the failing run.
        run: usize,
        /// The original failure, unmodified.
        source: BoxError,
    },

    /// A barrier-synchronized run panicked.
    #[error("Run {run} panicked: {message}")]
    TaskPanic {
        /// Index of the panicking run.
        run: usize,
        /// Stringified panic payload.
        message: String,
    },

    /// A blocking wait was cooperatively interrupted.
    ///
    /// This is a distinct outcome: the property under test was neither
    /// verified nor refuted.
    #[error("Operation aborted before completion")]
    Aborted,

    /// Invalid worker plan (zero workers or zero iterations).
    #[error("Invalid worker plan: {0}")]
    InvalidPlan(String),

    /// Malformed inbound HTTP request; answered with a 400 by the mock
    /// server, never propagated past its dispatch boundary.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
