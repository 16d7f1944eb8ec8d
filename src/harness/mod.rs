//! Concurrent stress harness.
//!
//! Runs a unit of test logic across many parallel workers with synchronized
//! starts, aggregates per-worker completion counts and propagates the first
//! failure from any worker back to the caller as a single verdict.

mod barrier;
mod stress;

pub use barrier::run_with_barrier;
pub use stress::{ExecutionOutcome, WorkerPlan};

/// Render a panic payload as text for failure reporting.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
