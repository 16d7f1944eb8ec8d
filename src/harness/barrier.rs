//! Barrier-synchronized execution of identical runs.
//!
//! All runs rendezvous on a barrier before executing, maximizing contention
//! on whatever shared state the task touches. Results come back in run
//! order; the first failing run (lowest index) is propagated unwrapped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Condvar, Mutex};
use std::thread;

use tracing::debug;

use crate::error::{BoxError, Error, Result};
use crate::threads::ThreadGuard;

use super::panic_message;

enum RunOutcome<T> {
    Ok(T),
    Err(BoxError),
    Panicked(String),
    Cancelled,
}

/// Gate released by the spawning thread once every run thread exists.
///
/// Keeps run threads away from the barrier until all parties are known to
/// have spawned; otherwise a failed spawn would strand the earlier threads
/// at the rendezvous forever.
struct StartGate {
    state: Mutex<Option<bool>>,
    changed: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
            changed: Condvar::new(),
        }
    }

    fn open(&self, go: bool) {
        *self.state.lock().unwrap() = Some(go);
        self.changed.notify_all();
    }

    fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(go) = *state {
                return go;
            }
            state = self.changed.wait(state).unwrap();
        }
    }
}

/// Execute `task` in `runs` threads that all start simultaneously.
///
/// Every run waits at a rendezvous barrier until all `runs` parties have
/// arrived, then invokes the task. The caller blocks until every run thread
/// has been joined, under both success and failure. On success the results
/// are returned in run order.
///
/// If any run fails, the remaining not-yet-started work is cancelled
/// best-effort and the failing run's own error is propagated, unwrapped
/// from the execution machinery.
///
/// # Errors
///
/// - [`Error::InvalidPlan`] if `runs` is zero.
/// - [`Error::Task`] / [`Error::TaskPanic`] carrying the lowest-index
///   failing run.
pub fn run_with_barrier<T, F>(task: F, runs: usize) -> Result<Vec<T>>
where
    T: Send,
    F: Fn() -> std::result::Result<T, BoxError> + Send + Sync,
{
    if runs == 0 {
        return Err(Error::InvalidPlan("run count must be at least 1".into()));
    }

    debug!(runs, "starting barrier-synchronized runs");

    let barrier = Barrier::new(runs);
    let gate = StartGate::new();
    let cancelled = AtomicBool::new(false);

    let outcomes = thread::scope(|s| -> Result<Vec<RunOutcome<T>>> {
        let mut handles = Vec::with_capacity(runs);
        for run in 0..runs {
            let name = format!("barrier-run-{run}");
            let guard = ThreadGuard::register(&name);
            let barrier = &barrier;
            let gate = &gate;
            let cancelled = &cancelled;
            let task = &task;
            let spawned = thread::Builder::new().name(name).spawn_scoped(s, move || {
                let _guard = guard;
                if !gate.wait() {
                    return RunOutcome::Cancelled;
                }

                // causes more contention
                barrier.wait();

                if cancelled.load(Ordering::Acquire) {
                    return RunOutcome::Cancelled;
                }
                match catch_unwind(AssertUnwindSafe(task)) {
                    Ok(Ok(value)) => RunOutcome::Ok(value),
                    Ok(Err(err)) => {
                        cancelled.store(true, Ordering::Release);
                        RunOutcome::Err(err)
                    }
                    Err(payload) => {
                        cancelled.store(true, Ordering::Release);
                        RunOutcome::Panicked(panic_message(payload))
                    }
                }
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    gate.open(false);
                    return Err(err.into());
                }
            }
        }
        gate.open(true);

        let mut outcomes = Vec::with_capacity(runs);
        for handle in handles {
            let outcome = handle
                .join()
                .map_err(|payload| Error::TaskPanic {
                    run: outcomes.len(),
                    message: panic_message(payload),
                })?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    })?;

    // the lowest failing index wins, regardless of which run set the
    // cancel flag first
    let mut values = Vec::with_capacity(runs);
    let mut any_cancelled = false;
    for (run, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            RunOutcome::Ok(value) => values.push(value),
            RunOutcome::Err(source) => return Err(Error::Task { run, source }),
            RunOutcome::Panicked(message) => return Err(Error::TaskPanic { run, message }),
            RunOutcome::Cancelled => any_cancelled = true,
        }
    }
    if any_cancelled {
        // cancellation without a surviving error means the spawning side
        // aborted the rendezvous
        return Err(Error::Aborted);
    }
    Ok(values)
}
