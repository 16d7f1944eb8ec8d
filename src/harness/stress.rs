//! Multi-threaded stress execution of a test workload.
//!
//! A [`WorkerPlan`] spawns N OS threads, each running the workload closure
//! for M iterations, and reports exactly one aggregated outcome: the first
//! failure observed by any worker, an incomplete-execution error, or the
//! per-worker completion counts.
//!
//! Sample usage:
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use testbench::WorkerPlan;
//!
//! let counter = AtomicUsize::new(0);
//! let outcome = WorkerPlan::new(4, 100)
//!     .unwrap()
//!     .execute(|_worker, _iteration| {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(counter.load(Ordering::Relaxed), 400);
//! assert_eq!(outcome.total(), 400);
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use tracing::{debug, trace};

use crate::error::{BoxError, Error, Result};
use crate::threads::ThreadGuard;

use super::panic_message;

/// First-writer-wins slot for the single failure a stress run retains.
///
/// The atomic flag is claimed with a compare-and-swap; only the claiming
/// worker writes the slot, so subsequent failures from other workers are
/// discarded rather than aggregated.
struct FailureSlot {
    failed: AtomicBool,
    slot: Mutex<Option<Error>>,
}

impl FailureSlot {
    fn new() -> Self {
        Self {
            failed: AtomicBool::new(false),
            slot: Mutex::new(None),
        }
    }

    fn record(&self, err: Error) {
        if self
            .failed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *self.slot.lock().unwrap() = Some(err);
        }
    }

    fn is_set(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn take(&self) -> Option<Error> {
        self.slot.lock().unwrap().take()
    }
}

/// Per-worker completion counts of a finished stress run.
///
/// Counts are only meaningful after every worker has been joined; an
/// instance is handed out exclusively post-join, so reading it is always
/// ordered after all worker writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    completed: Vec<usize>,
}

impl ExecutionOutcome {
    /// Iterations completed by the given worker.
    #[must_use]
    pub fn completed(&self, worker: usize) -> usize {
        self.completed[worker]
    }

    /// Completion counts for all workers, indexed by worker.
    #[must_use]
    pub fn per_worker(&self) -> &[usize] {
        &self.completed
    }

    /// Total iterations completed across all workers.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed.iter().sum()
    }
}

/// Describes one stress run: worker count, iterations per worker, and an
/// optional label included in worker thread names for diagnosability.
#[derive(Debug, Clone)]
pub struct WorkerPlan {
    workers: usize,
    iterations: usize,
    label: Option<String>,
}

impl WorkerPlan {
    /// Create a plan with the given worker and iteration counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPlan`] if either count is zero.
    pub fn new(workers: usize, iterations: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidPlan("worker count must be at least 1".into()));
        }
        if iterations == 0 {
            return Err(Error::InvalidPlan(
                "iterations per worker must be at least 1".into(),
            ));
        }
        Ok(Self {
            workers,
            iterations,
            label: None,
        })
    }

    /// Attach a label identifying the workload; it becomes part of every
    /// worker thread's name. Without one, the workload closure's type name
    /// is used.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of workers in this plan.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Iterations each worker performs.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Run `work(worker, iteration)` across all workers and block until
    /// every worker thread has finished.
    ///
    /// Workers check the shared failure flag before each iteration and stop
    /// early once any worker has recorded a failure. The stop is best-effort:
    /// a worker may complete one extra iteration after a failure is recorded
    /// elsewhere.
    ///
    /// # Errors
    ///
    /// - [`Error::Worker`] / [`Error::WorkerPanic`]: the first failure
    ///   observed by any worker, replayed once after all workers joined.
    /// - [`Error::Incomplete`]: a worker completed fewer iterations than
    ///   planned without recording a failure.
    pub fn execute<W>(&self, work: W) -> Result<ExecutionOutcome>
    where
        W: Fn(usize, usize) -> std::result::Result<(), BoxError> + Send + Sync,
    {
        self.execute_with_hook(work, |_| Ok(()))
    }

    /// Like [`execute`](Self::execute), with an `on_done(worker)` hook that
    /// runs after each worker's iteration loop.
    ///
    /// The hook runs even when the loop stopped early because of a failure
    /// in another worker; it is skipped in a worker whose own iteration
    /// failed. A failure inside the hook is recorded with an iteration index
    /// equal to the plan's iteration count.
    pub fn execute_with_hook<W, H>(&self, work: W, on_done: H) -> Result<ExecutionOutcome>
    where
        W: Fn(usize, usize) -> std::result::Result<(), BoxError> + Send + Sync,
        H: Fn(usize) -> std::result::Result<(), BoxError> + Send + Sync,
    {
        let label = self
            .label
            .clone()
            .unwrap_or_else(|| std::any::type_name::<W>().to_string());

        debug!(
            workers = self.workers,
            iterations = self.iterations,
            %label,
            "starting stress run"
        );

        let failure = FailureSlot::new();
        let completions: Vec<AtomicUsize> =
            (0..self.workers).map(|_| AtomicUsize::new(0)).collect();

        thread::scope(|s| -> Result<()> {
            for worker in 0..self.workers {
                let name = format!("stress-worker-{worker}: {label}");
                trace!(worker, "starting worker thread");
                let guard = ThreadGuard::register(&name);
                let failure = &failure;
                let completions = &completions;
                let work = &work;
                let on_done = &on_done;
                thread::Builder::new().name(name).spawn_scoped(s, move || {
                    let _guard = guard;
                    let mut own_failure = false;

                    for iteration in 0..self.iterations {
                        if failure.is_set() {
                            break;
                        }
                        match catch_unwind(AssertUnwindSafe(|| work(worker, iteration))) {
                            Ok(Ok(())) => {
                                // join provides the happens-before for the
                                // post-join read of this counter
                                completions[worker].fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Err(source)) => {
                                failure.record(Error::Worker {
                                    worker,
                                    iteration,
                                    source,
                                });
                                own_failure = true;
                                break;
                            }
                            Err(payload) => {
                                failure.record(Error::WorkerPanic {
                                    worker,
                                    iteration,
                                    message: panic_message(payload),
                                });
                                own_failure = true;
                                break;
                            }
                        }
                    }

                    if !own_failure {
                        match catch_unwind(AssertUnwindSafe(|| on_done(worker))) {
                            Ok(Ok(())) => {}
                            Ok(Err(source)) => failure.record(Error::Worker {
                                worker,
                                iteration: self.iterations,
                                source,
                            }),
                            Err(payload) => failure.record(Error::WorkerPanic {
                                worker,
                                iteration: self.iterations,
                                message: panic_message(payload),
                            }),
                        }
                    }
                })?;
            }
            Ok(())
        })?;

        if let Some(err) = failure.take() {
            return Err(err);
        }

        let completed: Vec<usize> = completions
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect();
        for (worker, &count) in completed.iter().enumerate() {
            if count != self.iterations {
                return Err(Error::Incomplete {
                    worker,
                    completed: count,
                    expected: self.iterations,
                });
            }
        }

        Ok(ExecutionOutcome { completed })
    }
}
