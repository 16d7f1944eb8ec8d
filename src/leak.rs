//! Leak verification for reference-counted objects.
//!
//! Rust has no tracing collector to invoke, so the verifier tracks
//! [`Weak`] handles to `Arc`-owned objects and checks that the strong count
//! drops to zero once the caller releases its own clones. Collection is
//! still not instantaneous: another thread (a server dispatch loop, a worker
//! pool) may hold a clone it is about to drop, so the check retries with a
//! short pacing delay before declaring a leak.
//!
//! Usage is something like:
//!
//! ```rust
//! use std::sync::Arc;
//! use testbench::LeakVerifier;
//!
//! let mut verifier = LeakVerifier::new();
//! let object = Arc::new(String::from("fixture"));
//! verifier.track_labeled(&object, "fixture");
//! drop(object);
//! verifier.assert_collected().unwrap();
//! ```
//!
//! On failure a plain-text snapshot describing every still-reachable object
//! is written to [`SNAPSHOT_FILE_NAME`](crate::config::SNAPSHOT_FILE_NAME)
//! in the working directory (disable via
//! [`set_snapshot_on_failure`](LeakVerifier::set_snapshot_on_failure)).

use std::fmt::Write as _;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use tracing::debug;

use crate::config::{ATTEMPT_PACING, DEFAULT_MAX_ATTEMPTS, SNAPSHOT_FILE_NAME};
use crate::error::{Error, Result};

/// Description of a tracked object that is still reachable.
struct LiveObject {
    type_name: &'static str,
    strong_count: usize,
}

impl LiveObject {
    fn describe(&self) -> String {
        let plural = if self.strong_count == 1 { "" } else { "s" };
        format!(
            "{} ({} strong reference{plural})",
            self.type_name, self.strong_count
        )
    }
}

/// A non-owning handle to one object under leak observation.
///
/// Holding one never keeps the referent alive: only a [`Weak`] is captured.
struct TrackedReference {
    label: String,
    probe: Box<dyn Fn() -> Option<LiveObject> + Send + Sync>,
}

impl TrackedReference {
    fn new<T: Send + Sync + 'static>(object: &Arc<T>, label: String) -> Self {
        let weak: Weak<T> = Arc::downgrade(object);
        let probe = Box::new(move || {
            let strong_count = weak.strong_count();
            (strong_count > 0).then(|| LiveObject {
                type_name: std::any::type_name::<T>(),
                strong_count,
            })
        });
        Self { label, probe }
    }

    fn still_alive(&self) -> Option<LiveObject> {
        (self.probe)()
    }
}

/// Cooperative interruption handle for an in-flight leak check.
///
/// Tripping it during the pacing delay ends the check early with
/// [`Error::Aborted`]; the session is abandoned, not flagged as leak-free.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Request that the running check stop at its next pacing delay.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Verifies that tracked objects are released once all other holders drop
/// their references.
///
/// One session per test (or test struct); registrations accumulate and the
/// final assertion consumes them.
pub struct LeakVerifier {
    references: Vec<TrackedReference>,
    snapshot_on_failure: bool,
    abort: AbortHandle,
}

impl Default for LeakVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LeakVerifier {
    /// Create an empty session with snapshot-on-failure enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            references: Vec::new(),
            snapshot_on_failure: true,
            abort: AbortHandle::default(),
        }
    }

    /// Toggle whether a failed assertion writes the diagnostic snapshot
    /// file. Default: enabled.
    pub fn set_snapshot_on_failure(&mut self, enabled: bool) {
        self.snapshot_on_failure = enabled;
    }

    /// Handle for cooperatively interrupting a running assertion from
    /// another thread.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Track `object`, labeled with its type name.
    pub fn track<T: Send + Sync + 'static>(&mut self, object: &Arc<T>) {
        let label = std::any::type_name::<T>().to_string();
        self.references.push(TrackedReference::new(object, label));
    }

    /// Track `object` under a human-readable label used in failure messages.
    pub fn track_labeled<T: Send + Sync + 'static>(&mut self, object: &Arc<T>, label: &str) {
        self.references
            .push(TrackedReference::new(object, label.to_string()));
    }

    /// Number of references currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.references.len()
    }

    /// Assert that every tracked object has been released, retrying up to
    /// the default attempt bound.
    ///
    /// # Errors
    ///
    /// See [`assert_collected_within`](Self::assert_collected_within).
    pub fn assert_collected(&mut self) -> Result<()> {
        self.assert_collected_within(DEFAULT_MAX_ATTEMPTS)
    }

    /// Assert that every tracked object has been released, retrying up to
    /// `max_attempts` with a fixed pacing delay between attempts.
    ///
    /// References are checked in registration order; an already-released
    /// object passes immediately. The session is consumed on both the
    /// verified and the leak outcome. An abort leaves it untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::Leak`] naming the label, the exhausted attempt count and a
    ///   description of the still-reachable object. When snapshots are
    ///   enabled, the file is written (overwriting any previous one) before
    ///   the error is returned and the message mentions its path.
    /// - [`Error::Aborted`] when the abort handle was tripped during a
    ///   pacing delay; the property is neither verified nor refuted.
    pub fn assert_collected_within(&mut self, max_attempts: usize) -> Result<()> {
        for index in 0..self.references.len() {
            if let Err(err) = self.await_release(index, max_attempts) {
                if !matches!(err, Error::Aborted) {
                    self.references.clear();
                }
                return Err(err);
            }
        }
        self.references.clear();
        Ok(())
    }

    fn await_release(&self, index: usize, max_attempts: usize) -> Result<()> {
        let reference = &self.references[index];

        // exit early if the object was already released
        let Some(mut live) = reference.still_alive() else {
            return Ok(());
        };

        for attempt in 0..max_attempts {
            debug!(label = %reference.label, attempt, "object still reachable, pacing");
            thread::sleep(ATTEMPT_PACING);
            if self.abort.is_set() {
                return Err(Error::Aborted);
            }
            match reference.still_alive() {
                None => return Ok(()),
                Some(probe) => live = probe,
            }
        }

        let mut description = live.describe();
        if self.snapshot_on_failure {
            self.write_snapshot()?;
            let _ = write!(description, ", a snapshot was written to {SNAPSHOT_FILE_NAME}");
        }
        Err(Error::Leak {
            label: reference.label.clone(),
            attempts: max_attempts,
            description,
        })
    }

    /// Overwrite the well-known snapshot file with one line per
    /// still-reachable tracked object.
    fn write_snapshot(&self) -> Result<()> {
        let mut report = String::from("still-reachable tracked objects:\n");
        for reference in &self.references {
            if let Some(live) = reference.still_alive() {
                let _ = writeln!(report, "  {}: {}", reference.label, live.describe());
            }
        }
        fs::write(SNAPSHOT_FILE_NAME, report)?;
        Ok(())
    }
}
