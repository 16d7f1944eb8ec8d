//! Explicit registry of instrumentation threads, with quiesce helpers.
//!
//! Rust exposes no process-wide thread enumeration, so every background
//! thread spawned by this crate (stress workers, barrier runs, mock-server
//! dispatchers) announces itself here and deregisters on exit via an RAII
//! guard. Tests use the wait/assert helpers to let background work quiesce
//! before the next test starts, or to fail loudly when something straggles.
//!
//! Threads whose names start with [`RESERVED_THREAD_PREFIX`] belong to the
//! test-runner infrastructure itself and are exempt from substring matching.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::{Error, Result};

/// Threads with this name prefix belong to the test runner itself and are
/// never matched by substring-based wait/assert scans.
pub const RESERVED_THREAD_PREFIX: &str = "suite-";

static NEXT_ID: AtomicU64 = AtomicU64::new(0);
static REGISTRY: OnceLock<Registry> = OnceLock::new();

struct Registry {
    entries: Mutex<Vec<(u64, String)>>,
    changed: Condvar,
}

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        entries: Mutex::new(Vec::new()),
        changed: Condvar::new(),
    })
}

/// RAII registration of a named instrumentation thread.
///
/// Created in the spawning thread *before* `spawn` returns, so a quiesce
/// wait issued right after spawn can never miss the thread, and moved into
/// the spawned closure so the entry is removed exactly when the thread's
/// work ends.
#[derive(Debug)]
pub struct ThreadGuard {
    id: u64,
}

impl ThreadGuard {
    /// Register a thread under `name`.
    pub fn register(name: &str) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let reg = registry();
        reg.entries.lock().unwrap().push((id, name.to_string()));
        Self { id }
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        let reg = registry();
        let mut entries = reg.entries.lock().unwrap();
        entries.retain(|(id, _)| *id != self.id);
        reg.changed.notify_all();
    }
}

fn matches_substring(name: &str, contains: &str) -> bool {
    name.contains(contains) && !name.starts_with(RESERVED_THREAD_PREFIX)
}

/// Wait until no registered thread carries exactly the given name.
///
/// Waits indefinitely, bounded only by the matching threads actually
/// finishing. Exact-name matching does not exempt the reserved prefix.
pub fn wait_for_thread(name: &str) {
    let reg = registry();
    let mut entries = reg.entries.lock().unwrap();
    while entries.iter().any(|(_, n)| n == name) {
        entries = reg.changed.wait(entries).unwrap();
    }
}

/// Wait until no registered thread name contains the given substring.
///
/// Waits forever; use [`wait_for_thread_substring_timeout`] to give up after
/// a bound. Threads with the reserved test-runner prefix are exempt.
pub fn wait_for_thread_substring(contains: &str) {
    let reg = registry();
    let mut entries = reg.entries.lock().unwrap();
    while entries.iter().any(|(_, n)| matches_substring(n, contains)) {
        entries = reg.changed.wait(entries).unwrap();
    }
}

/// Wait up to `timeout` for threads matching the substring to finish, then
/// give up silently.
///
/// Returns `true` when the matching threads quiesced within the timeout.
pub fn wait_for_thread_substring_timeout(contains: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let reg = registry();
    let mut entries = reg.entries.lock().unwrap();
    while entries.iter().any(|(_, n)| matches_substring(n, contains)) {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            return false;
        };
        let (guard, result) = reg.changed.wait_timeout(entries, remaining).unwrap();
        entries = guard;
        if result.timed_out() {
            return !entries.iter().any(|(_, n)| matches_substring(n, contains));
        }
    }
    true
}

/// Fail with `label` if any registered thread name contains the substring.
///
/// Usually combined with [`wait_for_thread_substring_timeout`]. Before
/// failing, a snapshot of all registered thread names is logged as a
/// diagnostic aid. Threads with the reserved test-runner prefix are exempt.
///
/// # Errors
///
/// Returns [`Error::ThreadStillRunning`] naming the offending thread.
pub fn assert_no_thread(label: &str, contains: &str) -> Result<()> {
    let reg = registry();
    let entries = reg.entries.lock().unwrap();
    if let Some((_, name)) = entries.iter().find(|(_, n)| matches_substring(n, contains)) {
        let snapshot: Vec<&str> = entries.iter().map(|(_, n)| n.as_str()).collect();
        info!(threads = ?snapshot, "thread dump before failure");
        return Err(Error::ThreadStillRunning {
            label: label.to_string(),
            thread: name.clone(),
        });
    }
    Ok(())
}
