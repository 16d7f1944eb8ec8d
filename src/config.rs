//! Configuration defaults for the test instrumentation primitives.
//!
//! These values bound the time a misbehaving test can consume: a genuine
//! leak or a stuck port scan must fail the test run, never hang it.

use std::time::Duration;

/// Default number of collection attempts before a leak is reported.
pub const DEFAULT_MAX_ATTEMPTS: usize = 50;

/// Pacing delay between collection attempts.
///
/// Other threads may still be dropping their handles to a tracked object;
/// a single immediate re-check would report spurious leaks.
pub const ATTEMPT_PACING: Duration = Duration::from_millis(100);

/// Well-known snapshot file written on leak-verification failure.
///
/// Lives in the process's working directory and is overwritten across
/// repeated failures within one process lifetime.
pub const SNAPSHOT_FILE_NAME: &str = "LeakVerifier.snapshot";

/// Read timeout applied to inbound connections of the mock HTTP server.
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// A half-open range of candidate ports scanned sequentially by the mock
/// HTTP server.
///
/// The default covers ten candidates, `[15100, 15110)`. When every candidate
/// is taken, [`Error::NoFreePort`](crate::Error::NoFreePort) names both
/// endpoints verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    /// First candidate port (inclusive).
    pub start: u16,
    /// End of the range (exclusive).
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 15100,
            end: 15110,
        }
    }
}

impl PortRange {
    /// Create a custom candidate range.
    #[must_use]
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Number of candidate ports in the range.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    /// Whether the range contains no candidates.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Iterate over candidate ports in scan order.
    pub fn candidates(&self) -> impl Iterator<Item = u16> {
        self.start..self.end
    }

    /// The error returned when every candidate is in use.
    #[must_use]
    pub fn exhausted(&self) -> crate::Error {
        crate::Error::NoFreePort {
            start: self.start,
            end: self.end,
        }
    }
}
