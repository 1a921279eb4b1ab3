//! Injected time source for CPU-budget accounting.
//!
//! Every timing decision in the scheduler is made against a [`Clock`] so the
//! state machine can be driven in tests without sleeping. The scheduler only
//! needs a monotonic reading; delays between ticks are returned to the caller
//! as relative durations, never computed against wall-clock time.

use std::time::{Duration, Instant};

/// Monotonic time source used to bound the encoding loop.
pub trait Clock {
    /// Monotonic reading since an arbitrary, fixed origin.
    ///
    /// Successive calls must be non-decreasing. The absolute value carries
    /// no meaning; only differences are used.
    fn elapsed(&self) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock with its origin at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.elapsed();
        let second = clock.elapsed();
        assert!(second >= first);
    }
}
