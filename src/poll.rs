//! Bounded fixed-interval polling
//!
//! Service start-up and display readiness are polled at a constant cadence
//! until a caller-supplied deadline runs out. No exponential backoff.

use std::time::{Duration, Instant};

/// Default cadence for every runtime poll
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wall-clock budget measured from its creation
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    #[inline]
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.start.elapsed())
    }

    #[inline]
    pub fn expired(&self) -> bool {
        self.start.elapsed() > self.budget
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Call `probe` every `interval` until it returns true or `deadline` expires
///
/// The probe always runs at least once. Returns whether it succeeded.
pub fn poll_until(deadline: &Deadline, interval: Duration, mut probe: impl FnMut() -> bool) -> bool {
    loop {
        if probe() {
            return true;
        }
        if deadline.expired() {
            return false;
        }
        std::thread::sleep(interval.min(deadline.remaining().max(Duration::from_millis(1))));
    }
}
