use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::entry::Verdict;

/// Outcome counters of one pass, safe to read at any time from any task
#[derive(Debug, Default)]
pub struct Stats {
    working: AtomicUsize,
    failed: AtomicUsize,
    timeout: AtomicUsize,
    skipped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub working: usize,
    pub failed: usize,
    pub timeout: usize,
    pub skipped: usize,
}

impl StatsSnapshot {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.working + self.failed + self.timeout + self.skipped
    }
}

impl std::ops::Add for StatsSnapshot {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            working: self.working + rhs.working,
            failed: self.failed + rhs.failed,
            timeout: self.timeout + rhs.timeout,
            skipped: self.skipped + rhs.skipped,
        }
    }
}

impl Stats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one resolved entry
    pub fn record(&self, verdict: &Verdict) {
        let counter = match verdict {
            Verdict::Working => &self.working,
            Verdict::Failed(_) => &self.failed,
            Verdict::Timeout => &self.timeout,
            Verdict::Skipped(_) => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            working: self.working.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [&self.working, &self.failed, &self.timeout, &self.skipped] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
