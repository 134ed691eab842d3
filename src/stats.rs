//! Reconciliation statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-handler counters
pub struct HandlerStats {
    pub remote_calls: AtomicU64,
    pub calls_skipped: AtomicU64,
    pub errors_ignored: AtomicU64,
    pub errors_failed: AtomicU64,
    pub errors_unclassified: AtomicU64,
    pub stabilization_checks: AtomicU64,
    pub suspensions: AtomicU64,
    pub tagging_soft_fails: AtomicU64,
}

impl HandlerStats {
    pub fn new() -> Self {
        Self {
            remote_calls: AtomicU64::new(0),
            calls_skipped: AtomicU64::new(0),
            errors_ignored: AtomicU64::new(0),
            errors_failed: AtomicU64::new(0),
            errors_unclassified: AtomicU64::new(0),
            stabilization_checks: AtomicU64::new(0),
            suspensions: AtomicU64::new(0),
            tagging_soft_fails: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HandlerStatsSnapshot {
        HandlerStatsSnapshot {
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            calls_skipped: self.calls_skipped.load(Ordering::Relaxed),
            errors_ignored: self.errors_ignored.load(Ordering::Relaxed),
            errors_failed: self.errors_failed.load(Ordering::Relaxed),
            errors_unclassified: self.errors_unclassified.load(Ordering::Relaxed),
            stabilization_checks: self.stabilization_checks.load(Ordering::Relaxed),
            suspensions: self.suspensions.load(Ordering::Relaxed),
            tagging_soft_fails: self.tagging_soft_fails.load(Ordering::Relaxed),
        }
    }
}

impl Default for HandlerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`HandlerStats`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandlerStatsSnapshot {
    pub remote_calls: u64,
    pub calls_skipped: u64,
    pub errors_ignored: u64,
    pub errors_failed: u64,
    pub errors_unclassified: u64,
    pub stabilization_checks: u64,
    pub suspensions: u64,
    pub tagging_soft_fails: u64,
}
