//! Overflow and failure accounting for the redirect path.
//!
//! The deferred-path counters start at [`NOT_ENGAGED`] and switch to a running
//! count the first time the deferred echo task starts.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counter value meaning "deferred mode never engaged".
pub const NOT_ENGAGED: i64 = -1;

#[derive(Debug)]
pub struct RedirectCounters {
    alloc_failures: AtomicI64,
    enqueue_failures: AtomicI64,
    sends: AtomicU64,
}

impl Default for RedirectCounters {
    fn default() -> Self {
        Self {
            alloc_failures: AtomicI64::new(NOT_ENGAGED),
            enqueue_failures: AtomicI64::new(NOT_ENGAGED),
            sends: AtomicU64::new(0),
        }
    }
}

/// Increment unless the counter still holds the sentinel.
fn bump_engaged(counter: &AtomicI64) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
        (value >= 0).then(|| value.saturating_add(1))
    });
}

impl RedirectCounters {
    /// Reset the deferred-path counters from the sentinel to zero.
    ///
    /// Counters that are already engaged keep their running value.
    pub(crate) fn engage(&self) {
        let _ = self.alloc_failures.compare_exchange(
            NOT_ENGAGED,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.enqueue_failures.compare_exchange(
            NOT_ENGAGED,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn record_alloc_failure(&self) {
        bump_engaged(&self.alloc_failures);
    }

    pub(crate) fn record_enqueue_failure(&self) {
        bump_engaged(&self.enqueue_failures);
    }

    /// Count one outbound send and return the new total.
    pub(crate) fn record_send(&self) -> u64 {
        self.sends.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Deferred-path allocation failures, or [`NOT_ENGAGED`].
    pub fn alloc_failures(&self) -> i64 {
        self.alloc_failures.load(Ordering::Acquire)
    }

    /// Deferred-path enqueue failures, or [`NOT_ENGAGED`].
    pub fn enqueue_failures(&self) -> i64 {
        self.enqueue_failures.load(Ordering::Acquire)
    }

    /// Total outbound sends attempted while sending or filling was enabled.
    pub fn sends(&self) -> u64 {
        self.sends.load(Ordering::Relaxed)
    }
}
