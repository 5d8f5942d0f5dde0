use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default interval between warnings about dropped log output.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Collapses a burst of drops into one warning per interval.
///
/// Callers count each drop with [`record_drop`] and then offer a warning
/// through [`warn_if_due`]; the callback only runs when the interval since
/// the previous warning has elapsed, and receives the number of drops it
/// covers. [`flush`] reports pending drops regardless of the interval.
///
/// [`record_drop`]: Self::record_drop
/// [`warn_if_due`]: Self::warn_if_due
/// [`flush`]: Self::flush
#[derive(Debug)]
pub struct RateLimitedWarner {
    interval_ms: u64,
    origin: Instant,
    /// Milliseconds after `origin` before which no warning is emitted.
    next_due_ms: AtomicU64,
    dropped: AtomicU64,
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl RateLimitedWarner {
    /// Create a warner whose first warning is due immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            origin: Instant::now(),
            next_due_ms: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops recorded since the last warning.
    pub fn pending(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Run `warn` with the pending drop count if the interval has elapsed.
    ///
    /// Concurrent callers race for the slot; exactly one of them warns.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        let now = self.now_ms();
        let due = self.next_due_ms.load(Ordering::Relaxed);
        if now < due || self.pending() == 0 {
            return;
        }
        let next = now.saturating_add(self.interval_ms);
        if self
            .next_due_ms
            .compare_exchange(due, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
        }
    }

    /// Run `warn` with the pending drop count, ignoring the interval.
    pub fn flush(&self, warn: impl FnOnce(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            let next = self.now_ms().saturating_add(self.interval_ms);
            self.next_due_ms.store(next, Ordering::Relaxed);
            warn(count);
        }
    }
}
