//! Jittered exponential backoff between reconnection attempts.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::BackoffPolicy;

const MIN_DELAY_MS: u64 = 10;

/// Reconnect pacing for the socket pump.
///
/// Delays double from `base` up to `cap` while connection attempts keep
/// failing. Once failures have persisted for `deadline`, [`next_delay`]
/// returns `None` and the caller decides how to proceed. A connection that
/// stays up for `reset_after` returns the window to `base`.
///
/// [`next_delay`]: Self::next_delay
pub struct ReconnectBackoff {
    policy: BackoffPolicy,
    current: Duration,
    failing_since: Option<Instant>,
    connected_at: Option<Instant>,
    rng: StdRng,
}

impl ReconnectBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.base,
            failing_since: None,
            connected_at: None,
            rng: StdRng::from_entropy(),
            policy,
        }
    }

    /// Note an established connection.
    pub fn record_connected(&mut self, now: Instant) {
        self.connected_at = Some(now);
    }

    /// Note a dropped connection; a long-lived one clears the failure window.
    pub fn record_disconnected(&mut self, now: Instant) {
        if let Some(since) = self.connected_at.take()
            && now.duration_since(since) >= self.policy.reset_after
        {
            self.current = self.policy.base;
            self.failing_since = None;
        }
    }

    /// Delay before the next attempt after a failure at `now`.
    pub fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        let start = *self.failing_since.get_or_insert(now);
        if now.duration_since(start) >= self.policy.deadline {
            return None;
        }
        if now != start {
            self.current = self.current.saturating_mul(2).min(self.policy.cap);
        }
        let max_ms = u64::try_from(self.current.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = match max_ms {
            0 => MIN_DELAY_MS,
            1..=MIN_DELAY_MS => max_ms,
            _ => self.rng.gen_range(MIN_DELAY_MS..=max_ms),
        };
        Some(Duration::from_millis(delay_ms))
    }

    /// Restart the failure window, keeping the current delay.
    pub fn restart_window(&mut self) {
        self.failing_since = None;
    }

    pub fn cap(&self) -> Duration {
        self.policy.cap
    }
}
