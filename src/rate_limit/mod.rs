// src/rate_limit/mod.rs

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

#[cfg(test)]
mod tests;

/// Minimum-interval limiter for one client's outbound requests
///
/// Every caller reserves the next departure slot under the lock and then
/// sleeps outside it, so concurrent callers queue up one interval apart
/// instead of all waking at the same instant.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between two departures
    interval: Duration,

    /// Departure time of the most recently reserved slot
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Departure time of the latest reserved request, if any
    pub fn last_request_time(&self) -> Option<Instant> {
        *self.last.lock()
    }

    /// Block the current thread until the next slot is due
    pub fn acquire_blocking(&self) {
        let wait = self.reserve(Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limiting: sleeping before request");
            std::thread::sleep(wait);
        }
    }

    /// Suspend the current task until the next slot is due
    pub async fn acquire(&self) {
        let wait = self.reserve(Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limiting: sleeping before request");
            tokio::time::sleep(wait).await;
        }
    }

    /// Claim the earliest slot at or after `now` and return how long to wait for it
    fn reserve(&self, now: Instant) -> Duration {
        let mut last = self.last.lock();
        let slot = match *last {
            Some(previous) => (previous + self.interval).max(now),
            None => now,
        };
        *last = Some(slot);
        slot.saturating_duration_since(now)
    }
}
