//! Fixed-window rate limiter.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::counter::WindowCounter;
use super::denial::Denial;

/// The window counter store and the decision logic on top of it.
///
/// Counters are keyed by an opaque string. The read-modify-write for a key
/// happens while holding the map shard that owns it, so concurrent requests
/// for the same key cannot both slip under the limit.
pub struct RateLimiter {
    /// Window counters indexed by key
    counters: DashMap<String, WindowCounter>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// Count a request for `key` and decide whether it may proceed.
    ///
    /// The first request for an unseen key, and the first request after a
    /// window has fully elapsed, always pass. Within a window the request that
    /// takes the count past `max_requests` and every one after it are denied.
    pub fn check(&self, key: &str, max_requests: u64, window_seconds: u64) -> Result<(), Denial> {
        let now = self.clock.now();
        let window = Duration::from_secs(window_seconds);

        let (count, until_reset) = match self.counters.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                debug!(
                    key = %key,
                    limit = max_requests,
                    window_seconds = window_seconds,
                    "Creating new window counter"
                );
                vacant.insert(WindowCounter::new(now, window));
                return Ok(());
            }
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                let count = counter.hit(now, window);
                (count, counter.duration_until_reset(now))
            }
        };

        trace!(key = %key, count = count, limit = max_requests, "Checked rate limit");

        if count > max_requests {
            debug!(key = %key, count = count, limit = max_requests, "Rate limit exceeded");
            return Err(Denial::RateLimitExceeded {
                limit: max_requests,
                window_seconds,
                retry_after_secs: retry_after(until_reset),
            });
        }

        Ok(())
    }

    /// Current count for a key, or `None` if the key was never seen.
    pub fn counter_value(&self, key: &str) -> Option<u64> {
        self.counters.get(key).map(|c| c.count())
    }

    /// Drop counters whose window has already elapsed.
    ///
    /// The next request for a swept key would have opened a fresh window
    /// anyway, so sweeping never changes a decision.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        let removed = before.saturating_sub(self.counters.len());
        if removed > 0 {
            debug!(removed = removed, remaining = self.counters.len(), "Swept stale window counters");
        }
        removed
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }

    /// Get the number of tracked keys.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole seconds to wait, rounded up, never less than one.
fn retry_after(until_reset: Duration) -> u64 {
    let secs = until_reset.as_secs() + u64::from(until_reset.subsec_nanos() > 0);
    secs.max(1)
}

/// Run [`RateLimiter::sweep`] every `interval` until the runtime shuts down.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.sweep();
        }
    })
}
