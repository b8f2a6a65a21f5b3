//! Fixed-window counter entry.

use std::time::{Duration, Instant};

/// Requests seen for one key since the start of its current window.
///
/// A counter is not thread-safe by itself; the store holding it serializes
/// access per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCounter {
    /// Requests received since `window_start`, denied ones included
    count: u64,
    /// When the current window opened
    window_start: Instant,
    /// Window length used by the most recent hit
    window: Duration,
}

impl WindowCounter {
    /// Open a window at `now` with a first request already counted.
    pub fn new(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_start: now,
            window,
        }
    }

    /// Record a request at `now` and return the count after recording it.
    ///
    /// If more than `window` has elapsed since the window opened, a fresh
    /// window opens at `now` (not at the old boundary) with a count of 1. A
    /// request landing exactly on the boundary still counts in the old window.
    pub fn hit(&mut self, now: Instant, window: Duration) -> u64 {
        self.window = window;
        if self.is_expired(now) {
            self.count = 1;
            self.window_start = now;
        } else {
            self.count += 1;
        }
        self.count
    }

    /// Whether the next hit at `now` would open a fresh window.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) > self.window
    }

    /// Time left before the window can reset.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.window_start);
        self.window.saturating_sub(elapsed)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    #[test]
    fn test_new_counter_starts_at_one() {
        let now = Instant::now();
        let counter = WindowCounter::new(now, WINDOW);
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.window_start(), now);
    }

    #[test]
    fn test_hit_within_window_increments() {
        let t0 = Instant::now();
        let mut counter = WindowCounter::new(t0, WINDOW);

        assert_eq!(counter.hit(t0 + Duration::from_secs(3), WINDOW), 2);
        assert_eq!(counter.hit(t0 + Duration::from_secs(6), WINDOW), 3);
        assert_eq!(counter.window_start(), t0);
    }

    #[test]
    fn test_boundary_counts_in_old_window() {
        let t0 = Instant::now();
        let mut counter = WindowCounter::new(t0, WINDOW);

        assert_eq!(counter.hit(t0 + WINDOW, WINDOW), 2);
        assert_eq!(counter.window_start(), t0);
    }

    #[test]
    fn test_late_hit_opens_window_at_now() {
        let t0 = Instant::now();
        let mut counter = WindowCounter::new(t0, WINDOW);
        for _ in 0..20 {
            counter.hit(t0, WINDOW);
        }

        let late = t0 + Duration::from_secs(27);
        assert_eq!(counter.hit(late, WINDOW), 1);
        assert_eq!(counter.window_start(), late);
    }

    #[test]
    fn test_duration_until_reset() {
        let t0 = Instant::now();
        let counter = WindowCounter::new(t0, WINDOW);

        assert_eq!(
            counter.duration_until_reset(t0 + Duration::from_secs(4)),
            Duration::from_secs(6)
        );
        assert_eq!(
            counter.duration_until_reset(t0 + Duration::from_secs(15)),
            Duration::ZERO
        );
    }
}
