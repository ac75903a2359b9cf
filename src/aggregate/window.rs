//! Sliding-window counter with one-second buckets

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default retention window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);

const BUCKET_WIDTH: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct Bucket {
    /// Bucket index relative to the counter's origin
    index: u64,
    count: u64,
}

/// Sum of observations within a trailing window
#[derive(Debug, Clone)]
pub struct WindowedCount {
    window: Duration,
    origin: Instant,
    /// Oldest first, indices strictly increasing
    buckets: VecDeque<Bucket>,
}

impl WindowedCount {
    pub fn new(window: Duration, origin: Instant) -> Self {
        Self {
            window: window.max(BUCKET_WIDTH),
            origin,
            buckets: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record one observation at `now`
    pub fn observe_at(&mut self, now: Instant) {
        let index = self.bucket_index(now);
        self.evict(index);

        match self.buckets.back_mut() {
            // A caller-supplied instant may lag the newest bucket; fold it in.
            Some(last) if last.index >= index => last.count += 1,
            _ => self.buckets.push_back(Bucket { index, count: 1 }),
        }
    }

    /// Observations within the window ending at `now`
    pub fn sum_at(&self, now: Instant) -> u64 {
        let oldest = self.oldest_live_index(self.bucket_index(now));
        self.buckets
            .iter()
            .filter(|b| b.index >= oldest)
            .map(|b| b.count)
            .sum()
    }

    fn bucket_index(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.origin).as_secs() / BUCKET_WIDTH.as_secs()
    }

    fn bucket_count(&self) -> u64 {
        (self.window.as_secs() / BUCKET_WIDTH.as_secs()).max(1)
    }

    fn oldest_live_index(&self, current: u64) -> u64 {
        (current + 1).saturating_sub(self.bucket_count())
    }

    fn evict(&mut self, current: u64) {
        let oldest = self.oldest_live_index(current);
        while self.buckets.front().is_some_and(|b| b.index < oldest) {
            self.buckets.pop_front();
        }
    }
}
