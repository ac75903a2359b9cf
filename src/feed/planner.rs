//! Poll interval planning from feed rate-limit state

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::RateLimitInfo;

const SECONDS_PER_HOUR: u64 = 3600;

/// Computes how long to wait before the next feed call.
///
/// Polls are spread evenly over the hourly quota. Once the quota is exhausted
/// the wait runs until the reset, capped at `max_reset_wait`: the cap bounds
/// how stale a rollup can get, at the price of extra polls that may still be
/// refused if the reset is further away.
#[derive(Debug, Clone)]
pub struct IntervalPlanner {
    /// Ceiling on the wait when `remaining == 0`
    pub max_reset_wait: Duration,
    /// Hourly limit assumed when the feed reports none (or zero)
    pub fallback_limit: u32,
    /// Shortest interval ever returned
    pub min_interval: Duration,
}

impl Default for IntervalPlanner {
    fn default() -> Self {
        Self {
            max_reset_wait: Duration::from_secs(60),
            fallback_limit: 60,
            min_interval: Duration::from_secs(1),
        }
    }
}

impl IntervalPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_interval(&self, rate: &RateLimitInfo, now: DateTime<Utc>) -> Duration {
        if rate.is_exhausted() {
            self.reset_wait(rate, now)
        } else {
            self.spread_interval(rate.limit)
        }
    }

    /// Interval when the feed gave no rate-limit information
    pub fn fallback_interval(&self) -> Duration {
        self.spread_interval(self.fallback_limit)
    }

    /// Time until the quota resets, capped at `max_reset_wait`
    pub fn reset_wait(&self, rate: &RateLimitInfo, now: DateTime<Utc>) -> Duration {
        let until_reset = (rate.reset_at - now).to_std().unwrap_or(Duration::ZERO);
        until_reset.min(self.max_reset_wait).max(self.min_interval)
    }

    fn spread_interval(&self, limit: u32) -> Duration {
        let limit = if limit == 0 { self.fallback_limit } else { limit };
        let secs = SECONDS_PER_HOUR / u64::from(limit.max(1));
        Duration::from_secs(secs).max(self.min_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(limit: u32, remaining: u32, reset_in_secs: i64, now: DateTime<Utc>) -> RateLimitInfo {
        RateLimitInfo {
            limit,
            remaining,
            reset_at: now + chrono::Duration::seconds(reset_in_secs),
        }
    }

    #[test]
    fn test_spreads_polls_over_hour() {
        let planner = IntervalPlanner::new();
        let now = Utc::now();

        assert_eq!(planner.next_interval(&rate(60, 59, 3600, now), now), Duration::from_secs(60));
        assert_eq!(planner.next_interval(&rate(5000, 4999, 3600, now), now), Duration::from_secs(1));
        assert_eq!(planner.next_interval(&rate(7, 1, 3600, now), now), Duration::from_secs(514));
    }

    #[test]
    fn test_floors_at_one_second() {
        let planner = IntervalPlanner::new();
        let now = Utc::now();

        for limit in [3601, 10_000, u32::MAX] {
            assert_eq!(
                planner.next_interval(&rate(limit, 1, 0, now), now),
                Duration::from_secs(1)
            );
        }
    }

    #[test]
    fn test_base_interval_for_all_limits() {
        let planner = IntervalPlanner::new();
        let now = Utc::now();

        for limit in 1..=4000u32 {
            let expected = (3600 / u64::from(limit)).max(1);
            assert_eq!(
                planner.next_interval(&rate(limit, limit, 60, now), now),
                Duration::from_secs(expected)
            );
        }
    }

    #[test]
    fn test_exhausted_quota_caps_wait() {
        let planner = IntervalPlanner::new();
        let now = Utc::now();

        assert_eq!(planner.next_interval(&rate(60, 0, 90, now), now), Duration::from_secs(60));
        assert_eq!(planner.next_interval(&rate(60, 0, 86_400, now), now), Duration::from_secs(60));
        assert_eq!(planner.next_interval(&rate(60, 0, 20, now), now), Duration::from_secs(20));
    }

    #[test]
    fn test_reset_in_past_floors_at_one_second() {
        let planner = IntervalPlanner::new();
        let now = Utc::now();

        assert_eq!(planner.next_interval(&rate(60, 0, -30, now), now), Duration::from_secs(1));
        assert_eq!(planner.next_interval(&rate(60, 0, 0, now), now), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_limit_uses_fallback() {
        let planner = IntervalPlanner::new();
        let now = Utc::now();

        assert_eq!(planner.next_interval(&rate(0, 5, 60, now), now), Duration::from_secs(60));
        assert_eq!(planner.fallback_interval(), Duration::from_secs(60));
    }
}
