use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::window::{WindowedCount, DEFAULT_WINDOW};
use crate::rollup::{Metadata, Rollup};

/// Event-type label as published in rollups.
///
/// Labels are the feed's own type names, trimmed and never namespaced, so a
/// rollup key is exactly the label that was observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    /// Returns `None` for empty or whitespace-only names
    pub fn new(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(Self(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Windowed per-label counts
pub struct Aggregator {
    window: Duration,
    started_at: Instant,
    counts: Mutex<HashMap<Label, WindowedCount>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    /// Aggregator whose uptime and windows are measured from `started_at`
    pub fn starting_at(window: Duration, started_at: Instant) -> Self {
        Self {
            window,
            started_at,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of distinct labels seen so far
    pub fn label_count(&self) -> usize {
        self.counts.lock().len()
    }

    pub fn observe(&self, label: &Label) {
        self.observe_at(label, Instant::now());
    }

    pub fn observe_at(&self, label: &Label, now: Instant) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(label) {
            count.observe_at(now);
            return;
        }

        let mut count = WindowedCount::new(self.window, self.started_at);
        count.observe_at(now);
        counts.insert(label.clone(), count);
        tracing::debug!(label = %label, "Tracking new event type");
    }

    pub fn snapshot(&self) -> Rollup {
        self.snapshot_at(Instant::now(), Utc::now())
    }

    /// Rollup of every label's windowed sum at `now`.
    ///
    /// Labels whose observations have all aged out stay in the rollup at 0.
    pub fn snapshot_at(&self, now: Instant, wall_clock: DateTime<Utc>) -> Rollup {
        let data: BTreeMap<String, f64> = {
            let counts = self.counts.lock();
            counts
                .iter()
                .map(|(label, count)| (label.as_str().to_string(), count.sum_at(now) as f64))
                .collect()
        };

        let metadata = Metadata::new(
            self.window,
            wall_clock.timestamp(),
            now.saturating_duration_since(self.started_at),
        );
        Rollup::new(metadata, data)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
