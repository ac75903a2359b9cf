//! Single-slot store for the most recently consumed rollup

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::rollup::Rollup;

/// A consumed rollup together with the bytes it was decoded from
#[derive(Debug, Clone, PartialEq)]
pub struct LatestRollup {
    pub rollup: Rollup,
    /// Payload exactly as read from the broker
    pub payload: Vec<u8>,
    pub offset: i64,
    pub received_at: DateTime<Utc>,
}

/// Holds zero or one rollup.
///
/// Values are swapped in whole behind an `Arc`, so readers only ever see a
/// complete value and the lock is held just for the pointer swap or clone.
#[derive(Debug, Default)]
pub struct LatestCache {
    slot: Mutex<Option<Arc<LatestRollup>>>,
}

impl LatestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value, returning the previous one
    pub fn replace(&self, latest: LatestRollup) -> Option<Arc<LatestRollup>> {
        let latest = Arc::new(latest);
        self.slot.lock().replace(latest)
    }

    pub fn latest(&self) -> Option<Arc<LatestRollup>> {
        self.slot.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}
