//! Rollup payload published to the broker and served by the query endpoint
//!
//! ```json
//! {
//!     "metadata": {"window-duration": "5m0s", "rollup-ts": 1700000000, "uptime": "1h2m3s"},
//!     "data": {"IssuesEvent": 1, "PushEvent": 3}
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rollup metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "window-duration")]
    window_duration: String,
    #[serde(rename = "rollup-ts")]
    rollup_ts: i64,
    uptime: String,
}

impl Metadata {
    pub fn new(window: Duration, rollup_ts: i64, uptime: Duration) -> Self {
        Self {
            window_duration: format_duration(window),
            rollup_ts,
            uptime: format_duration(uptime),
        }
    }

    pub fn window_duration(&self) -> &str {
        &self.window_duration
    }

    /// Unix timestamp (seconds) at which the rollup was taken
    pub fn rollup_ts(&self) -> i64 {
        self.rollup_ts
    }

    pub fn uptime(&self) -> &str {
        &self.uptime
    }
}

/// Point-in-time snapshot of windowed per-label counts.
///
/// Fields are private: a rollup is never modified once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    metadata: Metadata,
    data: BTreeMap<String, f64>,
}

impl Rollup {
    pub fn new(metadata: Metadata, data: BTreeMap<String, f64>) -> Self {
        Self { metadata, data }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn data(&self) -> &BTreeMap<String, f64> {
        &self.data
    }

    /// Value for a label, if present
    pub fn get(&self, label: &str) -> Option<f64> {
        self.data.get(label).copied()
    }

    /// Canonical encoding: compact JSON with keys in sorted order
    pub fn encode(&self) -> Result<Vec<u8>, RollupError> {
        serde_json::to_vec(self).map_err(|e| RollupError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RollupError> {
        serde_json::from_slice(bytes).map_err(|e| RollupError::Decode(e.to_string()))
    }
}

/// Format a duration as `1h2m3s`, `5m0s`, `42s` (whole seconds)
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RollupError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}
