//! Rate-limited activity event feed
//!
//! [`EventSource`] is the seam the poll loop drives; [`GitHubEvents`] is the
//! production implementation against the GitHub public events API.

pub mod github;
pub mod planner;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use github::{parse_rate_limit, GitHubEvents, DEFAULT_FEED_URL};
pub use planner::IntervalPlanner;

/// Largest page the feed will serve
pub const MAX_EVENTS_PER_PAGE: usize = 100;

/// Single activity event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind: Some(kind.into()),
            created_at: None,
        }
    }
}

/// Quota state reported alongside every feed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Requests allowed per hour
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the window resets
    pub reset_at: DateTime<Utc>,
}

impl RateLimitInfo {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Result of one feed call.
///
/// `rate` is present whenever the feed answered at all, even with an error.
#[derive(Debug)]
pub struct FeedResponse {
    pub events: Result<Vec<Event>, FeedError>,
    pub rate: Option<RateLimitInfo>,
}

/// Source of activity events
pub trait EventSource: Send + Sync {
    /// Fetch the most recent page of up to `per_page` events
    fn fetch_events(&self, per_page: usize) -> impl Future<Output = FeedResponse> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Rate limit exceeded, resets at {reset_at:?}")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("Secondary rate limit exceeded: {0}")]
    SecondaryRateLimit(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl FeedError {
    /// Quota errors, primary or secondary
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            FeedError::RateLimited { .. } | FeedError::SecondaryRateLimit(_)
        )
    }
}
