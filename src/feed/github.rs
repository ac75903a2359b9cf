//! GitHub public events client
//!
//! Calls `GET /events?per_page=N` and reads the quota from the
//! `x-ratelimit-limit`, `x-ratelimit-remaining` and `x-ratelimit-reset`
//! response headers.

use std::time::Duration;

use chrono::DateTime;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;

use super::{Event, EventSource, FeedError, FeedResponse, RateLimitInfo, MAX_EVENTS_PER_PAGE};

pub const DEFAULT_FEED_URL: &str = "https://api.github.com/events";

const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";

/// Event source backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubEvents {
    http_client: reqwest::Client,
    url: String,
}

impl GitHubEvents {
    pub fn new(url: impl Into<String>) -> Result<Self, FeedError> {
        Self::with_timeout(url, Duration::from_secs(10))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl EventSource for GitHubEvents {
    async fn fetch_events(&self, per_page: usize) -> FeedResponse {
        let per_page = per_page.clamp(1, MAX_EVENTS_PER_PAGE);

        let response = match self
            .http_client
            .get(&self.url)
            .query(&[("per_page", per_page)])
            .header(USER_AGENT, concat!("rollups/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return FeedResponse {
                    events: Err(FeedError::Transport(e.to_string())),
                    rate: None,
                }
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let rate = parse_rate_limit(&headers);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return FeedResponse {
                events: Err(classify_error(status, &headers, rate.as_ref(), &body)),
                rate,
            };
        }

        let events = response
            .json::<Vec<Event>>()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()));

        FeedResponse { events, rate }
    }
}

/// Parse the quota headers; `None` unless all three are present and valid
pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let number = |name: &str| -> Option<i64> {
        headers.get(name)?.to_str().ok()?.trim().parse().ok()
    };

    let limit = u32::try_from(number(HEADER_LIMIT)?).ok()?;
    let remaining = u32::try_from(number(HEADER_REMAINING)?).ok()?;
    let reset_at = DateTime::from_timestamp(number(HEADER_RESET)?, 0)?;

    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
    })
}

fn classify_error(
    status: StatusCode,
    headers: &HeaderMap,
    rate: Option<&RateLimitInfo>,
    body: &str,
) -> FeedError {
    let quota_status = status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS;

    if quota_status {
        if let Some(rate) = rate.filter(|r| r.is_exhausted()) {
            return FeedError::RateLimited {
                reset_at: Some(rate.reset_at),
            };
        }
        if headers.contains_key(RETRY_AFTER)
            || body.to_ascii_lowercase().contains("secondary rate limit")
        {
            return FeedError::SecondaryRateLimit(api_message(body));
        }
    }

    FeedError::Api {
        status: status.as_u16(),
        message: api_message(body),
    }
}

/// The `message` field of a GitHub error body, or the raw body
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}
