//! Poll → aggregate → publish → sleep loop
//!
//! ```text
//! Polling ──events──▶ Publishing ──▶ Sleeping ──▶ Polling
//!    │
//!    ├──remaining == 0──▶ RateLimited ──reset wait──▶ Polling
//!    └──fetch error─────▶ TransientError ──1s──────▶ Polling
//!
//! any state ──shutdown──▶ Stopped
//! ```

use std::fmt;
use std::time::Duration;

use chrono::Utc;

use super::publisher::Publisher;
use crate::aggregate::{Aggregator, Label};
use crate::broker::BrokerProducer;
use crate::feed::{Event, EventSource, FeedError, IntervalPlanner, RateLimitInfo};
use crate::shutdown::Shutdown;

/// Poll loop settings
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Events requested per feed call
    pub per_page: usize,
    /// Wait after a failed feed call
    pub error_backoff: Duration,
    /// Broker address, for the startup report
    pub broker: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            per_page: crate::feed::MAX_EVENTS_PER_PAGE,
            error_backoff: Duration::from_secs(1),
            broker: crate::broker::DEFAULT_BROKER.to_string(),
        }
    }
}

/// Loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    /// Events were aggregated; publish, then sleep for `interval`
    Publishing { interval: Duration },
    /// Quota exhausted; wait before polling again
    RateLimited { wait: Duration },
    /// Feed call failed; back off before polling again
    TransientError,
    Sleeping(Duration),
    Stopped,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polling => write!(f, "Polling"),
            Self::Publishing { .. } => write!(f, "Publishing"),
            Self::RateLimited { .. } => write!(f, "RateLimited"),
            Self::TransientError => write!(f, "TransientError"),
            Self::Sleeping(_) => write!(f, "Sleeping"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Counters accumulated over the loop's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub fetches: u64,
    pub fetch_errors: u64,
    pub rate_limit_waits: u64,
    pub events_observed: u64,
    pub events_skipped: u64,
    pub published: u64,
    pub publish_failures: u64,
}

/// Producer-side loop driving an [`EventSource`] into a [`Publisher`]
pub struct PollLoop<S, P> {
    source: S,
    aggregator: Aggregator,
    publisher: Publisher<P>,
    planner: IntervalPlanner,
    config: PollConfig,
    startup_reported: bool,
    stats: PollStats,
}

impl<S: EventSource, P: BrokerProducer> PollLoop<S, P> {
    pub fn new(source: S, aggregator: Aggregator, publisher: Publisher<P>, config: PollConfig) -> Self {
        Self {
            source,
            aggregator,
            publisher,
            planner: IntervalPlanner::default(),
            config,
            startup_reported: false,
            stats: PollStats::default(),
        }
    }

    pub fn with_planner(mut self, planner: IntervalPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    /// Whether the one-time startup report has been logged
    pub fn startup_reported(&self) -> bool {
        self.startup_reported
    }

    /// Run until shutdown
    pub async fn run(mut self, shutdown: Shutdown) -> PollStats {
        tracing::info!(
            topic = %self.publisher.topic(),
            per_page = self.config.per_page,
            "Poll loop started"
        );

        let mut state = PollState::Polling;
        while state != PollState::Stopped {
            let next = self.step(state, &shutdown).await;
            tracing::trace!(from = %state, to = %next, "Poll loop transition");
            state = next;
        }

        tracing::info!(
            fetches = self.stats.fetches,
            published = self.stats.published,
            "Poll loop stopped"
        );
        self.stats
    }

    async fn step(&mut self, state: PollState, shutdown: &Shutdown) -> PollState {
        match state {
            PollState::Polling => self.poll(shutdown).await,
            PollState::Publishing { interval } => {
                self.publish(interval).await;
                PollState::Sleeping(interval)
            }
            PollState::RateLimited { wait } => {
                self.stats.rate_limit_waits += 1;
                Self::resume_after(wait, shutdown).await
            }
            PollState::TransientError => Self::resume_after(self.config.error_backoff, shutdown).await,
            PollState::Sleeping(interval) => Self::resume_after(interval, shutdown).await,
            PollState::Stopped => PollState::Stopped,
        }
    }

    async fn poll(&mut self, shutdown: &Shutdown) -> PollState {
        if shutdown.is_triggered() {
            return PollState::Stopped;
        }

        let response = tokio::select! {
            biased;
            _ = shutdown.wait() => return PollState::Stopped,
            response = self.source.fetch_events(self.config.per_page) => response,
        };
        self.stats.fetches += 1;

        // Exhausted quota wins over whatever the call returned
        if let Some(rate) = response.rate.filter(RateLimitInfo::is_exhausted) {
            let now = Utc::now();
            let wait = self.planner.reset_wait(&rate, now);
            tracing::warn!(
                reset_at = %rate.reset_at,
                resume_in_secs = (rate.reset_at - now).num_seconds(),
                wait_secs = wait.as_secs(),
                "Rate limited until reset"
            );
            return PollState::RateLimited { wait };
        }

        match response.events {
            Ok(events) => {
                self.observe(&events);
                let interval = match response.rate {
                    Some(rate) => self.planner.next_interval(&rate, Utc::now()),
                    None => self.planner.fallback_interval(),
                };
                PollState::Publishing { interval }
            }
            Err(e) => {
                self.stats.fetch_errors += 1;
                match &e {
                    FeedError::RateLimited { .. } => {
                        tracing::error!(error = %e, "Feed rate limit")
                    }
                    FeedError::SecondaryRateLimit(_) => {
                        tracing::error!(error = %e, "Feed secondary rate limit")
                    }
                    _ => tracing::error!(error = %e, "Feed API error"),
                }
                PollState::TransientError
            }
        }
    }

    fn observe(&mut self, events: &[Event]) {
        for event in events {
            match event.kind.as_deref().and_then(Label::new) {
                Some(label) => {
                    self.aggregator.observe(&label);
                    self.stats.events_observed += 1;
                }
                None => {
                    tracing::debug!(event_id = %event.id, "Skipping event without a type");
                    self.stats.events_skipped += 1;
                }
            }
        }
    }

    async fn publish(&mut self, interval: Duration) {
        let rollup = self.aggregator.snapshot();

        match self.publisher.publish(&rollup).await {
            Ok(payload) => {
                self.stats.published += 1;
                tracing::debug!(
                    topic = %self.publisher.topic(),
                    payload = %String::from_utf8_lossy(&payload),
                    "Published rollup"
                );
                if !self.startup_reported {
                    self.startup_reported = true;
                    tracing::info!(
                        "Processing a maximum of {} events every {} seconds. Rollups are produced to topic {} at {}",
                        self.config.per_page,
                        interval.as_secs(),
                        self.publisher.topic(),
                        self.config.broker
                    );
                }
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                tracing::error!(topic = %self.publisher.topic(), error = %e, "Failed to publish rollup");
            }
        }

        let next_at = Utc::now()
            + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());
        tracing::info!(next_at = %next_at, "Next iteration scheduled");
    }

    async fn resume_after(wait: Duration, shutdown: &Shutdown) -> PollState {
        if shutdown.sleep(wait).await {
            PollState::Polling
        } else {
            PollState::Stopped
        }
    }
}
