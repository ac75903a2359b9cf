//! Process configuration from environment variables
//!
//! Producer:
//! - `ROLLUPS_BROKER`: Kafka broker address (default: 127.0.0.1:9092)
//! - `ROLLUPS_PRODUCER_TOPIC`: Topic to produce rollups to (default: rollups)
//! - `ROLLUPS_EVENTS_PER_PAGE`: Events per feed call, at most 100 (default: 100)
//! - `ROLLUPS_FEED_URL`: Event feed URL (default: https://api.github.com/events)
//! - `ROLLUPS_WINDOW_SECS`: Sliding window length in seconds (default: 300)
//!
//! Consumer:
//! - `ROLLUPS_BROKER`: Kafka broker address (default: 127.0.0.1:9092)
//! - `ROLLUPS_CONSUMER_TOPIC`: Topic to consume rollups from (default: rollups)
//! - `ROLLUPS_CONSUMER_GROUP`: Consumer group ID (default: rollups-consumer)
//! - `ROLLUPS_BIND`: HTTP bind address (default: 0.0.0.0:8080)

use std::time::Duration;

use crate::aggregate::DEFAULT_WINDOW;
use crate::broker::DEFAULT_BROKER;
use crate::feed::{DEFAULT_FEED_URL, MAX_EVENTS_PER_PAGE};

const DEFAULT_TOPIC: &str = "rollups";

/// Producer process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    pub broker: String,
    pub topic: String,
    pub events_per_page: usize,
    pub feed_url: String,
    pub window: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            broker: DEFAULT_BROKER.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            events_per_page: MAX_EVENTS_PER_PAGE,
            feed_url: DEFAULT_FEED_URL.to_string(),
            window: DEFAULT_WINDOW,
        }
    }
}

impl ProducerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let events_per_page = lookup("ROLLUPS_EVENTS_PER_PAGE")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(cap_page_size)
            .unwrap_or(defaults.events_per_page);

        let window = lookup("ROLLUPS_WINDOW_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.window);

        Self {
            broker: lookup("ROLLUPS_BROKER").unwrap_or(defaults.broker),
            topic: lookup("ROLLUPS_PRODUCER_TOPIC").unwrap_or(defaults.topic),
            events_per_page,
            feed_url: lookup("ROLLUPS_FEED_URL").unwrap_or(defaults.feed_url),
            window,
        }
    }
}

/// Consumer process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub broker: String,
    pub topic: String,
    pub group_id: String,
    pub bind: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            broker: DEFAULT_BROKER.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            group_id: "rollups-consumer".to_string(),
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ConsumerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            broker: lookup("ROLLUPS_BROKER").unwrap_or(defaults.broker),
            topic: lookup("ROLLUPS_CONSUMER_TOPIC").unwrap_or(defaults.topic),
            group_id: lookup("ROLLUPS_CONSUMER_GROUP").unwrap_or(defaults.group_id),
            bind: lookup("ROLLUPS_BIND").unwrap_or(defaults.bind),
        }
    }
}

/// Clamp a requested page size to what the feed serves
pub fn cap_page_size(requested: usize) -> usize {
    requested.clamp(1, MAX_EVENTS_PER_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_producer_defaults() {
        let config = ProducerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ProducerConfig::default());
        assert_eq!(config.events_per_page, 100);
        assert_eq!(config.window, Duration::from_secs(300));
    }

    #[test]
    fn test_producer_overrides() {
        let config = ProducerConfig::from_lookup(lookup(&[
            ("ROLLUPS_BROKER", "kafka:9092"),
            ("ROLLUPS_PRODUCER_TOPIC", "gh-rollups"),
            ("ROLLUPS_EVENTS_PER_PAGE", "30"),
            ("ROLLUPS_WINDOW_SECS", "60"),
        ]));

        assert_eq!(config.broker, "kafka:9092");
        assert_eq!(config.topic, "gh-rollups");
        assert_eq!(config.events_per_page, 30);
        assert_eq!(config.window, Duration::from_secs(60));
    }

    #[test]
    fn test_page_size_capped() {
        let config = ProducerConfig::from_lookup(lookup(&[("ROLLUPS_EVENTS_PER_PAGE", "500")]));
        assert_eq!(config.events_per_page, 100);

        let config = ProducerConfig::from_lookup(lookup(&[("ROLLUPS_EVENTS_PER_PAGE", "many")]));
        assert_eq!(config.events_per_page, 100);

        assert_eq!(cap_page_size(0), 1);
    }

    #[test]
    fn test_broker_default_shared() {
        assert_eq!(ProducerConfig::default().broker, "127.0.0.1:9092");
        assert_eq!(ConsumerConfig::default().broker, DEFAULT_BROKER);
        assert_eq!(crate::producer::PollConfig::default().broker, DEFAULT_BROKER);
    }

    #[test]
    fn test_invalid_window_falls_back() {
        let config = ProducerConfig::from_lookup(lookup(&[("ROLLUPS_WINDOW_SECS", "0")]));
        assert_eq!(config.window, DEFAULT_WINDOW);
    }

    #[test]
    fn test_consumer_config() {
        assert_eq!(ConsumerConfig::from_lookup(lookup(&[])), ConsumerConfig::default());

        let config = ConsumerConfig::from_lookup(lookup(&[
            ("ROLLUPS_CONSUMER_GROUP", "dashboards"),
            ("ROLLUPS_BIND", "127.0.0.1:9000"),
        ]));
        assert_eq!(config.group_id, "dashboards");
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.topic, "rollups");
    }
}
