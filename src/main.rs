//! Rollups Producer
//!
//! Run with: cargo run --features kafka
//!
//! Environment variables:
//! - ROLLUPS_BROKER: Kafka broker address (default: 127.0.0.1:9092)
//! - ROLLUPS_PRODUCER_TOPIC: Topic to produce rollups to (default: rollups)
//! - ROLLUPS_EVENTS_PER_PAGE: Events per feed call, at most 100 (default: 100)
//! - ROLLUPS_FEED_URL: Event feed URL (default: https://api.github.com/events)
//! - ROLLUPS_WINDOW_SECS: Sliding window length in seconds (default: 300)
//! - RUST_LOG: Log level (default: info)

use rollups::aggregate::Aggregator;
use rollups::broker::{KafkaConfig, KafkaRollupProducer};
use rollups::config::ProducerConfig;
use rollups::feed::GitHubEvents;
use rollups::producer::{PollConfig, PollLoop, Publisher};
use rollups::rollup::format_duration;
use rollups::shutdown;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollups=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ProducerConfig::from_env();

    tracing::info!("Producer configuration:");
    tracing::info!("  Broker: {}", config.broker);
    tracing::info!("  Topic: {}", config.topic);
    tracing::info!("  Events per page: {}", config.events_per_page);
    tracing::info!("  Window: {}", format_duration(config.window));

    let source = GitHubEvents::new(config.feed_url.clone())?;
    tracing::info!("  Feed: {}", source.url());
    let producer = KafkaRollupProducer::new(&KafkaConfig::new(config.broker.clone()))?;
    let publisher = Publisher::new(producer, config.topic.clone());
    let aggregator = Aggregator::with_window(config.window);

    let poll_config = PollConfig {
        per_page: config.events_per_page,
        broker: config.broker.clone(),
        ..Default::default()
    };

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(trigger.trigger_on_signal());

    let stats = PollLoop::new(source, aggregator, publisher, poll_config)
        .run(shutdown)
        .await;

    tracing::info!(
        fetches = stats.fetches,
        published = stats.published,
        publish_failures = stats.publish_failures,
        "Producer stopped"
    );
    Ok(())
}
