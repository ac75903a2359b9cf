//! Rollups Consumer
//!
//! Run with: cargo run --features kafka --bin rollups-consumer
//!
//! Environment variables:
//! - ROLLUPS_BROKER: Kafka broker address (default: 127.0.0.1:9092)
//! - ROLLUPS_CONSUMER_TOPIC: Topic to consume rollups from (default: rollups)
//! - ROLLUPS_CONSUMER_GROUP: Consumer group ID (default: rollups-consumer)
//! - ROLLUPS_BIND: HTTP bind address (default: 0.0.0.0:8080)
//! - RUST_LOG: Log level (default: info)

use std::sync::Arc;

use rollups::api::{run_server, ServerConfig};
use rollups::broker::{KafkaConfig, KafkaRollupConsumer};
use rollups::config::ConsumerConfig;
use rollups::consumer::{LatestCache, SubscribeLoop};
use rollups::shutdown;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollups=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConsumerConfig::from_env();

    tracing::info!("Consumer configuration:");
    tracing::info!("  Broker: {}", config.broker);
    tracing::info!("  Bind: {}", config.bind);
    tracing::info!("Starting a consumer with group {}", config.group_id);

    let kafka_config = KafkaConfig::new(config.broker.clone()).with_group_id(config.group_id.clone());
    let consumer = KafkaRollupConsumer::new(&kafka_config, &config.topic)?;
    tracing::info!("  Topic: {}", consumer.topic());
    let cache = Arc::new(LatestCache::new());

    let (trigger, shutdown) = shutdown::channel();

    let subscriber = tokio::spawn(
        SubscribeLoop::new(consumer, Arc::clone(&cache)).run(shutdown.clone()),
    );
    let mut server = tokio::spawn(run_server(
        ServerConfig { bind: config.bind },
        cache,
        shutdown,
    ));

    // An early server exit drops the trigger, which stops the subscribe loop too
    let finished = tokio::select! {
        _ = trigger.trigger_on_signal() => None,
        result = &mut server => Some(result),
    };
    let server_result = match finished {
        Some(result) => result?,
        None => server.await?,
    };

    let stats = subscriber.await?;
    tracing::info!(
        received = stats.messages_received,
        cached = stats.messages_cached,
        decode_errors = stats.decode_errors,
        "Consumer stopped"
    );

    server_result
}
