//! Kafka producer and consumer for rollups
//!
//! The producer requires acknowledgement from all in-sync replicas and leaves
//! retrying to librdkafka (`message.send.max.retries`). The consumer joins a
//! consumer group, starts from the earliest offset when the group has no
//! committed offset, and commits after each message is processed.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};

use super::{BrokerConsumer, BrokerError, BrokerMessage, BrokerProducer, DEFAULT_BROKER};

/// Kafka client configuration
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Kafka broker addresses
    pub brokers: String,
    /// Consumer group ID
    pub group_id: String,
    /// Auto offset reset (earliest or latest)
    pub auto_offset_reset: String,
    /// Producer acks
    pub acks: String,
    /// Producer retries before a send is reported failed
    pub max_retries: u32,
    /// How long a send may sit in the local queue
    pub queue_timeout: Duration,
    /// Connection/socket timeout in ms
    pub socket_timeout_ms: u32,
    /// Session timeout in ms
    pub session_timeout_ms: u32,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_BROKER.to_string(),
            group_id: "rollups-consumer".to_string(),
            auto_offset_reset: "earliest".to_string(),
            acks: "all".to_string(),
            max_retries: 3,
            queue_timeout: Duration::from_secs(10),
            socket_timeout_ms: 10000,
            session_timeout_ms: 30000,
        }
    }
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            ..Self::default()
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }
}

/// Rollup producer backed by rdkafka
pub struct KafkaRollupProducer {
    producer: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaRollupProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", &config.acks)
            .set("message.send.max.retries", config.max_retries.to_string())
            .set("enable.idempotence", "false")
            .set("socket.timeout.ms", config.socket_timeout_ms.to_string())
            // One rollup per cycle, nothing to batch
            .set("linger.ms", "0")
            .create()
            .map_err(|e| BrokerError::Client(e.to_string()))?;

        Ok(Self {
            producer,
            queue_timeout: config.queue_timeout,
        })
    }
}

impl BrokerProducer for KafkaRollupProducer {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let record = FutureRecord::<(), [u8]>::to(topic).payload(&payload);

        match self.producer.send(record, self.queue_timeout).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %topic,
                    partition = partition,
                    offset = offset,
                    "Rollup delivered"
                );
                Ok(())
            }
            Err((e, _message)) => Err(BrokerError::Send(e.to_string())),
        }
    }
}

/// Rollup consumer backed by rdkafka
pub struct KafkaRollupConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaRollupConsumer {
    /// Create a consumer and subscribe it to `topic`
    pub fn new(config: &KafkaConfig, topic: &str) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("socket.timeout.ms", config.socket_timeout_ms.to_string())
            .create()
            .map_err(|e| BrokerError::Client(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Client(e.to_string()))?;
        tracing::info!(topic = %topic, group = %config.group_id, "Subscribed to Kafka topic");

        Ok(Self {
            consumer,
            topic: topic.to_string(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl BrokerConsumer for KafkaRollupConsumer {
    async fn recv(&self) -> Result<BrokerMessage, BrokerError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BrokerError::Receive(e.to_string()))?;

        let payload = message
            .payload()
            .ok_or(BrokerError::EmptyPayload(message.offset()))?
            .to_vec();

        Ok(BrokerMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload,
        })
    }

    fn commit(&self, message: &BrokerMessage) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| BrokerError::Commit(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BrokerError::Commit(e.to_string()))
    }

    fn close(&self) {
        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "Unsubscribed from Kafka topic");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_config_default() {
        let config = KafkaConfig::default();
        assert_eq!(config.brokers, "127.0.0.1:9092");
        assert_eq!(config.acks, "all");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.auto_offset_reset, "earliest");
    }

    #[test]
    fn test_kafka_config_builder() {
        let config = KafkaConfig::new("kafka:9092").with_group_id("dashboards");
        assert_eq!(config.brokers, "kafka:9092");
        assert_eq!(config.group_id, "dashboards");
    }
}
