//! Message broker seams
//!
//! - [`memory::MemoryBroker`]: in-process topic log, used for tests and local runs
//! - [`kafka`]: rdkafka producer/consumer (enable with `kafka` feature)

pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;

use std::future::Future;

/// Broker address used when none is configured
pub const DEFAULT_BROKER: &str = "127.0.0.1:9092";

pub use memory::{MemoryBroker, MemoryConsumer, MemoryProducer};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaRollupConsumer, KafkaRollupProducer};

/// A message read from a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// Write side of the broker
pub trait BrokerProducer: Send + Sync {
    /// Send one unkeyed message. Resolves once the broker acknowledged it.
    fn send(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// Read side of the broker, bound to one topic and consumer group
pub trait BrokerConsumer: Send + Sync {
    /// Wait for the next message
    fn recv(&self) -> impl Future<Output = Result<BrokerMessage, BrokerError>> + Send;

    /// Record `message` as processed for the consumer group
    fn commit(&self, message: &BrokerMessage) -> Result<(), BrokerError>;

    /// Leave the group and release the subscription
    fn close(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Client error: {0}")]
    Client(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Receive error: {0}")]
    Receive(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Empty message at offset {0}")]
    EmptyPayload(i64),
}
