//! Hands encoded rollups to the broker

use crate::broker::{BrokerError, BrokerProducer};
use crate::rollup::{Rollup, RollupError};

/// Publishes rollups to one topic
pub struct Publisher<P> {
    producer: P,
    topic: String,
}

impl<P: BrokerProducer> Publisher<P> {
    pub fn new(producer: P, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encode and send one rollup. Retries are the broker client's job.
    pub async fn publish(&self, rollup: &Rollup) -> Result<Vec<u8>, PublishError> {
        let payload = rollup.encode()?;
        self.producer.send(&self.topic, payload.clone()).await?;
        Ok(payload)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode rollup: {0}")]
    Encode(#[from] RollupError),

    #[error("Failed to send rollup: {0}")]
    Broker(#[from] BrokerError),
}
