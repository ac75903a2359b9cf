//! Reads rollups from the broker into the [`LatestCache`]

use std::sync::Arc;

use chrono::Utc;

use super::cache::{LatestCache, LatestRollup};
use crate::broker::{BrokerConsumer, BrokerMessage};
use crate::rollup::Rollup;
use crate::shutdown::Shutdown;

/// Statistics from the subscribe loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeStats {
    pub messages_received: u64,
    pub messages_cached: u64,
    pub decode_errors: u64,
    pub read_errors: u64,
    pub last_offset: Option<i64>,
}

/// Consumer-side loop keeping the cache at the newest rollup
pub struct SubscribeLoop<C> {
    consumer: C,
    cache: Arc<LatestCache>,
    stats: SubscribeStats,
}

impl<C: BrokerConsumer> SubscribeLoop<C> {
    pub fn new(consumer: C, cache: Arc<LatestCache>) -> Self {
        Self {
            consumer,
            cache,
            stats: SubscribeStats::default(),
        }
    }

    /// Read until shutdown, then release the subscription
    pub async fn run(mut self, shutdown: Shutdown) -> SubscribeStats {
        tracing::info!("Subscribe loop started");

        while !shutdown.is_triggered() {
            let result = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                result = self.consumer.recv() => result,
            };

            match result {
                Ok(message) => self.handle_message(message),
                Err(e) => {
                    self.stats.read_errors += 1;
                    tracing::error!(error = %e, "Broker receive error");
                    // Retry straight away; yield so shutdown gets a look in
                    tokio::task::yield_now().await;
                }
            }
        }

        self.consumer.close();
        tracing::info!(
            received = self.stats.messages_received,
            cached = self.stats.messages_cached,
            "Subscribe loop stopped"
        );
        self.stats
    }

    fn handle_message(&mut self, message: BrokerMessage) {
        self.stats.messages_received += 1;

        let rollup = match Rollup::decode(&message.payload) {
            Ok(rollup) => rollup,
            Err(e) => {
                self.stats.decode_errors += 1;
                tracing::error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Failed to decode rollup"
                );
                return;
            }
        };

        tracing::info!(
            offset = message.offset,
            payload = %String::from_utf8_lossy(&message.payload),
            "Consumed rollup"
        );

        self.cache.replace(LatestRollup {
            rollup,
            offset: message.offset,
            payload: message.payload.clone(),
            received_at: Utc::now(),
        });
        self.stats.messages_cached += 1;
        self.stats.last_offset = Some(message.offset);

        // Commit only once the value is visible to readers
        if let Err(e) = self.consumer.commit(&message) {
            tracing::error!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to commit offset"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, BrokerProducer, MemoryBroker};
    use crate::rollup::Metadata;
    use crate::shutdown;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn payload(label: &str, count: f64) -> Vec<u8> {
        let data: BTreeMap<String, f64> = [(label.to_string(), count)].into();
        Rollup::new(Metadata::new(Duration::from_secs(300), 7, Duration::ZERO), data)
            .encode()
            .unwrap()
    }

    async fn wait_for_offset(cache: &LatestCache, offset: i64) {
        for _ in 0..200 {
            if cache.latest().is_some_and(|l| l.offset == offset) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("offset {} never cached", offset);
    }

    #[tokio::test]
    async fn test_caches_latest_rollup_from_earliest_offset() {
        let broker = MemoryBroker::new();
        let producer = broker.producer();
        producer.send("rollups", payload("push", 1.0)).await.unwrap();
        producer.send("rollups", payload("push", 5.0)).await.unwrap();

        let cache = Arc::new(LatestCache::new());
        let (trigger, shutdown) = shutdown::channel();
        let subscribe = SubscribeLoop::new(broker.consumer("rollups", "group"), Arc::clone(&cache));
        let handle = tokio::spawn(subscribe.run(shutdown));

        wait_for_offset(&cache, 1).await;
        let latest = cache.latest().unwrap();
        assert_eq!(latest.rollup.get("push"), Some(5.0));
        assert_eq!(latest.payload, payload("push", 5.0));

        trigger.trigger();
        let stats = handle.await.unwrap();
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.messages_cached, 2);
        assert_eq!(broker.committed_offset("rollups", "group"), Some(1));
    }

    #[tokio::test]
    async fn test_undecodable_message_leaves_cache_untouched() {
        let broker = MemoryBroker::new();
        let producer = broker.producer();
        producer.send("rollups", payload("push", 2.0)).await.unwrap();
        producer.send("rollups", b"{broken".to_vec()).await.unwrap();
        producer.send("rollups", payload("fork", 1.0)).await.unwrap();

        let cache = Arc::new(LatestCache::new());
        let (trigger, shutdown) = shutdown::channel();
        let handle = tokio::spawn(
            SubscribeLoop::new(broker.consumer("rollups", "group"), Arc::clone(&cache)).run(shutdown),
        );

        wait_for_offset(&cache, 2).await;
        trigger.trigger();
        let stats = handle.await.unwrap();

        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.messages_cached, 2);
        assert_eq!(stats.last_offset, Some(2));
    }

    /// Fails a fixed number of reads, then serves queued messages
    struct FlakyConsumer {
        failures: Mutex<u32>,
        messages: Mutex<VecDeque<BrokerMessage>>,
        closed: Arc<AtomicBool>,
    }

    impl BrokerConsumer for FlakyConsumer {
        async fn recv(&self) -> Result<BrokerMessage, BrokerError> {
            {
                let mut failures = self.failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(BrokerError::Receive("broker unavailable".to_string()));
                }
            }
            let next = self.messages.lock().pop_front();
            match next {
                Some(message) => Ok(message),
                None => std::future::pending().await,
            }
        }

        fn commit(&self, _message: &BrokerMessage) -> Result<(), BrokerError> {
            Err(BrokerError::Commit("coordinator moved".to_string()))
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_read_errors_retried_and_subscription_released() {
        let closed = Arc::new(AtomicBool::new(false));
        let consumer = FlakyConsumer {
            failures: Mutex::new(3),
            messages: Mutex::new(VecDeque::from([BrokerMessage {
                topic: "rollups".to_string(),
                partition: 0,
                offset: 9,
                payload: payload("push", 5.0),
            }])),
            closed: Arc::clone(&closed),
        };

        let cache = Arc::new(LatestCache::new());
        let (trigger, shutdown) = shutdown::channel();
        let handle = tokio::spawn(SubscribeLoop::new(consumer, Arc::clone(&cache)).run(shutdown));

        wait_for_offset(&cache, 9).await;
        trigger.trigger();
        let stats = handle.await.unwrap();

        assert_eq!(stats.read_errors, 3);
        assert_eq!(stats.messages_cached, 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_for_message() {
        let broker = MemoryBroker::new();
        let cache = Arc::new(LatestCache::new());
        let (trigger, shutdown) = shutdown::channel();
        let handle = tokio::spawn(
            SubscribeLoop::new(broker.consumer("rollups", "group"), Arc::clone(&cache)).run(shutdown),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();
        let stats = handle.await.unwrap();

        assert_eq!(stats, SubscribeStats::default());
        assert!(cache.is_empty());
    }
}
