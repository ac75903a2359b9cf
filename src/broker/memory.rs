//! In-process broker with Kafka-like topic logs
//!
//! Each topic is an append-only log on a single partition. Consumers start at
//! the earliest offset; consumers sharing a group share one read cursor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{BrokerConsumer, BrokerError, BrokerMessage, BrokerProducer};

#[derive(Default)]
struct Inner {
    topics: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    /// Next offset to read, per (topic, group)
    cursors: Mutex<HashMap<(String, String), i64>>,
    /// Committed offset, per (topic, group)
    committed: Mutex<HashMap<(String, String), i64>>,
    appended: Notify,
    failing_sends: AtomicUsize,
}

impl Inner {
    fn append(&self, topic: &str, payload: Vec<u8>) {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(payload);
        self.appended.notify_waiters();
    }
}

/// Shared handle to an in-memory broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn consumer(&self, topic: &str, group_id: &str) -> MemoryConsumer {
        MemoryConsumer {
            inner: Arc::clone(&self.inner),
            key: (topic.to_string(), group_id.to_string()),
            closed: AtomicBool::new(false),
        }
    }

    /// Payloads stored in `topic`, oldest first
    pub fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner
            .topics
            .lock()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next `count` sends fail
    pub fn fail_next_sends(&self, count: usize) {
        self.inner.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Last committed offset for a group
    pub fn committed_offset(&self, topic: &str, group_id: &str) -> Option<i64> {
        self.inner
            .committed
            .lock()
            .get(&(topic.to_string(), group_id.to_string()))
            .copied()
    }
}

pub struct MemoryProducer {
    inner: Arc<Inner>,
}

impl BrokerProducer for MemoryProducer {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let failing = self
            .inner
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(BrokerError::Send("injected failure".to_string()));
        }

        self.inner.append(topic, payload);
        Ok(())
    }
}

pub struct MemoryConsumer {
    inner: Arc<Inner>,
    key: (String, String),
    closed: AtomicBool,
}

impl MemoryConsumer {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn try_next(&self) -> Option<BrokerMessage> {
        // Lock order: cursors, then topics
        let mut cursors = self.inner.cursors.lock();
        let cursor = cursors.entry(self.key.clone()).or_insert(0);

        let topics = self.inner.topics.lock();
        let payload = topics.get(&self.key.0)?.get(*cursor as usize)?.clone();
        let offset = *cursor;
        *cursor += 1;

        Some(BrokerMessage {
            topic: self.key.0.clone(),
            partition: 0,
            offset,
            payload,
        })
    }
}

impl BrokerConsumer for MemoryConsumer {
    async fn recv(&self) -> Result<BrokerMessage, BrokerError> {
        loop {
            if self.is_closed() {
                return Err(BrokerError::Receive("consumer closed".to_string()));
            }
            // Registered before checking so an append in between is not missed
            let appended = self.inner.appended.notified();
            if let Some(message) = self.try_next() {
                return Ok(message);
            }
            appended.await;
        }
    }

    fn commit(&self, message: &BrokerMessage) -> Result<(), BrokerError> {
        self.inner
            .committed
            .lock()
            .insert(self.key.clone(), message.offset);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
