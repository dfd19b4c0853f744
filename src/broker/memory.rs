//! In-process partitioned broker.
//!
//! Keys hash to a fixed partition, each partition is an append-only log, and
//! each source keeps its own per-partition cursor. A source reports
//! `EndOfPartition` once whenever it catches up with a partition.

use super::{partition_for, BrokerError, BrokerMessage, MessagePublisher, MessageSource, PollOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

struct StoredMessage {
    key: String,
    payload: Vec<u8>,
}

struct Inner {
    partitions: usize,
    topics: Mutex<HashMap<String, Vec<Vec<StoredMessage>>>>,
    notify: Notify,
}

impl Inner {
    fn topics(&self) -> MutexGuard<'_, HashMap<String, Vec<Vec<StoredMessage>>>> {
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared handle to an in-memory broker
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                topics: Mutex::new(HashMap::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Consume `topic` from the earliest retained message
    pub fn subscribe(&self, topic: &str) -> MemorySource {
        let n = self.inner.partitions;
        MemorySource {
            broker: self.clone(),
            topic: topic.to_string(),
            cursors: vec![0; n],
            eof_reported: vec![false; n],
            next_partition: 0,
        }
    }

    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    /// Total number of messages retained on a topic
    pub fn message_count(&self, topic: &str) -> usize {
        self.inner
            .topics()
            .get(topic)
            .map(|parts| parts.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Payloads published under `key`, in publish order
    pub fn payloads_for_key(&self, topic: &str, key: &str) -> Vec<Vec<u8>> {
        let partition = partition_for(key, self.inner.partitions);
        self.inner
            .topics()
            .get(topic)
            .map(|parts| {
                parts[partition]
                    .iter()
                    .filter(|m| m.key == key)
                    .map(|m| m.payload.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl MessagePublisher for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let partition = partition_for(key, self.inner.partitions);
        {
            let mut topics = self.inner.topics();
            let parts = topics
                .entry(topic.to_string())
                .or_insert_with(|| (0..self.inner.partitions).map(|_| Vec::new()).collect());
            parts[partition].push(StoredMessage {
                key: key.to_string(),
                payload,
            });
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

/// Consumer cursor over one topic of a [`MemoryBroker`]
pub struct MemorySource {
    broker: MemoryBroker,
    topic: String,
    cursors: Vec<usize>,
    eof_reported: Vec<bool>,
    next_partition: usize,
}

impl MemorySource {
    /// Move every cursor back to the start, so all retained messages are
    /// delivered again (a consumer restart without committed offsets).
    pub fn rewind(&mut self) {
        self.cursors.iter_mut().for_each(|c| *c = 0);
        self.eof_reported.iter_mut().for_each(|r| *r = false);
        self.next_partition = 0;
    }

    fn try_next(&mut self) -> Option<PollOutcome> {
        let topics = self.broker.inner.topics();
        let parts = topics.get(&self.topic)?;
        let n = parts.len();

        for step in 0..n {
            let p = (self.next_partition + step) % n;
            if let Some(stored) = parts[p].get(self.cursors[p]) {
                self.cursors[p] += 1;
                self.eof_reported[p] = false;
                self.next_partition = (p + 1) % n;
                return Some(PollOutcome::Message(BrokerMessage {
                    key: Some(stored.key.clone()),
                    payload: stored.payload.clone(),
                    partition: p,
                }));
            }
            if !self.eof_reported[p] {
                self.eof_reported[p] = true;
                self.next_partition = (p + 1) % n;
                return Some(PollOutcome::EndOfPartition { partition: p });
            }
        }
        None
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn poll(&mut self, timeout: Duration) -> Result<PollOutcome, BrokerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let inner = self.broker.inner.clone();

        loop {
            // Register before checking so a publish in between is not missed.
            let notified = inner.notify.notified();
            if let Some(outcome) = self.try_next() {
                return Ok(outcome);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(PollOutcome::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(outcome: PollOutcome) -> Option<Vec<u8>> {
        match outcome {
            PollOutcome::Message(m) => Some(m.payload),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_per_key_order_and_end_of_partition() {
        let broker = MemoryBroker::new(1);
        broker.publish("t", "1", b"a".to_vec()).await.unwrap();
        broker.publish("t", "1", b"b".to_vec()).await.unwrap();

        let mut source = broker.subscribe("t");
        let timeout = Duration::from_millis(10);
        assert_eq!(payload(source.poll(timeout).await.unwrap()), Some(b"a".to_vec()));
        assert_eq!(payload(source.poll(timeout).await.unwrap()), Some(b"b".to_vec()));
        assert_eq!(
            source.poll(timeout).await.unwrap(),
            PollOutcome::EndOfPartition { partition: 0 }
        );
        assert_eq!(source.poll(timeout).await.unwrap(), PollOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_wakes_on_publish() {
        let broker = MemoryBroker::new(2);
        let mut source = broker.subscribe("t");

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            publisher.publish("t", "7", b"late".to_vec()).await.unwrap();
        });

        let mut received = None;
        for _ in 0..4 {
            if let PollOutcome::Message(m) = source.poll(Duration::from_secs(1)).await.unwrap() {
                received = Some(m);
                break;
            }
        }
        let message = received.expect("message should arrive before the timeout");
        assert_eq!(message.key.as_deref(), Some("7"));
        assert_eq!(message.payload, b"late".to_vec());
    }

    #[tokio::test]
    async fn test_rewind_redelivers() {
        let broker = MemoryBroker::new(3);
        for key in ["1", "2", "3"] {
            broker.publish("t", key, key.as_bytes().to_vec()).await.unwrap();
        }
        assert_eq!(broker.message_count("t"), 3);

        let mut source = broker.subscribe("t");
        let mut first_pass = 0;
        while source.poll(Duration::from_millis(5)).await.unwrap() != PollOutcome::Timeout {
            first_pass += 1;
        }

        source.rewind();
        let mut second_pass = 0;
        while source.poll(Duration::from_millis(5)).await.unwrap() != PollOutcome::Timeout {
            second_pass += 1;
        }
        assert_eq!(first_pass, second_pass);
        assert!(first_pass >= 3);
    }
}
