//! Stream broker seam: publish-with-key and poll-with-timeout.
//!
//! The pipeline only needs ordered, keyed, at-least-once delivery. NATS
//! backs it in production; [`memory::MemoryBroker`] backs tests.

pub mod memory;
pub mod nats;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::{MemoryBroker, MemorySource};
pub use nats::{NatsPublisher, NatsSource};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to connect to broker at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("subscription to {0} is closed")]
    Closed(String),
}

/// One message as delivered to a consumer
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    /// Routing key, the vehicle identity
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub partition: usize,
}

/// Result of a single bounded poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Message(BrokerMessage),
    /// No more data on this partition for now. Not an error.
    EndOfPartition { partition: usize },
    /// Nothing arrived within the timeout. Not an error.
    Timeout,
}

/// Producer side of the broker
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish `payload` on `topic`; messages sharing a key keep their order
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Push buffered messages out
    async fn flush(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Consumer side of the broker
#[async_trait]
pub trait MessageSource: Send {
    /// Wait at most `timeout` for the next delivery
    async fn poll(&mut self, timeout: Duration) -> Result<PollOutcome, BrokerError>;
}

/// FNV-1a over the key bytes; stable across runs and platforms
pub(crate) fn partition_for(key: &str, partitions: usize) -> usize {
    let mut h: u64 = 14695981039346656037;
    for b in key.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    (h % partitions.max(1) as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_is_stable_and_bounded() {
        for key in ["1", "2", "V-17", ""] {
            let p = partition_for(key, 4);
            assert!(p < 4);
            assert_eq!(p, partition_for(key, 4));
        }
        assert_eq!(partition_for("anything", 0), 0);
    }
}
