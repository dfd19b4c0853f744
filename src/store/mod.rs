//! Transient per-vehicle state store.
//!
//! A latest-snapshot cache with key-level TTL, never a system of record.
//! Writes are full overwrites, so duplicate deliveries are harmless.

pub mod memory;
pub mod redis;

use crate::types::VehicleSnapshot;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryStateStore;
pub use self::redis::RedisStateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store backend error: {0}")]
    Backend(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Replace the snapshot under its key and reset the key's TTL
    async fn put_snapshot(&self, snapshot: &VehicleSnapshot, ttl: Duration) -> Result<(), StoreError>;

    /// Live snapshot under `key`; expired keys are absent
    async fn get_snapshot(&self, key: &str) -> Result<Option<VehicleSnapshot>, StoreError>;

    /// Time left before `key` expires, if it is live
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}
