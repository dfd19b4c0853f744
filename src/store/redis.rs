//! Redis-backed snapshot store

use super::{StateStore, StoreError};
use crate::types::VehicleSnapshot;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Snapshots as Redis hashes with `EXPIRE`
#[derive(Clone)]
pub struct RedisStateStore {
    connection: MultiplexedConnection,
}

impl RedisStateStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!(url = %url, "Connected to Redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn put_snapshot(&self, snapshot: &VehicleSnapshot, ttl: Duration) -> Result<(), StoreError> {
        let fields: Vec<(&str, &str)> = snapshot
            .fields()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let ttl_secs = ttl.as_secs().max(1) as i64;

        // DEL first: a hash write alone would merge with stale fields.
        let mut connection = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(snapshot.key())
            .ignore()
            .hset_multiple(snapshot.key(), &fields)
            .ignore()
            .expire(snapshot.key(), ttl_secs)
            .ignore()
            .query_async(&mut connection)
            .await?;

        debug!(key = %snapshot.key(), ttl_secs = ttl_secs, "Snapshot written");
        Ok(())
    }

    async fn get_snapshot(&self, key: &str) -> Result<Option<VehicleSnapshot>, StoreError> {
        let mut connection = self.connection.clone();
        let fields: BTreeMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut connection)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(VehicleSnapshot::from_parts(key.to_string(), fields)))
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut connection = self.connection.clone();
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut connection)
            .await?;

        // -2: no such key, -1: no expiry set
        Ok((millis >= 0).then(|| Duration::from_millis(millis as u64)))
    }
}
