//! In-process snapshot store on the tokio clock

use super::{StateStore, StoreError};
use crate::types::VehicleSnapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    snapshot: VehicleSnapshot,
    expires_at: Instant,
}

/// Hash-map store with lazy expiry.
///
/// Deadlines use `tokio::time::Instant`, so paused-clock tests can
/// fast-forward past a TTL.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Keys that have not expired, sorted
    pub fn live_keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut entries = self.entries();
        entries.retain(|_, e| e.expires_at > now);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.live_keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put_snapshot(&self, snapshot: &VehicleSnapshot, ttl: Duration) -> Result<(), StoreError> {
        self.entries().insert(
            snapshot.key().to_string(),
            Entry {
                snapshot: snapshot.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_snapshot(&self, key: &str) -> Result<Option<VehicleSnapshot>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.snapshot.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now))
    }
}
