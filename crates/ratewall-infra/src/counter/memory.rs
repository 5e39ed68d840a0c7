//! In-memory counter store - used for tests and single-instance deployments.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use ratewall_core::StoreError;
use ratewall_core::ports::CounterStore;

struct CounterRecord {
    count: u64,
    /// `None` when the ttl reaches past the clock's range.
    expires_at: Option<Instant>,
}

impl CounterRecord {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// In-memory fixed-window counters behind an async RwLock.
///
/// Expired records read as absent and are replaced on the next increment;
/// [`InMemoryCounterStore::purge_expired`] drops the ones nobody touches again.
/// Note: Counts are per-process and lost on restart.
pub struct InMemoryCounterStore {
    records: RwLock<HashMap<String, CounterRecord>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Remove every expired record. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.is_live(now));
        before - records.len()
    }

    /// Number of records held, live or not yet purged.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get_count(&self, identifier: &str) -> Result<u64, StoreError> {
        let records = self.records.read().await;
        let count = records
            .get(identifier)
            .filter(|record| record.is_live(Instant::now()))
            .map(|record| record.count)
            .unwrap_or(0);
        Ok(count)
    }

    async fn increment_count(&self, identifier: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut records = self.records.write().await;

        let record = records
            .entry(identifier.to_string())
            .or_insert(CounterRecord {
                count: 0,
                expires_at: Some(now),
            });

        if !record.is_live(now) {
            // New window
            record.count = 0;
            record.expires_at = now.checked_add(ttl);
        }

        record.count += 1;
        Ok(record.count)
    }
}
