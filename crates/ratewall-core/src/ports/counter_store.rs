use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// Counter store trait - abstraction over per-identifier request counters
/// (Redis, in-memory).
///
/// A record is created by the first increment of a window and disappears when
/// its expiry elapses. Increments for the same identifier must be
/// linearizable.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current count for `identifier`, or 0 when it has no live record.
    async fn get_count(&self, identifier: &str) -> Result<u64, StoreError>;

    /// Atomically add one to the counter and return the new value.
    ///
    /// When this call creates the record, its expiry is set to `ttl` from
    /// now. An existing record keeps its expiry.
    async fn increment_count(&self, identifier: &str, ttl: Duration) -> Result<u64, StoreError>;
}
