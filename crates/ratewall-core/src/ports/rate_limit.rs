//! Rate limiting port.

use async_trait::async_trait;

use crate::engine::Decision;
use crate::error::StoreError;

/// Rate limiter trait - what the HTTP layer consumes.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide whether `identifier` is over its limit, recording the request
    /// when it is not.
    async fn check(&self, identifier: &str) -> Result<Decision, StoreError>;
}
