//! Fixed-window decision engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, timeout_at};

use crate::error::StoreError;
use crate::policy::{Policy, RateLimitConfig};
use crate::ports::{CounterStore, RateLimiter};

/// Default bound on the store round-trips of a single check.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// Outcome of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Exceeded,
}

/// Verdict plus the numbers it was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    /// Policy resolved for the identifier.
    pub policy: Policy,
    /// Count observed by the check. After an admitted request this includes it.
    pub count: u64,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allowed
    }

    pub fn is_exceeded(&self) -> bool {
        self.verdict == Verdict::Exceeded
    }

    /// Requests left in the current window.
    pub fn remaining(&self) -> u64 {
        self.policy.max_requests.saturating_sub(self.count)
    }
}

/// Orchestrates policy resolution and the counter store.
///
/// Holds no mutable state of its own; every counter lives in the store, so
/// one engine can serve any number of concurrent requests.
#[derive(Clone)]
pub struct DecisionEngine {
    config: Arc<RateLimitConfig>,
    store: Arc<dyn CounterStore>,
    store_timeout: Duration,
}

impl DecisionEngine {
    pub fn new(config: Arc<RateLimitConfig>, store: Arc<dyn CounterStore>) -> Self {
        Self {
            config,
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Override the deadline used by [`DecisionEngine::check`].
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Check `identifier`, giving the store round-trips at most `budget`.
    ///
    /// A count already at the limit is refused without touching the store
    /// again, so a refused request never eats into a later window. Otherwise
    /// the counter is incremented and the post-increment value decides: a
    /// request that lands above the limit is refused, which keeps concurrent
    /// callers from admitting more than `max_requests` between them.
    pub async fn check_within(
        &self,
        identifier: &str,
        budget: Duration,
    ) -> Result<Decision, StoreError> {
        // A budget past the clock's range means no deadline at all.
        let deadline = Instant::now().checked_add(budget);

        let current = bounded(deadline, budget, self.store.get_count(identifier))
            .await
            .inspect_err(|e| {
                tracing::warn!(identifier = %identifier, error = %e, "Counter read failed");
            })?;

        let policy = self.config.resolve(identifier);

        if current >= policy.max_requests {
            tracing::debug!(
                identifier = %identifier,
                count = current,
                limit = policy.max_requests,
                "Rate limit exceeded"
            );
            return Ok(Decision {
                verdict: Verdict::Exceeded,
                policy,
                count: current,
            });
        }

        let count = bounded(
            deadline,
            budget,
            self.store.increment_count(identifier, policy.block_duration),
        )
        .await
        .inspect_err(|e| {
            tracing::warn!(identifier = %identifier, error = %e, "Counter increment failed");
        })?;

        let verdict = if count > policy.max_requests {
            tracing::debug!(
                identifier = %identifier,
                count,
                limit = policy.max_requests,
                "Rate limit exceeded on increment"
            );
            Verdict::Exceeded
        } else {
            Verdict::Allowed
        };

        Ok(Decision {
            verdict,
            policy,
            count,
        })
    }
}

#[async_trait]
impl RateLimiter for DecisionEngine {
    async fn check(&self, identifier: &str) -> Result<Decision, StoreError> {
        self.check_within(identifier, self.store_timeout).await
    }
}

async fn bounded<T>(
    deadline: Option<Instant>,
    budget: Duration,
    op: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match deadline {
        Some(deadline) => timeout_at(deadline, op)
            .await
            .map_err(|_| StoreError::Timeout(budget))?,
        None => op.await,
    }
}
