//! Application state - the limiter and the store behind it.

use std::sync::Arc;
use std::time::Duration;

use ratewall_core::DecisionEngine;
use ratewall_core::ports::{CounterStore, RateLimiter};
use ratewall_infra::InMemoryCounterStore;

#[cfg(feature = "redis")]
use ratewall_infra::RedisCounterStore;

use crate::config::{AppConfig, CounterBackend};

/// How often the in-memory store drops expired counters.
const PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<dyn RateLimiter>,
    /// Backend actually in use, after any fallback.
    pub counter_backend: CounterBackend,
}

impl AppState {
    /// Build the application state with the configured counter store.
    ///
    /// Fails when Redis is configured, unreachable and fallback is off.
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let (store, counter_backend) = Self::counter_store(config).await?;

        let engine = DecisionEngine::new(Arc::new(config.rate_limit.clone()), store)
            .with_store_timeout(config.store_timeout);

        tracing::info!(
            backend = counter_backend.as_str(),
            overrides = config.rate_limit.custom_max_requests.len(),
            duration_overrides = config.rate_limit.custom_block_durations.len(),
            "Application state initialized"
        );

        Ok(Self {
            limiter: Arc::new(engine),
            counter_backend,
        })
    }

    /// Build state around an existing limiter.
    #[cfg(test)]
    pub fn with_limiter(limiter: Arc<dyn RateLimiter>, counter_backend: CounterBackend) -> Self {
        Self {
            limiter,
            counter_backend,
        }
    }

    async fn counter_store(
        config: &AppConfig,
    ) -> anyhow::Result<(Arc<dyn CounterStore>, CounterBackend)> {
        match config.counter_backend {
            #[cfg(feature = "redis")]
            CounterBackend::Redis => match RedisCounterStore::new(config.redis.clone()).await {
                Ok(store) => Ok((Arc::new(store), CounterBackend::Redis)),
                Err(e) if config.redis.fallback_to_memory => {
                    tracing::error!(
                        "Failed to connect to Redis: {}. Using in-memory counters.",
                        e
                    );
                    Ok((memory_store(), CounterBackend::Memory))
                }
                Err(e) => Err(anyhow::anyhow!("error connecting to Redis: {e}")),
            },
            #[cfg(not(feature = "redis"))]
            CounterBackend::Redis => {
                anyhow::bail!("redis counter backend requested but the redis feature is disabled")
            }
            CounterBackend::Memory => {
                tracing::warn!("Using in-memory counters - limits are per process");
                Ok((memory_store(), CounterBackend::Memory))
            }
        }
    }
}

/// In-memory store with a background task purging expired counters.
fn memory_store() -> Arc<dyn CounterStore> {
    let store = Arc::new(InMemoryCounterStore::new());

    let janitor = Arc::downgrade(&store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(store) = janitor.upgrade() else {
                break;
            };
            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired counters");
            }
        }
    });

    store
}
