//! Redis counter store using INCR with an expiry set on the first increment.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError, Script};

use ratewall_core::StoreError;
use ratewall_core::ports::CounterStore;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://:password@localhost:6379/0)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Namespace prepended to every counter key
    pub key_prefix: String,
    /// Whether to fall back to in-memory counters if Redis is unavailable
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            key_prefix: "ratelimit".to_string(),
            fallback_to_memory: false,
        }
    }
}

impl RedisConfig {
    /// Build a URL from a `host:port` address, an optional password and a
    /// database index.
    pub fn url_from_parts(address: &str, password: Option<&str>, db: i64) -> String {
        match password.filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{password}@{address}/{db}"),
            None => format!("redis://{address}/{db}"),
        }
    }
}

/// Redis-backed counter store.
///
/// Uses connection manager for automatic reconnection.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisConfig,
    /// Lua script for atomic increment with expiry
    script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Timeout(config.connect_timeout))?
            .map_err(store_error)?;

        // INCR and PEXPIRE in one round-trip so a fresh key can never be left
        // without an expiry. Returns the post-increment count.
        let script = Script::new(
            r#"
            local current = redis.call('INCR', KEYS[1])
            if current == 1 then
                redis.call('PEXPIRE', KEYS[1], ARGV[1])
            end
            return current
            "#,
        );

        tracing::info!(prefix = %config.key_prefix, "Connected to Redis counter store");

        Ok(Self {
            conn,
            config,
            script,
        })
    }

    fn make_key(&self, identifier: &str) -> String {
        format!("{}:{}", self.config.key_prefix, identifier)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get_count(&self, identifier: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();

        let value: Option<String> = conn
            .get(self.make_key(identifier))
            .await
            .map_err(store_error)?;

        match value {
            None => Ok(0),
            Some(raw) => parse_count(&raw),
        }
    }

    async fn increment_count(&self, identifier: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();

        // PEXPIRE rejects 0; a sub-millisecond window still gets one.
        let ttl_ms = ttl.as_millis().clamp(1, i64::MAX as u128) as i64;

        let count: i64 = self
            .script
            .key(self.make_key(identifier))
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;

        u64::try_from(count)
            .map_err(|_| StoreError::Protocol(format!("negative counter value {count}")))
    }
}

/// Stored counters must be plain non-negative integers.
fn parse_count(raw: &str) -> Result<u64, StoreError> {
    raw.parse::<u64>()
        .map_err(|_| StoreError::Protocol(format!("counter holds non-numeric value {raw:?}")))
}

fn store_error(e: RedisError) -> StoreError {
    match e.kind() {
        ErrorKind::TypeError | ErrorKind::ResponseError | ErrorKind::ExtensionError => {
            StoreError::Protocol(e.to_string())
        }
        _ => StoreError::Unavailable(e.to_string()),
    }
}
