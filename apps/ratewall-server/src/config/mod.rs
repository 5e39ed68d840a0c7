//! Application configuration loaded from environment variables.

mod parse;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use actix_web::http::header::HeaderName;
use ratewall_core::RateLimitConfig;
use ratewall_core::engine::DEFAULT_STORE_TIMEOUT;

#[cfg(feature = "redis")]
use ratewall_infra::RedisConfig;

use crate::middleware::rate_limit::GatekeeperConfig;

use parse::{parse_block_duration, parse_max_requests, parse_overrides};

/// A configuration value that could not be used. Startup aborts on any of
/// these; the server never runs with a partially-parsed policy table.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterBackend {
    Redis,
    Memory,
}

impl CounterBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterBackend::Redis => "redis",
            CounterBackend::Memory => "memory",
        }
    }
}

impl FromStr for CounterBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" if cfg!(feature = "redis") => Ok(CounterBackend::Redis),
            "redis" => Err("built without redis support".to_string()),
            "memory" => Ok(CounterBackend::Memory),
            other => Err(format!("unknown backend {other:?}, expected redis or memory")),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    pub gatekeeper: GatekeeperConfig,
    /// Deadline for the store round-trips of one check.
    pub store_timeout: Duration,
    pub counter_backend: CounterBackend,
    #[cfg(feature = "redis")]
    pub redis: RedisConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a
    /// variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup: &lookup };
        let defaults = RateLimitConfig::default();

        let rate_limit = RateLimitConfig {
            default_ip_max_requests: vars.parsed_with(
                "DEFAULT_IP_MAX_REQ_PER_SEC",
                defaults.default_ip_max_requests,
                parse_max_requests,
            )?,
            default_token_max_requests: vars.parsed_with(
                "DEFAULT_TOKEN_MAX_REQ_PER_SEC",
                defaults.default_token_max_requests,
                parse_max_requests,
            )?,
            default_ip_block_duration: vars.parsed_with(
                "DEFAULT_IP_BLOCK_DURATION",
                defaults.default_ip_block_duration,
                parse_block_duration,
            )?,
            default_token_block_duration: vars.parsed_with(
                "DEFAULT_TOKEN_BLOCK_DURATION",
                defaults.default_token_block_duration,
                parse_block_duration,
            )?,
            custom_max_requests: parse_overrides(
                "CUSTOM_MAX_REQ_PER_SEC",
                &vars.raw("CUSTOM_MAX_REQ_PER_SEC").unwrap_or_default(),
                parse_max_requests,
            )?,
            custom_block_durations: parse_overrides(
                "CUSTOM_BLOCK_DURATION",
                &vars.raw("CUSTOM_BLOCK_DURATION").unwrap_or_default(),
                parse_block_duration,
            )?,
        };

        let api_key_header = vars.parsed_with(
            "API_KEY_HEADER",
            HeaderName::from_static("api_key"),
            |v| HeaderName::from_bytes(v.as_bytes()).map_err(|e| e.to_string()),
        )?;

        let gatekeeper = GatekeeperConfig {
            api_key_header,
            trust_forwarded_headers: vars.flag("TRUST_FORWARDED_HEADERS", false)?,
            fail_open: vars.flag("RATE_LIMIT_FAIL_OPEN", false)?,
        };

        let store_timeout = vars.parsed_with(
            "STORE_TIMEOUT_MS",
            DEFAULT_STORE_TIMEOUT,
            |v| match v.parse::<u64>() {
                Ok(0) => Err("must be greater than zero".to_string()),
                Ok(ms) => Ok(Duration::from_millis(ms)),
                Err(e) => Err(e.to_string()),
            },
        )?;

        let default_backend = if cfg!(feature = "redis") {
            CounterBackend::Redis
        } else {
            CounterBackend::Memory
        };

        Ok(Self {
            host: vars
                .raw("HOST")
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: vars.parsed("PORT", 8080)?,
            rate_limit,
            gatekeeper,
            store_timeout,
            counter_backend: vars.parsed("COUNTER_BACKEND", default_backend)?,
            #[cfg(feature = "redis")]
            redis: Self::redis_config(&vars)?,
        })
    }

    /// `REDIS_URL` wins; otherwise the URL is composed from
    /// `REDIS_ADDRESS`, `REDIS_PASSWORD` and `REDIS_DB`.
    #[cfg(feature = "redis")]
    fn redis_config(vars: &Vars<'_>) -> Result<RedisConfig, ConfigError> {
        let defaults = RedisConfig::default();

        let url = match vars.raw("REDIS_URL") {
            Some(url) => url,
            None => RedisConfig::url_from_parts(
                &vars
                    .raw("REDIS_ADDRESS")
                    .unwrap_or_else(|| "localhost:6379".to_string()),
                vars.raw("REDIS_PASSWORD").as_deref(),
                vars.parsed("REDIS_DB", 0)?,
            ),
        };

        Ok(RedisConfig {
            url,
            connect_timeout: Duration::from_secs(
                vars.parsed("REDIS_CONNECT_TIMEOUT_SECS", defaults.connect_timeout.as_secs())?,
            ),
            key_prefix: vars
                .raw("REDIS_KEY_PREFIX")
                .unwrap_or(defaults.key_prefix),
            fallback_to_memory: vars.flag("REDIS_FALLBACK_TO_MEMORY", false)?,
        })
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    /// Raw value, with unset and blank treated alike.
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed_with<T>(
        &self,
        key: &str,
        default: T,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<T, ConfigError> {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => parse(value.trim()).map_err(|reason| ConfigError::Invalid {
                key: key.to_string(),
                value,
                reason,
            }),
        }
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: ToString,
    {
        self.parsed_with(key, default, |v| v.parse().map_err(|e: T::Err| e.to_string()))
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        self.parsed_with(key, default, |v| match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(format!("{other:?} is not a boolean")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_load_full_config() {
        let config = load(&[
            ("DEFAULT_IP_MAX_REQ_PER_SEC", "5"),
            ("DEFAULT_TOKEN_MAX_REQ_PER_SEC", "10"),
            ("DEFAULT_IP_BLOCK_DURATION", "15s"),
            ("DEFAULT_TOKEN_BLOCK_DURATION", "30s"),
            ("CUSTOM_MAX_REQ_PER_SEC", "127.0.0.1=100;abc123=200"),
            ("CUSTOM_BLOCK_DURATION", "127.0.0.1=10s;abc123=20s"),
            ("PORT", "9090"),
            ("COUNTER_BACKEND", "memory"),
        ])
        .unwrap();

        let rl = &config.rate_limit;
        assert_eq!(rl.default_ip_max_requests, 5);
        assert_eq!(rl.default_token_max_requests, 10);
        assert_eq!(rl.default_ip_block_duration, Duration::from_secs(15));
        assert_eq!(rl.default_token_block_duration, Duration::from_secs(30));
        assert_eq!(
            rl.custom_max_requests,
            HashMap::from([("127.0.0.1".to_string(), 100), ("abc123".to_string(), 200)])
        );
        assert_eq!(
            rl.custom_block_durations,
            HashMap::from([
                ("127.0.0.1".to_string(), Duration::from_secs(10)),
                ("abc123".to_string(), Duration::from_secs(20)),
            ])
        );
        assert_eq!(config.port, 9090);
        assert_eq!(config.counter_backend, CounterBackend::Memory);
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert_eq!(config.store_timeout, DEFAULT_STORE_TIMEOUT);
        assert_eq!(config.gatekeeper.api_key_header.as_str(), "api_key");
        assert!(!config.gatekeeper.fail_open);
        assert!(!config.gatekeeper.trust_forwarded_headers);
    }

    #[test]
    fn test_malformed_default_fails_load() {
        let err = load(&[("DEFAULT_IP_BLOCK_DURATION", "soon")]).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_IP_BLOCK_DURATION"));

        assert!(load(&[("DEFAULT_TOKEN_MAX_REQ_PER_SEC", "0")]).is_err());
        assert!(load(&[("PORT", "http")]).is_err());
        assert!(load(&[("RATE_LIMIT_FAIL_OPEN", "maybe")]).is_err());
        assert!(load(&[("STORE_TIMEOUT_MS", "0")]).is_err());
    }

    #[test]
    fn test_malformed_override_value_fails_load() {
        let err = load(&[("CUSTOM_MAX_REQ_PER_SEC", "127.0.0.1=100;abc123=lots")]).unwrap_err();
        assert!(err.to_string().contains("CUSTOM_MAX_REQ_PER_SEC[abc123]"));
    }

    #[test]
    fn test_block_duration_above_redis_range_fails_load() {
        let err = load(&[("DEFAULT_IP_BLOCK_DURATION", "3000000000000000h")]).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_IP_BLOCK_DURATION"));

        let err = load(&[("CUSTOM_BLOCK_DURATION", "abc123=3000000000000000h")]).unwrap_err();
        assert!(err.to_string().contains("CUSTOM_BLOCK_DURATION[abc123]"));
    }

    #[test]
    fn test_gatekeeper_settings() {
        let config = load(&[
            ("API_KEY_HEADER", "X-Api-Key"),
            ("TRUST_FORWARDED_HEADERS", "true"),
            ("RATE_LIMIT_FAIL_OPEN", "1"),
            ("STORE_TIMEOUT_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.gatekeeper.api_key_header.as_str(), "x-api-key");
        assert!(config.gatekeeper.trust_forwarded_headers);
        assert!(config.gatekeeper.fail_open);
        assert_eq!(config.store_timeout, Duration::from_millis(250));

        assert!(load(&[("API_KEY_HEADER", "bad header")]).is_err());
    }

    #[test]
    fn test_unknown_backend_fails_load() {
        assert!(load(&[("COUNTER_BACKEND", "postgres")]).is_err());
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_url_composed_from_parts() {
        let config = load(&[
            ("REDIS_ADDRESS", "cache:6380"),
            ("REDIS_PASSWORD", "secret"),
            ("REDIS_DB", "3"),
            ("REDIS_KEY_PREFIX", "rl"),
        ])
        .unwrap();

        assert_eq!(config.counter_backend, CounterBackend::Redis);
        assert_eq!(config.redis.url, "redis://:secret@cache:6380/3");
        assert_eq!(config.redis.key_prefix, "rl");

        let config = load(&[
            ("REDIS_URL", "redis://elsewhere:6379"),
            ("REDIS_ADDRESS", "ignored:1"),
        ])
        .unwrap();
        assert_eq!(config.redis.url, "redis://elsewhere:6379");
    }
}
