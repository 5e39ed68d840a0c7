//! Rate limit policy configuration and resolution.

use std::collections::HashMap;
use std::time::Duration;

use crate::identifier::{IdentifierKind, classify};

/// Process-wide rate limit policy, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window for IP identifiers.
    pub default_ip_max_requests: u64,
    /// Requests allowed per window for token identifiers.
    pub default_token_max_requests: u64,
    /// Window length for IP identifiers.
    pub default_ip_block_duration: Duration,
    /// Window length for token identifiers.
    pub default_token_block_duration: Duration,
    /// Per-identifier request limits. These win over both defaults.
    pub custom_max_requests: HashMap<String, u64>,
    /// Per-identifier window lengths. These win over both defaults.
    pub custom_block_durations: HashMap<String, Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_ip_max_requests: 10,
            default_token_max_requests: 100,
            default_ip_block_duration: Duration::from_secs(1),
            default_token_block_duration: Duration::from_secs(1),
            custom_max_requests: HashMap::new(),
            custom_block_durations: HashMap::new(),
        }
    }
}

/// The effective limit for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub max_requests: u64,
    pub block_duration: Duration,
}

impl RateLimitConfig {
    /// Resolve the effective policy for `identifier`.
    ///
    /// Each dimension is resolved on its own: an override for the limit does
    /// not imply an override for the block duration. Unknown identifiers fall
    /// back to the default for their classification.
    pub fn resolve(&self, identifier: &str) -> Policy {
        Policy {
            max_requests: self.max_requests_for(identifier),
            block_duration: self.block_duration_for(identifier),
        }
    }

    fn max_requests_for(&self, identifier: &str) -> u64 {
        if let Some(max) = self.custom_max_requests.get(identifier) {
            return *max;
        }

        match classify(identifier) {
            IdentifierKind::Token => self.default_token_max_requests,
            IdentifierKind::IpAddress => self.default_ip_max_requests,
        }
    }

    fn block_duration_for(&self, identifier: &str) -> Duration {
        if let Some(duration) = self.custom_block_durations.get(identifier) {
            return *duration;
        }

        match classify(identifier) {
            IdentifierKind::Token => self.default_token_block_duration,
            IdentifierKind::IpAddress => self.default_ip_block_duration,
        }
    }
}
