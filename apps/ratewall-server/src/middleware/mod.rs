//! Middleware modules.

pub mod rate_limit;

pub use rate_limit::{GatekeeperConfig, RateLimitMiddleware};
