//! # Ratewall Infrastructure
//!
//! Concrete implementations of the ports defined in `ratewall-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis-backed counter store

pub mod counter;

// Re-exports - In-Memory
pub use counter::InMemoryCounterStore;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use counter::{RedisConfig, RedisCounterStore};
