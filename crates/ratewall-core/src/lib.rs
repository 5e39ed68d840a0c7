//! # Ratewall Core
//!
//! The decision layer of the Ratewall rate limiter.
//! This crate contains the fixed-window decision logic and the ports that
//! counter-store backends must implement. It owns no network code.

pub mod engine;
pub mod error;
pub mod identifier;
pub mod policy;
pub mod ports;

pub use engine::{Decision, DecisionEngine, Verdict};
pub use error::StoreError;
pub use identifier::{IdentifierKind, classify};
pub use policy::{Policy, RateLimitConfig};
