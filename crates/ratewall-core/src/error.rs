//! Error types surfaced by the decision engine.

use std::time::Duration;

use thiserror::Error;

/// Counter store failures.
///
/// Every variant is terminal for the request being evaluated. When an
/// increment fails the caller must not assume it did or did not happen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    #[error("Counter store protocol error: {0}")]
    Protocol(String),

    #[error("Counter store call exceeded its {0:?} deadline")]
    Timeout(Duration),
}
