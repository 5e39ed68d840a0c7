//! Data Transfer Objects - response bodies for the API.

use serde::{Deserialize, Serialize};

/// Health check body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Which counter store backs the limiter (`redis` or `memory`).
    pub counter_backend: String,
    pub timestamp: String,
}
