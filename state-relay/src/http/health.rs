//! Health check endpoint.

use crate::server::StateRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Number of open state sessions.
    pub connections: usize,
    /// Number of Set requests applied since startup.
    pub sets: u64,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// Snapshot the relay's health.
    pub fn of(relay: &StateRelay) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connections: relay.active_sessions(),
            sets: relay.metrics().sets_total.load(Ordering::Relaxed),
            uptime_seconds: relay.uptime().as_secs(),
        }
    }
}

/// Health check handler.
pub async fn health_handler(Extension(relay): Extension<Arc<StateRelay>>) -> Json<HealthStatus> {
    Json(HealthStatus::of(&relay))
}
