//! HTTP endpoints for state-relay.
//!
//! Provides the state WebSocket, health checks, and metrics.

pub mod health;
mod metrics;

use crate::server::StateRelay;
use crate::session;
use axum::{
    extract::WebSocketUpgrade,
    response::Response,
    routing::get,
    Extension, Router,
};
use std::sync::Arc;

pub use health::HealthStatus;

/// Path of the state WebSocket.
pub const STATE_PATH: &str = "/api/state";

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<StateRelay>) -> Router {
    Router::new()
        .route(STATE_PATH, get(state_socket_handler))
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(Extension(relay))
}

/// Upgrade to WebSocket and run a session.
async fn state_socket_handler(
    ws: WebSocketUpgrade,
    Extension(relay): Extension<Arc<StateRelay>>,
) -> Response {
    ws.on_upgrade(move |socket| session::run(socket, relay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_relay() -> Arc<StateRelay> {
        Arc::new(StateRelay::new(Config::default()))
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = build_router(test_relay());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let app = build_router(test_relay());

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn state_endpoint_requires_upgrade() {
        let app = build_router(test_relay());

        let response = app
            .oneshot(Request::builder().uri(STATE_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let app = build_router(test_relay());

        let response = app
            .oneshot(Request::builder().uri("/api/other").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
