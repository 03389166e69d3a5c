//! Prometheus metrics endpoint.

use crate::server::StateRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
pub async fn metrics_handler(Extension(relay): Extension<Arc<StateRelay>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&relay),
    )
}

fn render(relay: &StateRelay) -> String {
    let m = relay.metrics();

    // Gauges
    let connections = relay.active_sessions();
    let state_set = u8::from(relay.current_state().is_set());

    // Counters, monotonic since startup
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let sets = m.sets_total.load(Ordering::Relaxed);
    let gets = m.gets_total.load(Ordering::Relaxed);
    let pings = m.pings_total.load(Ordering::Relaxed);
    let pongs = m.pongs_total.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    format!(
        r#"# HELP state_relay_connections_active Number of open state sessions
# TYPE state_relay_connections_active gauge
state_relay_connections_active {connections}

# HELP state_relay_state_set Whether the state has been set since startup
# TYPE state_relay_state_set gauge
state_relay_state_set {state_set}

# HELP state_relay_info Server information
# TYPE state_relay_info gauge
state_relay_info{{version="{version}"}} 1

# HELP state_relay_connections_total Total sessions accepted
# TYPE state_relay_connections_total counter
state_relay_connections_total {conns_total}

# HELP state_relay_sets_total Total Set requests applied
# TYPE state_relay_sets_total counter
state_relay_sets_total {sets}

# HELP state_relay_gets_total Total Get requests answered
# TYPE state_relay_gets_total counter
state_relay_gets_total {gets}

# HELP state_relay_pings_total Total client pings answered
# TYPE state_relay_pings_total counter
state_relay_pings_total {pings}

# HELP state_relay_pongs_total Total pongs received
# TYPE state_relay_pongs_total counter
state_relay_pongs_total {pongs}

# HELP state_relay_errors_total Total protocol errors
# TYPE state_relay_errors_total counter
state_relay_errors_total {errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}
