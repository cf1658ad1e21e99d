//! Heartbeat server router

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_check, prometheus_metrics, ws_health_handler, HealthState, HeartbeatState,
    MetricsState,
};
use super::middleware::{
    http_metrics_middleware, request_id_middleware, security_headers_middleware,
};
use crate::config::HEALTH_WS_PATH;
use crate::support::shutdown::ShutdownSignal;

pub struct RouterOptions {
    pub heartbeat_interval: Duration,
    pub shutdown: ShutdownSignal,
    /// Shared count of open heartbeat sessions
    pub heartbeat_clients: Arc<AtomicUsize>,
    /// Mounts `/metrics` when present
    pub prometheus: Option<PrometheusHandle>,
}

impl RouterOptions {
    pub fn new(heartbeat_interval: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            heartbeat_interval,
            shutdown,
            heartbeat_clients: Arc::new(AtomicUsize::new(0)),
            prometheus: None,
        }
    }
}

pub fn create_router(opts: RouterOptions) -> Router {
    let health_state = HealthState::new(opts.heartbeat_clients.clone());
    let health_routes = Router::new()
        .route("/api/v1/health", get(health_check))
        // Older clients
        .route("/api/health", get(health_check))
        .with_state(health_state);

    let heartbeat_routes = Router::new()
        .route(HEALTH_WS_PATH, get(ws_health_handler))
        .with_state(HeartbeatState {
            interval: opts.heartbeat_interval,
            clients: opts.heartbeat_clients,
            shutdown: opts.shutdown,
        });

    let mut router = Router::new().merge(health_routes).merge(heartbeat_routes);

    if let Some(handle) = opts.prometheus {
        router = router.merge(
            Router::new()
                .route("/metrics", get(prometheus_metrics))
                .with_state(MetricsState { handle }),
        );
    }

    router
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}
