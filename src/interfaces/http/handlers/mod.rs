//! HTTP and WebSocket handlers of the heartbeat server

pub mod health;
pub mod heartbeat;
pub mod metrics;

pub use health::{health_check, HealthState};
pub use heartbeat::{ws_health_handler, HeartbeatState, HEARTBEAT_PAYLOAD};
pub use metrics::{prometheus_metrics, MetricsState};
