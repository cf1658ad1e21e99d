//! # Backend Health
//!
//! Connection health monitor for a backend that streams heartbeats over a
//! WebSocket, plus the heartbeat server side of that contract.
//!
//! ## Layout
//!
//! - **monitor**: the [`HealthMonitor`] service, its channel driver and timers
//! - **gate**: maps status transitions to the view the application shows
//! - **notifications**: tagged events published on a broadcast bus
//! - **domain**: status types and errors
//! - **config**: TOML configuration with env overrides
//! - **interfaces** / **server**: the `/ws/health` heartbeat server
//! - **support**: graceful shutdown
//!
//! ```rust,no_run
//! use backend_health::{AppConfig, ConnectionStatus, HealthMonitor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let monitor = HealthMonitor::from_config(&config).shared();
//!     let _sub = monitor.subscribe(|status: ConnectionStatus| println!("backend is {}", status));
//!     monitor.initialize();
//! }
//! ```

pub mod config;
pub mod domain;
pub mod gate;
pub mod interfaces;
pub mod monitor;
pub mod notifications;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig};

pub use domain::{ChannelError, ChannelState, ConfigError, ConnectionStatus, HealthSnapshot, ServerError};

pub use monitor::{Connector, HealthMonitor, SharedHealthMonitor, Subscription, WsConnector};

pub use gate::{spawn_view_gate, AppView, ViewGate};

pub use notifications::{create_event_bus, Event, EventBus, SharedEventBus};

pub use server::{init_tracing, ServerHandle, ServerOptions};
