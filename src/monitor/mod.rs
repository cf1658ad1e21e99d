//! Connection health monitor
//!
//! - **service**: [`HealthMonitor`], the public face
//! - **driver**: task owning the channel and both timers (state machine)
//! - **channel**: transport abstraction and the WebSocket connector
//! - **registry**: status-change callbacks and their handles
//! - **policy**: fixed-delay, never-give-up reconnect policy

pub mod channel;
mod driver;
pub mod policy;
pub mod registry;
pub mod service;
mod state;

pub use channel::{Channel, ChannelEvent, Connector, WsConnector};
pub use policy::ReconnectPolicy;
pub use registry::{ObserverRegistry, StatusCallback, Subscription};
pub use service::{HealthMonitor, SharedHealthMonitor};
