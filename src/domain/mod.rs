//! Domain types shared by the monitor, its consumers and the heartbeat server

pub mod error;
pub mod status;

pub use error::{ChannelError, ConfigError, ServerError};
pub use status::{ChannelState, ConnectionStatus, HealthSnapshot};
