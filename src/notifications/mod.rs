//! Notifications module
//!
//! Tagged events published by the health monitor over a broadcast bus.
//! Consumers that only care about the current status can use the
//! monitor's callbacks or watch channel instead.
//!
//! # Usage
//! ```ignore
//! let mut events = monitor.events();
//! while let Some(msg) = events.recv().await {
//!     if let Some((previous, current)) = msg.event.status_change() {
//!         println!("{} -> {}", previous, current);
//!     }
//! }
//! ```

pub mod event_bus;
pub mod events;

pub use event_bus::{create_event_bus, EventBus, EventSubscriber, SharedEventBus};
pub use events::*;
