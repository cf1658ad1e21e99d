//! Monitor events
//!
//! Tagged messages describing what the health monitor observed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ConnectionStatus;

/// Event types published by the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Shared status changed
    StatusChanged(StatusChangedEvent),
    /// Heartbeat channel opened
    ChannelOpened(ChannelOpenedEvent),
    /// Heartbeat channel closed or failed to construct
    ChannelClosed(ChannelClosedEvent),
    /// Reconnect timer armed
    ReconnectScheduled(ReconnectScheduledEvent),
}

impl Event {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::StatusChanged(_) => "status_changed",
            Event::ChannelOpened(_) => "channel_opened",
            Event::ChannelClosed(_) => "channel_closed",
            Event::ReconnectScheduled(_) => "reconnect_scheduled",
        }
    }

    /// The status transition carried by this event, if any
    pub fn status_change(&self) -> Option<(ConnectionStatus, ConnectionStatus)> {
        match self {
            Event::StatusChanged(e) => Some((e.previous, e.current)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub previous: ConnectionStatus,
    pub current: ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOpenedEvent {
    pub url: String,
    /// 1-based connection attempt counter
    pub attempt: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelClosedEvent {
    pub url: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectScheduledEvent {
    pub delay_ms: u64,
    /// Attempt number the reconnect will make
    pub attempt: u64,
}

/// Event envelope with id and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
