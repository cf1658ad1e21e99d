//! Connection status types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tri-state liveness signal derived from heartbeat activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No channel activity or failure observed yet
    #[default]
    Unknown,
    /// Heartbeats are arriving
    Online,
    /// Channel failed, closed or stalled
    Offline,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }

    /// Whether moving from `self` to `next` is an observable transition.
    ///
    /// Equal statuses are no-ops and nothing ever returns to `Unknown`.
    pub fn can_transition_to(&self, next: ConnectionStatus) -> bool {
        *self != next && next != Self::Unknown
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single channel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Channel constructed, not opened yet
    Connecting,
    /// Opened, heartbeats expected
    Open,
    /// Destroyed or errored; a reconnect is pending
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Point-in-time view of the monitor, as handed to page-level consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub status: ConnectionStatus,
    pub is_online: bool,
    pub last_heartbeat_secs: Option<u64>,
    pub health_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Unknown);
    }

    #[test]
    fn test_allowed_transitions() {
        use ConnectionStatus::*;

        assert!(Unknown.can_transition_to(Online));
        assert!(Unknown.can_transition_to(Offline));
        assert!(Online.can_transition_to(Offline));
        assert!(Offline.can_transition_to(Online));

        assert!(!Online.can_transition_to(Online));
        assert!(!Offline.can_transition_to(Offline));
        assert!(!Online.can_transition_to(Unknown));
        assert!(!Offline.can_transition_to(Unknown));
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionStatus::Offline).unwrap();
        assert_eq!(json, "\"offline\"");

        let parsed: ConnectionStatus = serde_json::from_str("\"online\"").unwrap();
        assert_eq!(parsed, ConnectionStatus::Online);
    }
}
