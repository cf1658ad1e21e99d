//! State shared between the driver (single writer) and any number of readers.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use tokio::sync::watch;
use tokio::time::Instant;

use super::registry::ObserverRegistry;
use crate::domain::{ChannelState, ConnectionStatus};
use crate::notifications::{Event, SharedEventBus, StatusChangedEvent};

/// Sentinel for "no heartbeat recorded yet"
const NO_HEARTBEAT: u64 = 0;

pub(crate) struct SharedState {
    status: watch::Sender<ConnectionStatus>,
    /// Microseconds since `epoch` of the last heartbeat, offset by one so that
    /// zero can mean "never"
    last_heartbeat: AtomicU64,
    epoch: Instant,
    epoch_wall: DateTime<Utc>,
    channel_state: AtomicU8,
    pub(crate) observers: Arc<ObserverRegistry>,
    pub(crate) event_bus: SharedEventBus,
}

impl SharedState {
    pub(crate) fn new(event_bus: SharedEventBus) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Unknown);
        Self {
            status,
            last_heartbeat: AtomicU64::new(NO_HEARTBEAT),
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
            channel_state: AtomicU8::new(encode_state(ChannelState::Closed)),
            observers: ObserverRegistry::shared(),
            event_bus,
        }
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Store `next` and notify observers, unless nothing changes.
    ///
    /// Called by the driver, or by `initialize` before any driver exists,
    /// so there is never more than one writer.
    pub(crate) fn set_status(&self, next: ConnectionStatus) -> bool {
        let mut previous = None;
        self.status.send_if_modified(|current| {
            if !current.can_transition_to(next) {
                return false;
            }
            previous = Some(*current);
            *current = next;
            true
        });

        let Some(previous) = previous else {
            return false;
        };

        info!("Backend status changed: {} -> {}", previous, next);
        metrics::counter!("health_monitor_status_transitions_total", "status" => next.as_str())
            .increment(1);
        metrics::gauge!("health_monitor_online").set(if next.is_online() { 1.0 } else { 0.0 });

        self.observers.notify(next);
        self.event_bus.publish(Event::StatusChanged(StatusChangedEvent {
            previous,
            current: next,
        }));
        true
    }

    pub(crate) fn channel_state(&self) -> ChannelState {
        decode_state(self.channel_state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_channel_state(&self, state: ChannelState) {
        self.channel_state.store(encode_state(state), Ordering::SeqCst);
    }

    /// Record channel activity at `now`. Never moves the timestamp backwards.
    pub(crate) fn touch(&self, now: Instant) {
        let micros = now.saturating_duration_since(self.epoch).as_micros() as u64 + 1;
        self.last_heartbeat.fetch_max(micros, Ordering::SeqCst);
    }

    fn last_heartbeat_offset(&self) -> Option<std::time::Duration> {
        match self.last_heartbeat.load(Ordering::SeqCst) {
            NO_HEARTBEAT => None,
            micros => Some(std::time::Duration::from_micros(micros - 1)),
        }
    }

    pub(crate) fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        let offset = self.last_heartbeat_offset()?;
        chrono::Duration::from_std(offset)
            .ok()
            .map(|d| self.epoch_wall + d)
    }

    /// Whole seconds since the last heartbeat, rounded to nearest.
    pub(crate) fn last_heartbeat_age(&self, now: Instant) -> Option<u64> {
        let at = self.epoch + self.last_heartbeat_offset()?;
        let millis = now.saturating_duration_since(at).as_millis() as u64;
        Some((millis + 500) / 1000)
    }
}

fn encode_state(state: ChannelState) -> u8 {
    match state {
        ChannelState::Connecting => 0,
        ChannelState::Open => 1,
        ChannelState::Closed => 2,
    }
}

fn decode_state(raw: u8) -> ChannelState {
    match raw {
        0 => ChannelState::Connecting,
        1 => ChannelState::Open,
        _ => ChannelState::Closed,
    }
}
