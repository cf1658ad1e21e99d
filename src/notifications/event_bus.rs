//! Event Bus for broadcasting monitor events to subscribers
//!
//! Uses tokio broadcast channel for pub/sub pattern.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::broadcast;

use super::events::{Event, EventMessage};

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 256;

/// Event bus for broadcasting events to all subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: Event) {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();

        match self.sender.send(message) {
            Ok(count) => debug!("Event published: type={}, subscribers={}", event_type, count),
            // Nobody listening is the normal case for a headless monitor
            Err(_) => debug!("Event published (no subscribers): type={}", event_type),
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        let receiver = self.sender.subscribe();
        let count = self.subscriber_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("New event subscriber, total: {}", count);

        EventSubscriber {
            receiver,
            subscriber_count: self.subscriber_count.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event subscriber that receives events from the bus
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventSubscriber {
    /// Receive the next event, skipping over any the subscriber lagged behind on.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.recv_or_lagged().await? {
                Ok(msg) => return Some(msg),
                Err(_) => continue,
            }
        }
    }

    /// Like [`recv`](Self::recv), but reports a lag as `Err(missed)` so the
    /// caller can resynchronise from current state.
    pub async fn recv_or_lagged(&mut self) -> Option<Result<EventMessage, u64>> {
        match self.receiver.recv().await {
            Ok(msg) => Some(Ok(msg)),
            Err(broadcast::error::RecvError::Lagged(count)) => {
                warn!("Subscriber lagged, {} events missed", count);
                Some(Err(count))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        let prev = self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        debug!("Event subscriber dropped, remaining: {}", prev.saturating_sub(1));
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConnectionStatus;
    use crate::notifications::events::StatusChangedEvent;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new();
        let mut subscriber = bus.subscribe();

        bus.publish(Event::StatusChanged(StatusChangedEvent {
            previous: ConnectionStatus::Unknown,
            current: ConnectionStatus::Online,
        }));

        let received = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            subscriber.recv(),
        )
        .await
        .expect("Timeout")
        .expect("No message");

        assert_eq!(received.event.event_type(), "status_changed");
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_receiving() {
        let bus = EventBus::with_capacity(2);
        let mut subscriber = bus.subscribe();

        for _ in 0..5 {
            bus.publish(Event::StatusChanged(StatusChangedEvent {
                previous: ConnectionStatus::Online,
                current: ConnectionStatus::Offline,
            }));
        }

        assert!(subscriber.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_lag_is_reported_once() {
        let bus = EventBus::with_capacity(2);
        let mut subscriber = bus.subscribe();

        for _ in 0..5 {
            bus.publish(Event::StatusChanged(StatusChangedEvent {
                previous: ConnectionStatus::Online,
                current: ConnectionStatus::Offline,
            }));
        }

        assert_eq!(subscriber.recv_or_lagged().await.unwrap().unwrap_err(), 3);
        assert!(subscriber.recv_or_lagged().await.unwrap().is_ok());
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        let sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(sub1);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
