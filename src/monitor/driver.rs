//! Channel driver
//!
//! One task owns the channel, the inactivity timer and the reconnect timer.
//! Channel events, timer expiries and commands are handled one at a time in a
//! single `select!` loop, so no two handlers ever overlap.
//!
//! ```text
//!             open ok                 Opened / Message
//!   ┌──────────────────► Connecting ─────────────────► Open ◄─┐
//!   │                        │                          │  │  │ Message
//!   │          open failed / │ Error / Closed           │  └──┘ (rearm timer)
//!   │                        ▼                          │
//!   └─── reconnect due ── Closed ◄──────────────────────┘ Closed
//! ```
//!
//! Inactivity expiry and `Error` only flip the status to offline; they leave
//! the channel state alone. The transport follows an error with a close.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use super::channel::{Channel, ChannelEvent, Connector};
use super::policy::ReconnectPolicy;
use super::state::SharedState;
use crate::domain::{ChannelState, ConnectionStatus};
use crate::notifications::{
    ChannelClosedEvent, ChannelOpenedEvent, Event, ReconnectScheduledEvent,
};

pub(crate) enum Command {
    /// Stop the driver; the sender is answered once the channel is dropped
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct Driver {
    url: String,
    connector: Arc<dyn Connector>,
    shared: Arc<SharedState>,
    heartbeat_timeout: Duration,
    policy: ReconnectPolicy,
    channel: Option<Channel>,
    inactivity_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,
    attempts: u64,
}

impl Driver {
    pub(crate) fn new(
        url: String,
        connector: Arc<dyn Connector>,
        shared: Arc<SharedState>,
        heartbeat_timeout: Duration,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            url,
            connector,
            shared,
            heartbeat_timeout,
            policy,
            channel: None,
            inactivity_deadline: None,
            reconnect_deadline: None,
            attempts: 0,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(
            "Health monitor started for {} (heartbeat timeout: {:?}, reconnect delay: {:?})",
            self.url, self.heartbeat_timeout, self.policy.delay
        );

        self.connect();

        let ack = loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => break Some(ack),
                    None => break None,
                },
                event = next_event(&mut self.channel) => self.handle_event(event),
                _ = wait_until(self.inactivity_deadline) => self.on_heartbeat_timeout(),
                _ = wait_until(self.reconnect_deadline) => self.on_reconnect_due(),
            }
        };

        self.channel = None;
        self.inactivity_deadline = None;
        self.reconnect_deadline = None;
        self.set_state(ChannelState::Closed);
        info!("Health monitor stopped");

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn set_state(&self, state: ChannelState) {
        self.shared.set_channel_state(state);
    }

    fn connect(&mut self) {
        if self.channel.is_some() {
            return;
        }
        if !self.policy.should_retry(self.attempts + 1) {
            return;
        }

        self.attempts += 1;
        self.set_state(ChannelState::Connecting);
        metrics::counter!("health_monitor_connect_attempts_total").increment(1);
        debug!("Opening heartbeat channel to {} (attempt {})", self.url, self.attempts);

        match self.connector.open(&self.url) {
            Ok(channel) => self.channel = Some(channel),
            Err(e) => {
                warn!("Could not construct heartbeat channel: {}", e);
                self.on_closed(Some(e.to_string()));
            }
        }
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                debug!("Heartbeat channel open: {}", self.url);
                self.set_state(ChannelState::Open);
                self.shared.event_bus.publish(Event::ChannelOpened(ChannelOpenedEvent {
                    url: self.url.clone(),
                    attempt: self.attempts,
                }));
                self.on_activity();
            }
            ChannelEvent::Message => {
                self.set_state(ChannelState::Open);
                self.on_activity();
            }
            ChannelEvent::Error(reason) => {
                warn!("Heartbeat channel error: {}", reason);
                self.shared.set_status(ConnectionStatus::Offline);
            }
            ChannelEvent::Closed { reason } => self.on_closed(reason),
        }
    }

    fn on_activity(&mut self) {
        let now = Instant::now();
        self.shared.touch(now);
        self.shared.set_status(ConnectionStatus::Online);
        self.inactivity_deadline = Some(now + self.heartbeat_timeout);
    }

    fn on_heartbeat_timeout(&mut self) {
        self.inactivity_deadline = None;
        warn!(
            "No heartbeat from {} within {:?}, marking backend offline",
            self.url, self.heartbeat_timeout
        );
        self.shared.set_status(ConnectionStatus::Offline);
    }

    fn on_closed(&mut self, reason: Option<String>) {
        self.shared.set_status(ConnectionStatus::Offline);
        self.channel = None;
        self.inactivity_deadline = None;
        self.set_state(ChannelState::Closed);

        debug!("Heartbeat channel closed: {:?}", reason);
        self.shared.event_bus.publish(Event::ChannelClosed(ChannelClosedEvent {
            url: self.url.clone(),
            reason,
        }));

        if self.reconnect_deadline.is_none() {
            let delay = self.policy.delay_for(self.attempts + 1);
            self.reconnect_deadline = Some(Instant::now() + delay);
            metrics::counter!("health_monitor_reconnects_scheduled_total").increment(1);
            self.shared
                .event_bus
                .publish(Event::ReconnectScheduled(ReconnectScheduledEvent {
                    delay_ms: delay.as_millis() as u64,
                    attempt: self.attempts + 1,
                }));
        }
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect_deadline = None;
        self.connect();
    }
}

async fn next_event(channel: &mut Option<Channel>) -> ChannelEvent {
    match channel {
        Some(channel) => channel.next_event().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
