//! Health Monitor Service
//!
//! Owns one heartbeat channel to the backend and derives the shared
//! online/offline status from its activity. Consumers read the status,
//! subscribe to changes, or listen for tagged events; none of them touch
//! the channel or the timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};

use super::channel::{Connector, WsConnector};
use super::driver::{Command, Driver};
use super::policy::ReconnectPolicy;
use super::registry::{StatusCallback, Subscription};
use super::state::SharedState;
use crate::config::{AppConfig, MonitorConfig};
use crate::domain::{ChannelState, ConnectionStatus, HealthSnapshot};
use crate::notifications::{create_event_bus, EventSubscriber, SharedEventBus};

/// Connection health monitor.
///
/// Create one per backend, share it as [`SharedHealthMonitor`], and call
/// [`initialize`](Self::initialize) from inside a Tokio runtime.
pub struct HealthMonitor {
    health_url: String,
    heartbeat_timeout: Duration,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    shared: Arc<SharedState>,
    initialized: AtomicBool,
    commands: OnceLock<mpsc::UnboundedSender<Command>>,
}

pub type SharedHealthMonitor = Arc<HealthMonitor>;

impl HealthMonitor {
    pub fn new(health_url: impl Into<String>, config: &MonitorConfig) -> Self {
        Self {
            health_url: health_url.into(),
            heartbeat_timeout: config.heartbeat_timeout(),
            policy: ReconnectPolicy::fixed(config.reconnect_delay()),
            connector: Arc::new(WsConnector::new(config.heartbeat_timeout())),
            shared: Arc::new(SharedState::new(create_event_bus())),
            initialized: AtomicBool::new(false),
            commands: OnceLock::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.backend.health_ws_url(), &config.monitor)
    }

    /// Replace the transport. Must happen before [`initialize`](Self::initialize).
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_event_bus(mut self, event_bus: SharedEventBus) -> Self {
        self.shared = Arc::new(SharedState::new(event_bus));
        self
    }

    pub fn shared(self) -> SharedHealthMonitor {
        Arc::new(self)
    }

    /// Start monitoring. The first call opens the channel; later calls do nothing.
    ///
    /// Never fails. Without a Tokio runtime the backend is reported offline
    /// and the monitor stays uninitialized, so a later call can retry.
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("Cannot start health monitor outside a Tokio runtime: {}", e);
                self.shared.set_status(ConnectionStatus::Offline);
                self.initialized.store(false, Ordering::SeqCst);
                return;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // The `initialized` latch lets exactly one caller reach this point
        if self.commands.set(tx).is_err() {
            return;
        }

        let driver = Driver::new(
            self.health_url.clone(),
            self.connector.clone(),
            self.shared.clone(),
            self.heartbeat_timeout,
            self.policy,
        );
        runtime.spawn(driver.run(rx));
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Register `callback` for every status transition.
    ///
    /// Does not start monitoring. Keep the returned handle alive for as long
    /// as notifications are wanted.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let callback: StatusCallback = Arc::new(callback);
        self.shared.observers.register(callback)
    }

    /// Current shared status
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// Seconds since the last heartbeat, or `None` before the first one
    pub fn last_heartbeat_age(&self) -> Option<u64> {
        self.shared.last_heartbeat_age(tokio::time::Instant::now())
    }

    pub fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        self.shared.last_heartbeat_at()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.shared.channel_state()
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let status = self.status();
        HealthSnapshot {
            status,
            is_online: status.is_online(),
            last_heartbeat_secs: self.last_heartbeat_age(),
            health_url: self.health_url.clone(),
        }
    }

    /// Status as a watch channel. Intermediate values may be coalesced;
    /// use [`events`](Self::events) to see every transition.
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.watch()
    }

    /// Tagged monitor events
    pub fn events(&self) -> EventSubscriber {
        self.shared.event_bus.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.observers.len()
    }

    /// Stop the driver, drop the channel and cancel both timers.
    ///
    /// Final: a stopped monitor is not restarted by `initialize`.
    pub async fn shutdown(&self) {
        self.initialized.store(true, Ordering::SeqCst);
        let Some(commands) = self.commands.get() else {
            return;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if commands.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        info!("Health monitor for {} shut down", self.health_url);
    }
}
