//! View gate
//!
//! Decides what the page layer renders from the monitor's status changes.
//! When the backend comes back after an outage, a short "connection
//! restored" view is shown before the main application remounts.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::domain::ConnectionStatus;
use crate::monitor::HealthMonitor;
use crate::support::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppView {
    /// Status not known yet; render nothing
    Pending,
    /// Full-screen unavailability notice, navigation suppressed
    Unavailable,
    /// Transient confirmation after an offline -> online transition
    Restored,
    /// Normal application
    Main,
}

#[derive(Debug, Clone)]
pub struct ViewGate {
    previous: ConnectionStatus,
    view: AppView,
    restored_for: Duration,
}

impl ViewGate {
    pub fn new(initial: ConnectionStatus, restored_for: Duration) -> Self {
        let view = match initial {
            ConnectionStatus::Unknown => AppView::Pending,
            ConnectionStatus::Offline => AppView::Unavailable,
            ConnectionStatus::Online => AppView::Main,
        };
        Self {
            previous: initial,
            view,
            restored_for,
        }
    }

    pub fn view(&self) -> AppView {
        self.view
    }

    pub fn restored_for(&self) -> Duration {
        self.restored_for
    }

    /// Feed a status. Returns the view to render now.
    pub fn apply(&mut self, status: ConnectionStatus) -> AppView {
        self.view = match status {
            ConnectionStatus::Unknown => AppView::Pending,
            ConnectionStatus::Offline => AppView::Unavailable,
            ConnectionStatus::Online if self.previous == ConnectionStatus::Offline => {
                AppView::Restored
            }
            ConnectionStatus::Online if self.view == AppView::Restored => AppView::Restored,
            ConnectionStatus::Online => AppView::Main,
        };
        self.previous = status;
        self.view
    }

    /// The restored window has elapsed.
    pub fn settle(&mut self) -> AppView {
        if self.view == AppView::Restored {
            self.view = AppView::Main;
        }
        self.view
    }
}

/// Drive a [`ViewGate`] from `monitor`'s events until `shutdown` fires.
///
/// Uses the event bus rather than the watch channel so that a quick
/// offline/online flap is not coalesced away.
pub fn spawn_view_gate(
    monitor: &HealthMonitor,
    restored_for: Duration,
    shutdown: ShutdownSignal,
) -> watch::Receiver<AppView> {
    let mut events = monitor.events();
    let status = monitor.watch();
    let mut gate = ViewGate::new(monitor.status(), restored_for);
    let (tx, rx) = watch::channel(gate.view());

    tokio::spawn(async move {
        let mut settle_at: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = shutdown.notified().wait() => break,
                message = events.recv_or_lagged() => {
                    let current = match message {
                        None => break,
                        Some(Ok(message)) => match message.event.status_change() {
                            Some((_, current)) => current,
                            None => continue,
                        },
                        // Missed transitions; catch up with the live status
                        Some(Err(_)) => *status.borrow(),
                    };
                    let before = gate.view();
                    let view = gate.apply(current);
                    settle_at = match view {
                        AppView::Restored if before != AppView::Restored => {
                            Some(Instant::now() + gate.restored_for())
                        }
                        AppView::Restored => settle_at,
                        _ => None,
                    };
                    debug!("View gate: {:?} -> {:?}", before, view);
                    tx.send_replace(view);
                }
                _ = wait_until(settle_at) => {
                    settle_at = None;
                    tx.send_replace(gate.settle());
                }
            }
        }
    });

    rx
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
