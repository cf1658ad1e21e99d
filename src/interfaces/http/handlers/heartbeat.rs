//! Heartbeat WebSocket
//!
//! Every client connected to `/ws/health` gets `{"status":"online"}` right
//! away and then once per interval. Clients treat a close as an outage and
//! a missing frame as a silent one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::select;
use tracing::{debug, info, warn};

use crate::support::shutdown::ShutdownSignal;

/// Payload of every heartbeat frame
pub const HEARTBEAT_PAYLOAD: &str = r#"{"status":"online"}"#;

/// Close code sent when the server goes away
const CLOSE_GOING_AWAY: u16 = 1001;

#[derive(Clone)]
pub struct HeartbeatState {
    pub interval: Duration,
    pub clients: Arc<AtomicUsize>,
    pub shutdown: ShutdownSignal,
}

/// Decrements the client gauge however the session ends
struct ClientGuard(Arc<AtomicUsize>);

impl ClientGuard {
    fn register(clients: Arc<AtomicUsize>) -> Self {
        let count = clients.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("heartbeat_clients").set(count as f64);
        Self(clients)
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let count = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("heartbeat_clients").set(count as f64);
    }
}

/// `GET /ws/health`
pub async fn ws_health_handler(
    ws: WebSocketUpgrade,
    State(state): State<HeartbeatState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_heartbeat_socket(socket, state))
}

async fn handle_heartbeat_socket(socket: WebSocket, state: HeartbeatState) {
    let _guard = ClientGuard::register(state.clients.clone());
    let (mut sender, mut receiver) = socket.split();
    let mut ticker = tokio::time::interval(state.interval);

    debug!("Heartbeat client connected");

    loop {
        select! {
            _ = ticker.tick() => {
                if let Err(e) = sender.send(Message::Text(HEARTBEAT_PAYLOAD.into())).await {
                    debug!("Heartbeat send failed, dropping client: {}", e);
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("Heartbeat socket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            _ = state.shutdown.notified().wait() => {
                info!("Closing heartbeat client for shutdown");
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_GOING_AWAY,
                        reason: "server shutting down".into(),
                    })))
                    .await;
                break;
            }
        }
    }

    debug!("Heartbeat client disconnected");
}
