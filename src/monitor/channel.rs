//! Heartbeat channel transport
//!
//! A [`Connector`] constructs a [`Channel`]: an ordered stream of lifecycle
//! events backed by a background task. Dropping the channel aborts the task
//! and with it the underlying socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::domain::ChannelError;

/// Lifecycle events of one channel, in transport order:
/// `Opened`, then any number of `Message`, then `Error` and/or `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    /// Inbound data frame; the body is not inspected
    Message,
    Error(String),
    Closed { reason: Option<String> },
}

pub struct Channel {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    task: Option<JoinHandle<()>>,
}

impl Channel {
    pub fn new(events: mpsc::UnboundedReceiver<ChannelEvent>) -> Self {
        Self { events, task: None }
    }

    /// Tie a background task to this channel's lifetime
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Next event. A producer that went away counts as a close.
    pub async fn next_event(&mut self) -> ChannelEvent {
        self.events
            .recv()
            .await
            .unwrap_or(ChannelEvent::Closed { reason: None })
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Constructs heartbeat channels.
///
/// `open` is channel construction: an `Err` means no channel exists at all
/// (bad URL, no runtime). Failures after construction arrive as events.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str) -> Result<Channel, ChannelError>;
}

/// Default bound on the TCP connect plus WebSocket handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(6);

/// WebSocket connector on tokio-tungstenite
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// A connect that has not completed within `connect_timeout` is
    /// reported as an error followed by a close.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &str) -> Result<Channel, ChannelError> {
        let request = url
            .into_client_request()
            .map_err(|e| ChannelError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        match request.uri().scheme_str() {
            Some("ws") | Some("wss") => {}
            other => {
                return Err(ChannelError::InvalidUrl {
                    url: url.to_string(),
                    reason: format!("unsupported scheme {:?}", other.unwrap_or("")),
                })
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let target = url.to_string();
        let connect_timeout = self.connect_timeout;
        let task = runtime.spawn(async move {
            run_socket(target, request, connect_timeout, tx).await;
        });

        Ok(Channel::new(rx).with_task(task))
    }
}

async fn run_socket(
    url: String,
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    connect_timeout: Duration,
    tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    let connected =
        tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(request)).await;
    let outcome = match connected {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connect timed out after {:?}", connect_timeout)),
    };
    let stream = match outcome {
        Ok(stream) => stream,
        Err(reason) => {
            debug!("Heartbeat connect to {} failed: {}", url, reason);
            let _ = tx.send(ChannelEvent::Error(reason.clone()));
            let _ = tx.send(ChannelEvent::Closed {
                reason: Some(reason),
            });
            return;
        }
    };

    if tx.send(ChannelEvent::Opened).is_err() {
        return;
    }

    let (mut sink, mut source) = stream.split();

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                if tx.send(ChannelEvent::Message).is_err() {
                    return;
                }
            }
            Ok(Message::Ping(payload)) => {
                if let Err(e) = sink.send(Message::Pong(payload)).await {
                    warn!("Failed to answer ping on {}: {}", url, e);
                }
            }
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty());
                let _ = tx.send(ChannelEvent::Closed { reason });
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = tx.send(ChannelEvent::Error(e.to_string()));
                let _ = tx.send(ChannelEvent::Closed {
                    reason: Some(e.to_string()),
                });
                return;
            }
        }
    }

    let _ = tx.send(ChannelEvent::Closed { reason: None });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_url() {
        let err = WsConnector::default().open("not a url").err().unwrap();
        assert!(matches!(err, ChannelError::InvalidUrl { .. }));
    }

    #[test]
    fn test_rejects_http_scheme() {
        let err = WsConnector::default().open("http://localhost:8000/ws/health").err().unwrap();
        assert!(matches!(err, ChannelError::InvalidUrl { .. }));
    }

    #[test]
    fn test_needs_runtime() {
        let err = WsConnector::default().open("ws://localhost:8000/ws/health").err().unwrap();
        assert!(matches!(err, ChannelError::Transport(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut channel = WsConnector::default()
            .open(&format!("ws://127.0.0.1:{}/ws/health", port))
            .unwrap();

        assert!(matches!(channel.next_event().await, ChannelEvent::Error(_)));
        assert!(matches!(channel.next_event().await, ChannelEvent::Closed { .. }));
    }

    #[tokio::test]
    async fn test_dropped_producer_reads_as_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut channel = Channel::new(rx);
        tx.send(ChannelEvent::Opened).unwrap();
        drop(tx);

        assert_eq!(channel.next_event().await, ChannelEvent::Opened);
        assert_eq!(channel.next_event().await, ChannelEvent::Closed { reason: None });
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        // Accepted by the kernel backlog but never answered
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut channel = WsConnector::new(Duration::from_millis(100))
            .open(&format!("ws://127.0.0.1:{}/ws/health", port))
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), channel.next_event())
            .await
            .expect("connect should time out");
        assert!(matches!(first, ChannelEvent::Error(reason) if reason.contains("timed out")));
        assert!(matches!(channel.next_event().await, ChannelEvent::Closed { .. }));
        drop(listener);
    }
}
