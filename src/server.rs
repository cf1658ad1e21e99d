//! Heartbeat server runtime.
//!
//! [`ServerHandle`] binds the `/ws/health` + `/api/v1/health` router, runs
//! it with graceful shutdown and reports the bound address, so the CLI and
//! tests start the server the same way.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info, warn};

use crate::config::{AppConfig, HEALTH_WS_PATH};
use crate::domain::ServerError;
use crate::interfaces::http::{create_router, RouterOptions};
use crate::support::shutdown::{ShutdownCoordinator, ShutdownSignal};

// ── Options ────────────────────────────────────────────────────────

pub struct ServerOptions {
    pub config: AppConfig,
    /// Install a Prometheus recorder and mount `/metrics` (default: true)
    pub enable_metrics: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            enable_metrics: true,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running heartbeat server.
///
/// # Examples
///
/// ```rust,no_run
/// use backend_health::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     handle.install_signal_handler();
///     handle.wait().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    heartbeat_clients: Arc<AtomicUsize>,
    shutdown: ShutdownCoordinator,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub async fn start(opts: ServerOptions) -> Result<Self, ServerError> {
        let cfg = opts.config;
        let shutdown = ShutdownCoordinator::new(cfg.server.shutdown_timeout);
        let shutdown_signal = shutdown.signal();

        let mut router_opts = RouterOptions::new(cfg.server.heartbeat_interval(), shutdown_signal.clone());
        if opts.enable_metrics {
            router_opts.prometheus = prometheus_handle();
        }
        let heartbeat_clients = router_opts.heartbeat_clients.clone();
        let router = create_router(router_opts);

        let addr = cfg.server.address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!("💓 Heartbeat endpoint listening on ws://{}{}", local_addr, HEALTH_WS_PATH);
        info!("   Health check at http://{}/api/v1/health", local_addr);

        let api_shutdown = shutdown_signal.clone();
        let server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            api_shutdown.wait().await;
            info!("🛑 Heartbeat server received shutdown signal");
        });

        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("Heartbeat server error: {}", e);
            }
        });

        Ok(Self {
            local_addr,
            heartbeat_clients,
            shutdown,
            task,
        })
    }

    /// Full URL clients should connect to
    pub fn health_ws_url(&self) -> String {
        format!("ws://{}{}", self.local_addr, HEALTH_WS_PATH)
    }

    pub fn heartbeat_clients(&self) -> usize {
        self.heartbeat_clients.load(Ordering::SeqCst)
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Trigger shutdown on SIGTERM / SIGINT
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for shutdown to be triggered and the server to drain.
    pub async fn wait(self) {
        let task = self.task;
        let drained = self
            .shutdown
            .shutdown_with_cleanup(|| async move {
                if let Err(e) = task.await {
                    error!("Heartbeat server task panicked: {}", e);
                }
            })
            .await;
        if !drained {
            warn!("Heartbeat server did not drain in time");
        }
        info!("👋 Heartbeat server stopped");
    }

    pub async fn shutdown(self) {
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// The global recorder can only be installed once per process; later
/// servers in the same process reuse it.
fn prometheus_handle() -> Option<PrometheusHandle> {
    static PROM_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

    PROM_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("📊 Prometheus metrics recorder installed");
                Some(handle)
            }
            Err(e) => {
                warn!("Metrics disabled, recorder not installed: {}", e);
                None
            }
        })
        .clone()
}

/// Initialize tracing from the logging config. `RUST_LOG` wins over
/// `logging.level`. Call once per process.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let result = match config.logging.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::ConnectionStatus;
    use crate::monitor::HealthMonitor;

    fn loopback_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.server.host = "127.0.0.1".to_string();
        cfg.server.port = 0;
        cfg.server.heartbeat_interval_ms = 50;
        cfg.server.shutdown_timeout = 5;
        cfg.monitor.heartbeat_timeout_ms = 500;
        cfg.monitor.reconnect_delay_ms = 100;
        cfg
    }

    async fn wait_for(
        rx: &mut tokio::sync::watch::Receiver<ConnectionStatus>,
        wanted: ConnectionStatus,
    ) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
            .await
            .expect("status not reached in time")
            .expect("monitor dropped");
    }

    #[tokio::test]
    async fn test_monitor_tracks_real_server() {
        let cfg = loopback_config();
        let server = ServerHandle::start(ServerOptions {
            config: cfg.clone(),
            enable_metrics: false,
        })
        .await
        .unwrap();

        let monitor = HealthMonitor::new(server.health_ws_url(), &cfg.monitor);
        let mut status = monitor.watch();
        monitor.initialize();

        wait_for(&mut status, ConnectionStatus::Online).await;
        assert!(monitor.last_heartbeat_age().is_some());
        assert_eq!(server.heartbeat_clients(), 1);

        server.shutdown().await;
        wait_for(&mut status, ConnectionStatus::Offline).await;

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_monitor_offline_when_nothing_listens() {
        let cfg = loopback_config();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let monitor = HealthMonitor::new(
            format!("ws://127.0.0.1:{}{}", port, HEALTH_WS_PATH),
            &cfg.monitor,
        );
        let mut status = monitor.watch();
        monitor.initialize();

        wait_for(&mut status, ConnectionStatus::Offline).await;
        assert_eq!(monitor.last_heartbeat_age(), None);

        monitor.shutdown().await;
    }
}
