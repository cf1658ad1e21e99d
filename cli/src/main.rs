//! Backend health probe
//!
//! Watches a backend's heartbeat channel and prints every status and view
//! change, or serves the heartbeat endpoint itself.
//!
//! ```sh
//! # Watch the backend from the default config (~/.config/backend-health/config.toml)
//! health-probe
//!
//! # Watch a specific backend
//! health-probe --api-url http://10.0.0.5:8000 watch
//!
//! # Serve /ws/health on port 9000
//! health-probe serve --port 9000
//!
//! # Validate config without starting
//! health-probe --check
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};

use backend_health::config::AppConfig;
use backend_health::domain::ConfigError;
use backend_health::server::{init_tracing, ServerHandle, ServerOptions};
use backend_health::support::shutdown::ShutdownCoordinator;
use backend_health::{spawn_view_gate, ConnectionStatus, HealthMonitor};

/// Backend health probe: heartbeat monitor and heartbeat endpoint.
#[derive(Parser, Debug)]
#[command(
    name = "health-probe",
    version,
    about = "Monitor a backend's /ws/health heartbeat or serve one",
    long_about = "Backend health probe: follows the backend heartbeat over WebSocket \
                  and reports online/offline transitions.\n\n\
                  Default config: ~/.config/backend-health/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "BACKEND_HEALTH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the backend HTTP base URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Override the heartbeat WebSocket URL.
    #[arg(long)]
    ws_url: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit.
    #[arg(long)]
    check: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the backend heartbeat until Ctrl+C (default).
    Watch,
    /// Serve the heartbeat endpoint.
    Serve {
        /// Override the listen port.
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(backend_health::default_config_path);

    let config = match load_config(&cli, &config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ Invalid configuration in {}: {}", config_path.display(), e);
            std::process::exit(2);
        }
    };

    // ── Config validation mode ─────────────────────────────────────
    if cli.check {
        println!("✅ Configuration is valid");
        println!("   Config file       : {}", config_path.display());
        println!("   Backend API       : {}", config.backend.api_url);
        println!("   Heartbeat channel : {}", config.backend.health_ws_url());
        println!("   Heartbeat timeout : {:?}", config.monitor.heartbeat_timeout());
        println!("   Reconnect delay   : {:?}", config.monitor.reconnect_delay());
        println!("   Serve address     : {}", config.server.address());
        println!("   Log level         : {}", config.logging.level);
        return Ok(());
    }

    init_tracing(&config);
    info!("Configuration loaded from {}", config_path.display());

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(config).await,
        Command::Serve { .. } => serve(config).await?,
    }

    Ok(())
}

/// Load the config file, then apply CLI overrides and validate the result.
fn load_config(cli: &Cli, path: &Path) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load(path)?;

    if let Some(ref url) = cli.api_url {
        config.backend.api_url = url.clone();
    }
    if let Some(ref url) = cli.ws_url {
        config.backend.ws_url = Some(url.clone());
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(Command::Serve { port: Some(port) }) = cli.command {
        config.server.port = port;
    }

    config.validate()?;
    Ok(config)
}

async fn watch(config: AppConfig) {
    let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout);
    shutdown.start_signal_listener();

    let monitor = HealthMonitor::from_config(&config).shared();
    info!("👀 Watching {}", monitor.health_url());

    let status_monitor = monitor.clone();
    let _subscription = monitor.subscribe(move |status| match status {
        ConnectionStatus::Online => println!("🟢 backend online"),
        ConnectionStatus::Offline => match status_monitor.last_heartbeat_age() {
            Some(age) => println!("🔴 backend offline (last heartbeat {}s ago)", age),
            None => println!("🔴 backend offline (no heartbeat yet)"),
        },
        ConnectionStatus::Unknown => {}
    });

    let mut views = spawn_view_gate(&monitor, config.monitor.restored_banner(), shutdown.signal());
    monitor.initialize();

    let signal = shutdown.signal();
    loop {
        tokio::select! {
            _ = signal.wait() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = *views.borrow_and_update();
                info!("View: {:?}", view);
            }
        }
    }

    monitor.shutdown().await;
    info!("👋 Monitor stopped");
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let handle = match ServerHandle::start(ServerOptions {
        config,
        enable_metrics: true,
    })
    .await
    {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start heartbeat server: {}", e);
            return Err(e.into());
        }
    };

    handle.install_signal_handler();
    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    handle.wait().await;
    Ok(())
}
