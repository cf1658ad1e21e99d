//! Configuration module
//!
//! Reads `config.toml` (default `~/.config/backend-health/config.toml`).
//! Every section and field is optional; missing values fall back to the
//! defaults below. `HEALTH_API_URL` / `HEALTH_WS_URL` override the backend
//! addresses after the file is read.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::domain::ConfigError;

/// Path suffix of the heartbeat endpoint
pub const HEALTH_WS_PATH: &str = "/ws/health";

/// Environment variable overriding the config file path
pub const CONFIG_PATH_ENV: &str = "BACKEND_HEALTH_CONFIG";

const API_URL_ENV: &str = "HEALTH_API_URL";
const WS_URL_ENV: &str = "HEALTH_WS_URL";

/// Default config location: `<config dir>/backend-health/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("backend-health")
        .join("config.toml")
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub monitor: MonitorConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.api_url = url;
            }
        }
        if let Ok(url) = std::env::var(WS_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.ws_url = Some(url);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.api_url.trim().is_empty() && self.backend.ws_url.is_none() {
            return Err(ConfigError::Invalid("backend.api_url is empty".into()));
        }
        let durations = [
            ("monitor.heartbeat_timeout_ms", self.monitor.heartbeat_timeout_ms),
            ("monitor.reconnect_delay_ms", self.monitor.reconnect_delay_ms),
            ("monitor.restored_banner_ms", self.monitor.restored_banner_ms),
            ("server.heartbeat_interval_ms", self.server.heartbeat_interval_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }
}

/// Where the backend lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// HTTP base address of the backend API
    pub api_url: String,
    /// Streaming base address; derived from `api_url` when absent
    pub ws_url: Option<String>,
}

impl BackendConfig {
    /// Full heartbeat endpoint URL.
    ///
    /// `ws_url` wins when set; otherwise the leading `http` of `api_url`
    /// becomes `ws` (so `https` maps to `wss`).
    pub fn health_ws_url(&self) -> String {
        let base = match &self.ws_url {
            Some(ws) if !ws.trim().is_empty() => ws.trim().to_string(),
            _ => {
                let api = self.api_url.trim();
                match api.strip_prefix("http") {
                    Some(rest) => format!("ws{}", rest),
                    None => api.to_string(),
                }
            }
        };
        format!("{}{}", base.trim_end_matches('/'), HEALTH_WS_PATH)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            ws_url: None,
        }
    }
}

/// Timing of the connection health monitor
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// No heartbeat for this long means the backend is offline
    pub heartbeat_timeout_ms: u64,
    /// Fixed delay before reopening a closed channel
    pub reconnect_delay_ms: u64,
    /// How long the "connection restored" view is shown
    pub restored_banner_ms: u64,
}

impl MonitorConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn restored_banner(&self) -> Duration {
        Duration::from_millis(self.restored_banner_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: 6_000,
            reconnect_delay_ms: 3_000,
            restored_banner_ms: 400,
        }
    }
}

/// Heartbeat server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Interval between heartbeat frames sent to each client
    pub heartbeat_interval_ms: u64,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            heartbeat_interval_ms: 3_000,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error (or any EnvFilter directive)
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
