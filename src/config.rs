//! Configuration management for FGO Chat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{FgoChatError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for FGO Chat
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent service endpoints
    #[serde(default)]
    pub server: ServerConfig,
    /// Streaming transport behavior
    #[serde(default)]
    pub transport: TransportConfig,
    /// History loading settings
    #[serde(default)]
    pub history: HistoryConfig,
    /// Local identity storage
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Transcript export settings
    #[serde(default)]
    pub export: ExportConfig,
}

/// Agent service endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the HTTP API (e.g. `http://localhost:8000`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the WebSocket endpoint
    ///
    /// When unset, derived from `base_url` by swapping the scheme
    /// (`http` becomes `ws`, `https` becomes `wss`).
    #[serde(default)]
    pub ws_base_url: Option<String>,

    /// Timeout for each HTTP request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Path of the session creation endpoint, relative to `base_url`
    #[serde(default = "default_create_session_path")]
    pub create_session_path: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_create_session_path() -> String {
    "/api/sessions".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_base_url: None,
            request_timeout_seconds: default_request_timeout(),
            create_session_path: default_create_session_path(),
        }
    }
}

impl ServerConfig {
    /// Resolve the WebSocket base URL
    ///
    /// # Errors
    ///
    /// Returns error if neither URL can be turned into a `ws`/`wss` URL
    pub fn websocket_base(&self) -> Result<String> {
        if let Some(ws) = &self.ws_base_url {
            return Ok(ws.trim_end_matches('/').to_string());
        }

        let base = self.base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            Ok(format!("wss://{}", rest))
        } else if let Some(rest) = base.strip_prefix("http://") {
            Ok(format!("ws://{}", rest))
        } else {
            Err(FgoChatError::Config(format!(
                "Cannot derive WebSocket URL from base_url: {}",
                self.base_url
            ))
            .into())
        }
    }

    /// Non-empty path segments of the session creation endpoint
    pub fn create_session_segments(&self) -> Vec<&str> {
        self.create_session_path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// HTTP request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Streaming transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Fixed delay before each reconnect attempt (milliseconds)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Interval between heartbeat pings while connected (seconds, 0 disables)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
        }
    }
}

impl TransportConfig {
    /// Reconnect delay as a [`Duration`]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Heartbeat interval, or `None` when heartbeats are disabled
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// History loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of history entries requested per session
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

/// Local identity storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Override for the identity file location
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Transcript export configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportConfig {
    /// Directory transcripts are written to (defaults to the current directory)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl ExportConfig {
    /// Directory transcripts are written to
    pub fn output_dir(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FgoChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| FgoChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("FGO_CHAT_BASE_URL") {
            tracing::debug!(base_url = %base_url, "Env override: FGO_CHAT_BASE_URL");
            self.server.base_url = base_url;
        }

        if let Ok(ws_base_url) = std::env::var("FGO_CHAT_WS_BASE_URL") {
            tracing::debug!(ws_base_url = %ws_base_url, "Env override: FGO_CHAT_WS_BASE_URL");
            self.server.ws_base_url = Some(ws_base_url);
        }

        if let Some(v) = parse_env::<u64>("FGO_CHAT_REQUEST_TIMEOUT") {
            self.server.request_timeout_seconds = v;
        }

        if let Some(v) = parse_env::<u64>("FGO_CHAT_RECONNECT_DELAY_MS") {
            self.transport.reconnect_delay_ms = v;
        }

        if let Some(v) = parse_env::<u64>("FGO_CHAT_HEARTBEAT_INTERVAL") {
            self.transport.heartbeat_interval_seconds = v;
        }

        if let Some(v) = parse_env::<usize>("FGO_CHAT_HISTORY_LIMIT") {
            self.history.limit = v;
        }

        if let Ok(path) = std::env::var("FGO_CHAT_IDENTITY_PATH") {
            tracing::debug!(path = %path, "Env override: FGO_CHAT_IDENTITY_PATH");
            self.identity.path = Some(PathBuf::from(path));
        }

        if let Ok(dir) = std::env::var("FGO_CHAT_EXPORT_DIR") {
            tracing::debug!(dir = %dir, "Env override: FGO_CHAT_EXPORT_DIR");
            self.export.directory = Some(PathBuf::from(dir));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(server) = &cli.server {
            tracing::debug!(server = %server, "CLI override: --server");
            self.server.base_url = server.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.server.base_url).map_err(|e| {
            FgoChatError::Config(format!(
                "Invalid server.base_url '{}': {}",
                self.server.base_url, e
            ))
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(FgoChatError::Config(format!(
                "server.base_url must use http or https, got: {}",
                base.scheme()
            ))
            .into());
        }

        if let Some(ws) = &self.server.ws_base_url {
            let ws_url = url::Url::parse(ws).map_err(|e| {
                FgoChatError::Config(format!("Invalid server.ws_base_url '{}': {}", ws, e))
            })?;
            if ws_url.scheme() != "ws" && ws_url.scheme() != "wss" {
                return Err(FgoChatError::Config(format!(
                    "server.ws_base_url must use ws or wss, got: {}",
                    ws_url.scheme()
                ))
                .into());
            }
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(FgoChatError::Config(
                "server.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.create_session_segments().is_empty() {
            return Err(FgoChatError::Config(
                "server.create_session_path cannot be empty".to_string(),
            )
            .into());
        }

        if self.transport.reconnect_delay_ms == 0 {
            return Err(FgoChatError::Config(
                "transport.reconnect_delay_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.history.limit == 0 {
            return Err(
                FgoChatError::Config("history.limit must be greater than 0".to_string()).into(),
            );
        }

        if self.history.limit > 1000 {
            return Err(FgoChatError::Config(
                "history.limit must be less than or equal to 1000".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

/// Read and parse a numeric environment variable, warning on bad values
fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(v) => {
            tracing::debug!("Env override: {}={}", name, raw);
            Some(v)
        }
        Err(_) => {
            tracing::warn!("Invalid value for {}: {}", name, raw);
            None
        }
    }
}
