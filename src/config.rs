//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (`CHAT_HUB_HOST`, `CHAT_HUB_PORT`)
//! - TOML configuration file
//! - Command line arguments (bind address override)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::session::{DEFAULT_OUTBOUND_CAPACITY, DEFAULT_REPLAY_LIMIT};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "chat_hub.toml";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hub settings.
    #[serde(default)]
    pub hub: HubConfig,

    /// Message history settings.
    #[serde(default)]
    pub history: HistoryConfig,

    /// HTTP surface settings.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Pending messages per connection before it is evicted as too slow.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

/// History configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Persist chat lines and replay them on join.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite database path. `:memory:` keeps history for this process only.
    #[serde(default = "default_history_path")]
    pub path: PathBuf,

    /// Lines replayed to a joining participant.
    #[serde(default = "default_replay_limit")]
    pub replay_limit: usize,
}

/// HTTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// File served at `/chat`.
    #[serde(default = "default_chat_page")]
    pub chat_page: PathBuf,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

// Default value functions
fn default_host() -> String {
    std::env::var("CHAT_HUB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("CHAT_HUB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_outbound_capacity() -> usize {
    DEFAULT_OUTBOUND_CAPACITY
}

fn default_history_path() -> PathBuf {
    PathBuf::from("chat.db")
}

fn default_replay_limit() -> usize {
    DEFAULT_REPLAY_LIMIT
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_chat_page() -> PathBuf {
    PathBuf::from("static/chat.html")
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            hub: HubConfig::default(),
            history: HistoryConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_history_path(),
            replay_limit: default_replay_limit(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            ws_path: default_ws_path(),
            chat_page: default_chat_page(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or `chat_hub.toml` if it exists,
    /// or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read, parsed, or validated.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Reject values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidConfig` naming the offending value.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.hub.outbound_capacity == 0 {
            return Err(AppError::InvalidConfig(
                "hub.outbound_capacity must be at least 1".to_string(),
            ));
        }
        // Replay goes through the joiner's own queue; it must leave room
        // for broadcasts or the Hub evicts the joiner mid-replay
        if self.history.enabled && self.history.replay_limit >= self.hub.outbound_capacity {
            return Err(AppError::InvalidConfig(format!(
                "history.replay_limit ({}) must be below hub.outbound_capacity ({})",
                self.history.replay_limit, self.hub.outbound_capacity
            )));
        }
        let ws_path = self.http.ws_path.as_str();
        if !ws_path.starts_with('/') || matches!(ws_path, "/" | "/chat" | "/health") {
            return Err(AppError::InvalidConfig(format!(
                "http.ws_path must be an unused absolute path: {}",
                ws_path
            )));
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidConfig` if host and port do not form an address.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| AppError::InvalidConfig(format!("bad bind address {}:{}", self.host, self.port)))
    }

    /// Apply a `host:port` override from the command line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidConfig` if `addr` is not a socket address.
    pub fn set_bind(&mut self, addr: &str) -> Result<(), AppError> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| AppError::InvalidConfig(format!("bad bind address {}", addr)))?;
        self.host = addr.ip().to_string();
        self.port = addr.port();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hub.outbound_capacity, 64);
        assert!(config.history.enabled);
        assert_eq!(config.history.replay_limit, 50);
        assert_eq!(config.http.ws_path, "/ws");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [hub]
            outbound_capacity = 16

            [history]
            enabled = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.hub.outbound_capacity, 16);
        assert!(!config.history.enabled);
        assert_eq!(config.history.replay_limit, 50);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = Config::default();
        config.hub.outbound_capacity = 0;
        assert!(matches!(config.validate(), Err(AppError::InvalidConfig(_))));
    }

    #[test]
    fn test_replay_limit_must_fit_queue() {
        let mut config = Config::default();
        config.hub.outbound_capacity = 16;
        assert!(matches!(config.validate(), Err(AppError::InvalidConfig(_))));

        config.history.replay_limit = 15;
        assert!(config.validate().is_ok());

        // Without history nothing is replayed
        config.history.replay_limit = 50;
        config.history.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bind_override() {
        let mut config = Config::default();
        config.set_bind("0.0.0.0:9100").unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 9100);
        assert!(config.set_bind("nonsense").is_err());
    }
}
