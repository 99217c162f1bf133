//! Configuration management for a game node.
//!
//! This module handles loading and validation of node configuration from
//! TOML files. Command-line flags are applied on top by the application.

use game_net::NetConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

fn default_reconnect_interval_ms() -> u64 {
    3000
}

fn default_client_uid() -> u64 {
    10000
}

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses the node's
/// role and addresses, the connection engine settings and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Node role and addresses
    pub server: ServerSettings,
    /// Connection engine settings
    #[serde(default)]
    pub net: NetConfig,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Which service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Accepts connections from login servers
    Center,
    /// Connects upstream as a game client
    Client,
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "center" => Ok(NodeRole::Center),
            "client" => Ok(NodeRole::Client),
            other => Err(format!("Unknown role: {other}. Must be one of: center, client")),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Center => write!(f, "center"),
            NodeRole::Client => write!(f, "client"),
        }
    }
}

/// Role and network addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Service role of this process
    pub role: NodeRole,
    /// Address the center role listens on (e.g., "127.0.0.1:7100")
    pub bind_address: String,
    /// Address the client role connects to
    pub upstream_address: String,
    /// Delay before the client role retries a lost upstream link (0 disables)
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// User id the client role logs in with
    #[serde(default = "default_client_uid")]
    pub client_uid: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                role: NodeRole::Center,
                bind_address: "127.0.0.1:7100".to_string(),
                upstream_address: "127.0.0.1:7100".to_string(),
                reconnect_interval_ms: default_reconnect_interval_ms(),
                client_uid: default_client_uid(),
            },
            net: NetConfig::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded configuration, or an error if the file could not be read,
    /// parsed, or created.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        self.server
            .bind_address
            .parse()
            .map_err(|_| format!("Invalid bind address: {}", self.server.bind_address))
    }

    /// Parsed upstream address.
    pub fn upstream_addr(&self) -> Result<SocketAddr, String> {
        self.server
            .upstream_address
            .parse()
            .map_err(|_| format!("Invalid upstream address: {}", self.server.upstream_address))
    }

    /// Client retry delay, or `None` when retries are disabled.
    pub fn reconnect_interval(&self) -> Option<Duration> {
        (self.server.reconnect_interval_ms > 0)
            .then(|| Duration::from_millis(self.server.reconnect_interval_ms))
    }

    /// Validates the configuration for the selected role.
    pub fn validate(&self) -> Result<(), String> {
        match self.server.role {
            NodeRole::Center => {
                self.bind_addr()?;
            }
            NodeRole::Client => {
                self.upstream_addr()?;
            }
        }

        self.net.validate().map_err(|e| e.to_string())?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
