//! Configuration for the coordinator and the transfer sessions.
//!
//! Loaded from TOML; every field is optional and falls back to the defaults
//! below. The transfer constants are local tunables and are never negotiated
//! between peers.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Paths the REST router already owns
const RESERVED_PATHS: &[&str] = &["/health"];
const RESERVED_PREFIXES: &[&str] = &["/api/"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Coordinator listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Path the signaling websocket is served on
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// Prometheus exporter address; disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_addr: Option<SocketAddr>,
}

/// Chunking and flow-control constants for the transfer sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Sender pauses once the channel's buffered amount exceeds this
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
    /// Paused sender resumes once the buffered amount drops to this
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: usize,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_chunk_size() -> usize {
    256 * 1024
}

fn default_high_water_mark() -> usize {
    8 * 1024 * 1024
}

fn default_low_water_mark() -> usize {
    2 * 1024 * 1024
}

fn default_ack_timeout_ms() -> u64 {
    20_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ws_path: default_ws_path(),
            metrics_addr: None,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            high_water_mark: default_high_water_mark(),
            low_water_mark: default_low_water_mark(),
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }
}

impl TransferConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.low_water_mark >= self.high_water_mark {
            return Err(ConfigError::Invalid(format!(
                "low_water_mark ({}) must be below high_water_mark ({})",
                self.low_water_mark, self.high_water_mark
            )));
        }
        if self.ack_timeout_ms == 0 {
            return Err(ConfigError::Invalid("ack_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.coordinator.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "ws_path must start with '/': {}",
                self.coordinator.ws_path
            )));
        }
        let ws_path = self.coordinator.ws_path.as_str();
        if RESERVED_PATHS.contains(&ws_path)
            || RESERVED_PREFIXES.iter().any(|prefix| ws_path.starts_with(prefix))
        {
            return Err(ConfigError::Invalid(format!(
                "ws_path collides with a built-in route: {}",
                ws_path
            )));
        }
        self.transfer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.coordinator.ws_path, "/ws");
        assert_eq!(config.coordinator.bind_addr.port(), 3000);
        assert_eq!(config.transfer.chunk_size, 256 * 1024);
        assert_eq!(config.transfer.ack_timeout(), Duration::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [coordinator]
            bind_addr = "127.0.0.1:8080"

            [transfer]
            chunk_size = 65536
            "#,
        )
        .unwrap();

        assert_eq!(config.coordinator.bind_addr.port(), 8080);
        assert_eq!(config.coordinator.ws_path, "/ws");
        assert_eq!(config.transfer.chunk_size, 65536);
        assert_eq!(config.transfer.high_water_mark, 8 * 1024 * 1024);
    }

    #[test]
    fn test_empty_toml() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.coordinator.metrics_addr.is_none());
    }

    #[test]
    fn test_inverted_water_marks_rejected() {
        let result = Config::from_toml_str(
            r#"
            [transfer]
            high_water_mark = 1024
            low_water_mark = 4096
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_relative_ws_path_rejected() {
        let result = Config::from_toml_str(
            r#"
            [coordinator]
            ws_path = "ws"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_ws_path_on_builtin_route_rejected() {
        for path in ["/health", "/api/v1/stats", "/api/v1/rooms/x"] {
            let mut config = Config::default();
            config.coordinator.ws_path = path.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{} accepted",
                path
            );
        }

        let mut config = Config::default();
        config.coordinator.ws_path = "/signal".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.toml");
        fs::write(&path, "[transfer]\nack_timeout_ms = 500\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.transfer.ack_timeout(), Duration::from_millis(500));
    }
}
