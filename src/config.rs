//! Roadmap client configuration types and loading

use crate::connection::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_RECONNECT_DELAY_MS};
use crate::correlator::{CorrelatorConfig, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::types::{CompletionPolicy, Direction};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default task-generation service endpoint
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8080/";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebSocket endpoint of the task-generation service
    pub endpoint: String,

    /// Reconnection behaviour
    pub connection: ConnectionSettings,

    /// Request correlation
    pub request: RequestSettings,

    /// Graph presentation
    pub view: ViewSettings,

    /// Saved roadmaps and roster
    pub storage: StorageSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connection: ConnectionSettings::default(),
            request: RequestSettings::default(),
            view: ViewSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(eyre::eyre!(
                "Invalid endpoint '{}': expected a ws:// or wss:// URL",
                self.endpoint
            ));
        }
        if self.connection.reconnect_delay_ms == 0 {
            return Err(eyre::eyre!("connection.reconnect-delay-ms must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.roadmap.yml`, then `<config dir>/roadmap/roadmap.yml`,
    /// then built-in defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".roadmap.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("roadmap").join("roadmap.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Fixed delay before each reconnect attempt
    #[serde(rename = "reconnect-delay-ms")]
    pub reconnect_delay_ms: u64,

    /// Consecutive failures tolerated before giving up (null = retry forever)
    #[serde(rename = "max-reconnect-attempts")]
    pub max_reconnect_attempts: Option<u32>,

    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_reconnect_attempts: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl ConnectionSettings {
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    /// Bound on waiting for a complete answer (null = wait forever)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: Option<u64>,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_SECS * 1000),
        }
    }
}

impl RequestSettings {
    pub fn to_correlator_config(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            request_timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub direction: Direction,

    #[serde(rename = "completion-policy")]
    pub completion_policy: CompletionPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding `.roadmap/` (defaults to the current directory)
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.connection.reconnect_delay_ms, 3000);
        assert_eq!(config.connection.max_reconnect_attempts, None);
        assert_eq!(config.request.timeout_ms, Some(120_000));
        assert_eq!(config.view.direction, Direction::TopToBottom);
        assert_eq!(config.view.completion_policy, CompletionPolicy::Reset);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
endpoint: wss://roadmap.example.com/ws
connection:
  reconnect-delay-ms: 500
  max-reconnect-attempts: 5
request:
  timeout-ms: null
view:
  direction: LR
  completion-policy: carry-over
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.endpoint, "wss://roadmap.example.com/ws");
        assert_eq!(config.connection.reconnect_delay_ms, 500);
        assert_eq!(config.connection.max_reconnect_attempts, Some(5));
        assert_eq!(config.connection.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert_eq!(config.request.timeout_ms, None);
        assert_eq!(config.view.direction, Direction::LeftToRight);
        assert_eq!(config.view.completion_policy, CompletionPolicy::CarryOver);
        assert_eq!(config.storage.dir, None);

        let connection = config.connection.to_connection_config();
        assert_eq!(connection.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.request.to_correlator_config().request_timeout, None);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("view:\n  direction: LR\n").unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.view.direction, Direction::LeftToRight);
        assert_eq!(config.request.timeout_ms, Some(120_000));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            endpoint: "http://example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.reconnect_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "endpoint: ws://10.0.0.2:9000/").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.endpoint, "ws://10.0.0.2:9000/");
    }

    #[test]
    fn test_load_explicit_path_missing() {
        let path = PathBuf::from("/nonexistent/roadmap.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
