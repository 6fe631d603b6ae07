//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::listen::ListenerConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no listeners configured")]
    NoListeners,
}

/// Bouncer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bouncer identity.
    #[serde(default)]
    pub bouncer: BouncerConfig,
    /// Listening sockets, plain or TLS-wrapped.
    pub listen: Vec<ListenerConfig>,
    /// User and network storage.
    pub storage: StorageConfig,
    /// Message history recording.
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        if config.listen.is_empty() {
            return Err(ConfigError::NoListeners);
        }
        Ok(config)
    }
}

/// Bouncer identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BouncerConfig {
    /// Source name used on messages the bouncer originates
    /// (e.g., "bnc.example.org").
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for BouncerConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
        }
    }
}

fn default_source() -> String {
    "irc.slircb".to_string()
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    pub path: String,
}

/// Message history configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Whether relayed messages are recorded at all.
    #[serde(default)]
    pub enabled: bool,
    /// Path to the history SQLite database file.
    #[serde(default = "default_history_path")]
    pub path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_history_path(),
        }
    }
}

fn default_history_path() -> String {
    "slircb-history.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let toml_str = r#"
            [[listen]]
            address = "127.0.0.1:6667"

            [storage]
            path = "slircb.db"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bouncer.source, "irc.slircb");
        assert_eq!(config.listen.len(), 1);
        assert!(!config.history.enabled);
    }

    #[test]
    fn full_config_parses() {
        let toml_str = r#"
            [bouncer]
            source = "bnc.example.org"

            [[listen]]
            address = "0.0.0.0:6667"

            [[listen]]
            address = "0.0.0.0:6697"
            tls = { cert_path = "/etc/slircb/cert.pem", key_path = "/etc/slircb/key.pem" }

            [storage]
            path = "/var/lib/slircb/slircb.db"

            [history]
            enabled = true
            path = "/var/lib/slircb/history.db"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bouncer.source, "bnc.example.org");
        assert_eq!(config.listen.len(), 2);
        assert!(config.listen[0].tls.is_none());
        assert!(config.listen[1].tls.is_some());
        assert!(config.history.enabled);
    }

    #[test]
    fn history_defaults() {
        let history = HistoryConfig::default();
        assert!(!history.enabled);
        assert_eq!(history.path, "slircb-history.db");
    }
}
