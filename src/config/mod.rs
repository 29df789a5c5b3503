//! Configuration Module
//!
//! TOML-based configuration for the bridge with support for:
//! - MQTT broker connection and base topic
//! - Mopidy WebSocket endpoint
//! - Logging
//! - Environment variable overrides (MOPIDY_MQTT__* prefix)

use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

pub use mopidy::MopidyConfig;
pub use mqtt::MqttConfig;

mod mopidy;
mod mqtt;


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static regex");
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// MQTT broker connection
    pub mqtt: MqttConfig,
    /// Mopidy server connection
    pub mopidy: MopidyConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `MOPIDY_MQTT__` prefix with double underscores for nesting:
    ///    - `MOPIDY_MQTT__MQTT__HOST=broker.lan` overrides `mqtt.host`
    ///    - `MOPIDY_MQTT__MQTT__TOPIC=home/livingroom` overrides `mqtt.topic`
    ///    - `MOPIDY_MQTT__MOPIDY__URL=ws://nas:6680/mopidy/ws` overrides `mopidy.url`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("mqtt.host", "localhost")?
            .set_default("mqtt.port", 1883)?
            .set_default("mqtt.topic", "mopidy")?
            .set_default("mqtt.client_id_prefix", "mopidy")?
            .set_default("mqtt.keepalive", 60)?
            .set_default("mqtt.reconnect_interval", 5)?
            .set_default("mqtt.max_reconnect_interval", 60)?
            .set_default("mqtt.connect_timeout", 30)?
            .set_default("mopidy.url", "ws://localhost:6680/mopidy/ws")?
            .set_default("mopidy.request_timeout", "5s")?
            .set_default("mopidy.reconnect_interval", "5s")?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("MOPIDY_MQTT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.host must not be empty".to_string(),
            ));
        }

        if self.mqtt.port == 0 {
            return Err(ConfigError::Validation(
                "mqtt.port must be non-zero".to_string(),
            ));
        }

        // Subtopics are appended directly, so the base must be a plain topic name
        let topic = &self.mqtt.topic;
        if topic.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.topic must not be empty".to_string(),
            ));
        }
        if topic.ends_with('/') {
            return Err(ConfigError::Validation(format!(
                "mqtt.topic '{}' must not end with '/'",
                topic
            )));
        }
        if topic.contains(&['+', '#'][..]) {
            return Err(ConfigError::Validation(format!(
                "mqtt.topic '{}' must not contain wildcards",
                topic
            )));
        }

        if self.mqtt.keepalive == 0 {
            return Err(ConfigError::Validation(
                "mqtt.keepalive must be non-zero".to_string(),
            ));
        }
        if self.mqtt.reconnect_interval == 0 {
            return Err(ConfigError::Validation(
                "mqtt.reconnect_interval must be non-zero".to_string(),
            ));
        }
        if self.mqtt.max_reconnect_interval < self.mqtt.reconnect_interval {
            return Err(ConfigError::Validation(format!(
                "mqtt.max_reconnect_interval ({}) must be at least mqtt.reconnect_interval ({})",
                self.mqtt.max_reconnect_interval, self.mqtt.reconnect_interval
            )));
        }

        let url = &self.mopidy.url;
        if !url.starts_with("ws://") {
            return Err(ConfigError::Validation(format!(
                "mopidy.url '{}' must be a ws:// URL",
                url
            )));
        }

        if self.mopidy.request_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "mopidy.request_timeout must be non-zero".to_string(),
            ));
        }
        if self.mopidy.reconnect_interval.is_zero() {
            return Err(ConfigError::Validation(
                "mopidy.reconnect_interval must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
