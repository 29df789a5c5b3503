//! Mopidy Connection Configuration

use std::time::Duration;

use serde::Deserialize;

/// Settings for the Mopidy JSON-RPC WebSocket
#[derive(Debug, Clone, Deserialize)]
pub struct MopidyConfig {
    /// WebSocket endpoint of Mopidy's HTTP frontend
    #[serde(default = "default_url")]
    pub url: String,

    /// How long to wait for a JSON-RPC response
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Delay between reconnect attempts
    #[serde(default = "default_reconnect_interval", with = "humantime_serde")]
    pub reconnect_interval: Duration,
}

fn default_url() -> String {
    "ws://localhost:6680/mopidy/ws".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for MopidyConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            request_timeout: default_request_timeout(),
            reconnect_interval: default_reconnect_interval(),
        }
    }
}
