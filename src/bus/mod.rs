//! Message Bus
//!
//! The MQTT side of the bridge. [`MessageBus`] is the outbound publish
//! capability the event publisher depends on; [`InboundHandler`] is how the
//! client hands received messages to the command router. [`MqttClient`]
//! implements both ends over a plain TCP connection.

mod client;

pub use client::MqttClient;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

/// Error type for message bus operations
#[derive(Debug)]
pub enum BusError {
    /// Connection to the broker failed or was lost
    ConnectionLost(String),
    /// Broker refused the connection
    Rejected(String),
    /// Operation timed out
    Timeout,
    /// Client is not connected
    NotConnected,
    /// Client has been shut down
    Closed,
    /// Other error
    Other(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            BusError::Rejected(msg) => write!(f, "Rejected: {}", msg),
            BusError::Timeout => write!(f, "Operation timed out"),
            BusError::NotConnected => write!(f, "Not connected"),
            BusError::Closed => write!(f, "Client closed"),
            BusError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BusError {}

/// Status of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected, will attempt to connect
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and operational
    Connected,
    /// Connection failed, backing off before retry
    Backoff,
}

/// Outbound publish capability
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` on the full `topic`
    async fn publish(&self, topic: &str, payload: Bytes, retain: bool) -> Result<(), BusError>;
}

/// Receiver for messages arriving from the broker
///
/// Called once per message, in arrival order; the client does not read the
/// next packet until the handler returns.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_message(&self, topic: &str, payload: Bytes);
}
