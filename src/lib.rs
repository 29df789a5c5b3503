//! mopidy-mqtt - Bridge between an MQTT broker and a Mopidy music server
//!
//! Inbound messages on `<topic>/play`, `<topic>/add`, `<topic>/control` and
//! `<topic>/volume` drive the player; player events come back out as retained
//! messages on `<topic>/nowplaying`, `<topic>/nextplaying`, `<topic>/state`
//! and `<topic>/image`.

pub mod bridge;
pub mod bus;
pub mod codec;
pub mod config;
pub mod player;
pub mod protocol;

pub use bridge::{CommandRouter, EventPublisher, PlayerCommand, Topics};
pub use bus::{MessageBus, MqttClient};
pub use config::Config;
pub use player::{MopidyClient, Player, PlayerEvent};
pub use protocol::QoS;
