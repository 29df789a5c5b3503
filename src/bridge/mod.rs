//! MQTT <-> Player Bridge
//!
//! Two independent halves share the topic namespace:
//! - [`CommandRouter`] consumes `/play`, `/add`, `/control` and `/volume`
//!   and drives the [`Player`](crate::player::Player).
//! - [`EventPublisher`] turns player events into retained `/nowplaying`,
//!   `/nextplaying`, `/state` and `/image` messages.
//!
//! # Example Configuration
//!
//! ```toml
//! [mqtt]
//! host = "broker.lan"
//! topic = "home/livingroom"   # subscribes home/livingroom/play, ...
//! ```

mod publisher;
mod router;
pub mod topics;


pub use publisher::{EventPublisher, NO_NEXT};
pub use router::{parse_command, parse_control, parse_volume, CommandRouter, PlayerCommand, RouteError};
pub use topics::Topics;
