//! Command Router
//!
//! Turns inbound MQTT messages into player calls. Routing never fails from
//! the caller's point of view: bad input and player errors are logged and the
//! message is dropped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::topics::{self, Topics};
use crate::bus::InboundHandler;
use crate::player::{PlaybackState, Player, PlayerResult};

/// Player operation derived from one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Replace the tracklist with `uri` and play it
    Play(String),
    /// Append `uri` to the tracklist
    AddToQueue(String),
    Stop,
    Pause,
    Resume,
    /// Start playback of the current tracklist
    PlayCurrent,
    Next,
    Previous,
    ClearQueue,
    /// Pause when playing, otherwise resume or start
    Toggle,
    /// Change the volume relative to its current value
    VolumeDelta(i32),
    VolumeSet(i32),
}

/// Why a message produced no command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Topic is not one of the inbound topics
    UnknownTopic(String),
    /// `/control` payload is not a known keyword
    UnknownControl(String),
    /// Payload is not valid UTF-8
    InvalidUtf8,
    /// `/volume` payload is not an integer
    InvalidVolume(String),
}

impl RouteError {
    /// Whether the payload itself was malformed, as opposed to unrecognized
    pub fn is_malformed(&self) -> bool {
        !matches!(
            self,
            RouteError::UnknownTopic(_) | RouteError::UnknownControl(_)
        )
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::UnknownTopic(topic) => write!(f, "Unknown topic: {}", topic),
            RouteError::UnknownControl(cmd) => write!(f, "Unrecognized control command: {}", cmd),
            RouteError::InvalidUtf8 => write!(f, "Payload is not valid UTF-8"),
            RouteError::InvalidVolume(value) => write!(f, "Invalid volume: {}", value),
        }
    }
}

impl std::error::Error for RouteError {}

/// Parse a `/control` keyword; matching is exact and case-sensitive
pub fn parse_control(payload: &str) -> Result<PlayerCommand, RouteError> {
    match payload {
        "stop" => Ok(PlayerCommand::Stop),
        "pause" => Ok(PlayerCommand::Pause),
        "play" => Ok(PlayerCommand::PlayCurrent),
        "resume" => Ok(PlayerCommand::Resume),
        "next" => Ok(PlayerCommand::Next),
        "previous" => Ok(PlayerCommand::Previous),
        "clear" => Ok(PlayerCommand::ClearQueue),
        "toggle" => Ok(PlayerCommand::Toggle),
        other => Err(RouteError::UnknownControl(other.to_string())),
    }
}

/// Parse a `/volume` payload
///
/// A `+` or `-` as the very first byte makes it relative; the value itself
/// is parsed with surrounding whitespace trimmed.
pub fn parse_volume(payload: &str) -> Result<PlayerCommand, RouteError> {
    let relative = payload.starts_with(&['+', '-'][..]);
    let trimmed = payload.trim();
    let value: i32 = trimmed
        .parse()
        .map_err(|_| RouteError::InvalidVolume(trimmed.to_string()))?;

    if relative {
        Ok(PlayerCommand::VolumeDelta(value))
    } else {
        Ok(PlayerCommand::VolumeSet(value))
    }
}

/// Map an inbound message to a command
pub fn parse_command(
    topics: &Topics,
    topic: &str,
    payload: &[u8],
) -> Result<PlayerCommand, RouteError> {
    let unknown = || RouteError::UnknownTopic(topic.to_string());
    let suffix = topics.suffix(topic).ok_or_else(unknown)?;
    if !topics::INBOUND.contains(&suffix) {
        return Err(unknown());
    }

    let payload = std::str::from_utf8(payload).map_err(|_| RouteError::InvalidUtf8)?;

    // URIs are passed through as-is, empty included; Mopidy decides
    match suffix {
        topics::PLAY => Ok(PlayerCommand::Play(payload.to_string())),
        topics::ADD => Ok(PlayerCommand::AddToQueue(payload.to_string())),
        topics::CONTROL => parse_control(payload),
        topics::VOLUME => parse_volume(payload),
        _ => Err(unknown()),
    }
}

/// Routes inbound messages to the player
pub struct CommandRouter {
    player: Arc<dyn Player>,
    topics: Topics,
}

impl CommandRouter {
    pub fn new(player: Arc<dyn Player>, topics: Topics) -> Self {
        Self { player, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Handle one inbound message
    pub async fn route(&self, topic: &str, payload: &[u8]) {
        let command = match parse_command(&self.topics, topic, payload) {
            Ok(command) => command,
            Err(e) if e.is_malformed() => {
                warn!(%topic, error = %e, "Dropping malformed message");
                return;
            }
            Err(e) => {
                info!(%topic, error = %e, "Ignoring message");
                return;
            }
        };

        debug!(%topic, ?command, "Routing command");
        self.execute(command).await;
    }

    /// Run `command` against the player
    ///
    /// Multi-step commands are best effort: a failed step is logged and the
    /// remaining steps still run.
    pub async fn execute(&self, command: PlayerCommand) {
        let player = &self.player;
        match command {
            PlayerCommand::Play(uri) => {
                log_failure("clear_tracklist", player.clear_tracklist().await);
                log_failure("add_track", player.add_track(&uri).await);
                log_failure("play", player.play().await);
            }
            PlayerCommand::AddToQueue(uri) => {
                log_failure("add_track", player.add_track(&uri).await);
            }
            PlayerCommand::Stop => log_failure("stop", player.stop().await),
            PlayerCommand::Pause => log_failure("pause", player.pause().await),
            PlayerCommand::Resume => log_failure("resume", player.resume().await),
            PlayerCommand::PlayCurrent => log_failure("play", player.play().await),
            PlayerCommand::Next => log_failure("next", player.next().await),
            PlayerCommand::Previous => log_failure("previous", player.previous().await),
            PlayerCommand::ClearQueue => {
                log_failure("clear_tracklist", player.clear_tracklist().await)
            }
            PlayerCommand::Toggle => self.toggle().await,
            PlayerCommand::VolumeDelta(delta) => self.change_volume(delta).await,
            PlayerCommand::VolumeSet(volume) => {
                log_failure("set_volume", player.set_volume(volume).await)
            }
        }
    }

    async fn toggle(&self) {
        let state = match self.player.get_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Cannot toggle, playback state unavailable");
                return;
            }
        };

        debug!(%state, "Toggling playback");
        match state {
            PlaybackState::Paused => log_failure("resume", self.player.resume().await),
            PlaybackState::Stopped => log_failure("play", self.player.play().await),
            PlaybackState::Playing => log_failure("pause", self.player.pause().await),
        }
    }

    async fn change_volume(&self, delta: i32) {
        let current = match self.player.get_volume().await {
            Ok(Some(volume)) => volume,
            Ok(None) => {
                warn!(delta, "Cannot change volume, player has no mixer");
                return;
            }
            Err(e) => {
                warn!(delta, error = %e, "Cannot change volume, volume unavailable");
                return;
            }
        };

        let volume = current.saturating_add(delta);
        debug!(current, delta, volume, "Changing volume");
        log_failure("set_volume", self.player.set_volume(volume).await);
    }
}

fn log_failure(operation: &str, result: PlayerResult<()>) {
    if let Err(e) = result {
        warn!(operation, error = %e, "Player call failed");
    }
}

#[async_trait]
impl InboundHandler for CommandRouter {
    async fn on_message(&self, topic: &str, payload: Bytes) {
        self.route(topic, &payload).await;
    }
}
