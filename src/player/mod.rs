//! Player Capability
//!
//! [`Player`] is everything the bridge asks of the media player: a handful
//! of playback and tracklist commands plus the state queries needed for
//! toggle, relative volume and next-track lookahead. [`MopidyClient`] is the
//! implementation backed by Mopidy's JSON-RPC WebSocket.

mod model;
mod mopidy;

#[cfg(test)]
mod tests;

pub use model::{Album, Artist, PlaybackState, PlayerEvent, TlTrack, Track};
pub use mopidy::MopidyClient;

use std::fmt;

use async_trait::async_trait;

/// Error type for player operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// No connection to the player
    Disconnected,
    /// The player did not answer in time
    Timeout,
    /// The player rejected the call
    Rpc { code: i64, message: String },
    /// The player reported success as `false`
    Rejected(String),
    /// Playback state name the bridge does not know
    UnknownState(String),
    /// Response could not be interpreted
    InvalidResponse(String),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::Disconnected => write!(f, "Player disconnected"),
            PlayerError::Timeout => write!(f, "Player request timed out"),
            PlayerError::Rpc { code, message } => write!(f, "RPC error {}: {}", code, message),
            PlayerError::Rejected(what) => write!(f, "Player rejected {}", what),
            PlayerError::UnknownState(state) => write!(f, "Unknown playback state: {}", state),
            PlayerError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for PlayerError {}

/// Result type for player operations
pub type PlayerResult<T> = Result<T, PlayerError>;

/// Media player operations used by the bridge
///
/// Queries resolve once the player has answered; implementations bound the
/// wait themselves.
#[async_trait]
pub trait Player: Send + Sync {
    /// Remove every track from the tracklist
    async fn clear_tracklist(&self) -> PlayerResult<()>;

    /// Append a track to the tracklist
    async fn add_track(&self, uri: &str) -> PlayerResult<()>;

    /// Start (or restart) playback
    async fn play(&self) -> PlayerResult<()>;

    async fn stop(&self) -> PlayerResult<()>;

    async fn pause(&self) -> PlayerResult<()>;

    async fn resume(&self) -> PlayerResult<()>;

    async fn next(&self) -> PlayerResult<()>;

    async fn previous(&self) -> PlayerResult<()>;

    async fn get_state(&self) -> PlayerResult<PlaybackState>;

    /// Current volume, `None` when the player has no mixer
    async fn get_volume(&self) -> PlayerResult<Option<i32>>;

    /// Set the volume; range checking is the player's business
    async fn set_volume(&self, volume: i32) -> PlayerResult<()>;

    /// Track that would play after the current one
    async fn next_track(&self) -> PlayerResult<Option<Track>>;

    /// Image for the album of `track`
    ///
    /// `Ok(None)` means the album has no image, which is the common case.
    async fn album_image(&self, track: &Track) -> PlayerResult<Option<String>> {
        Ok(track.album_image().map(str::to_string))
    }
}
