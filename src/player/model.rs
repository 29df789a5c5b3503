//! Player data model
//!
//! Field names follow Mopidy's JSON serialization so the types decode
//! straight from JSON-RPC results and events.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::PlayerError;

/// Current playback state of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaybackState {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playing" => Ok(PlaybackState::Playing),
            "paused" => Ok(PlaybackState::Paused),
            "stopped" => Ok(PlaybackState::Stopped),
            other => Err(PlayerError::UnknownState(other.to_string())),
        }
    }
}

/// Track artist
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub name: String,
}

/// Album a track belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: String,
    /// Image URIs attached to the album, in no particular order
    #[serde(default)]
    pub images: Vec<String>,
}

/// A playable track
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<Album>,
}

impl Track {
    /// `"<artists>:<name>"`, artists sorted ascending and joined by `", "`
    pub fn display(&self) -> String {
        let mut artists: Vec<&str> = self.artists.iter().map(|a| a.name.as_str()).collect();
        artists.sort_unstable();
        format!("{}:{}", artists.join(", "), self.name)
    }

    /// First image of the track's album, if the album carries any
    pub fn album_image(&self) -> Option<&str> {
        self.album
            .as_ref()
            .and_then(|album| album.images.first())
            .map(String::as_str)
    }
}

/// Tracklist entry: a track plus its tracklist id
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlTrack {
    pub tlid: u64,
    pub track: Track,
}

/// State change notification from the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A track started playing
    TrackPlaybackStarted(Track),
    /// Playback state changed
    PlaybackStateChanged {
        old: PlaybackState,
        new: PlaybackState,
    },
    /// The current stream reported a new title
    StreamTitleChanged(String),
    /// The tracklist was modified
    TracklistChanged,
}
