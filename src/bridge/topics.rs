//! Topic namespace
//!
//! Every topic the bridge uses is the configured base topic with one of the
//! fixed suffixes below appended directly (no separator is inserted).

/// Inbound: clear the tracklist, enqueue a URI and start playback
pub const PLAY: &str = "/play";
/// Inbound: enqueue a URI
pub const ADD: &str = "/add";
/// Inbound: playback control keyword
pub const CONTROL: &str = "/control";
/// Inbound: absolute or relative volume
pub const VOLUME: &str = "/volume";

/// Outbound: current track display string, or `stopped`
pub const NOW_PLAYING: &str = "/nowplaying";
/// Outbound: next track display string, or `No next`
pub const NEXT_PLAYING: &str = "/nextplaying";
/// Outbound: playback state name
pub const STATE: &str = "/state";
/// Outbound: album art URI
pub const IMAGE: &str = "/image";

/// Suffixes the bridge subscribes to
pub const INBOUND: [&str; 4] = [PLAY, ADD, CONTROL, VOLUME];

/// Base topic plus suffix arithmetic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Full topic for `suffix`
    pub fn full(&self, suffix: &str) -> String {
        let mut topic = String::with_capacity(self.base.len() + suffix.len());
        topic.push_str(&self.base);
        topic.push_str(suffix);
        topic
    }

    /// Suffix of `topic` relative to the base, `None` outside the namespace
    pub fn suffix<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic.strip_prefix(self.base.as_str())
    }

    /// Full topics to subscribe to
    pub fn inbound(&self) -> Vec<String> {
        INBOUND.iter().map(|suffix| self.full(suffix)).collect()
    }
}
