//! Event Publisher
//!
//! Republishes player events as retained messages under the base topic.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::topics::{self, Topics};
use crate::bus::MessageBus;
use crate::player::{PlaybackState, Player, PlayerEvent, Track};

/// `/nextplaying` value when nothing is queued after the current track
pub const NO_NEXT: &str = "No next";

/// Publishes player state to the bus
pub struct EventPublisher {
    bus: Arc<dyn MessageBus>,
    player: Arc<dyn Player>,
    topics: Topics,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, player: Arc<dyn Player>, topics: Topics) -> Self {
        Self {
            bus,
            player,
            topics,
        }
    }

    /// Publish `value` retained on the base topic plus `suffix`
    ///
    /// Failures are logged and swallowed.
    pub async fn publish(&self, suffix: &str, value: &str) {
        let topic = self.topics.full(suffix);
        let payload = Bytes::copy_from_slice(value.as_bytes());
        match self.bus.publish(&topic, payload, true).await {
            Ok(()) => debug!(%topic, %value, "Published"),
            Err(e) => warn!(%topic, error = %e, "Publish failed"),
        }
    }

    /// Translate one player event into publishes
    pub async fn handle(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::StreamTitleChanged(title) => {
                self.publish(topics::NOW_PLAYING, &title).await;
                self.publish_next_track().await;
            }
            PlayerEvent::PlaybackStateChanged { old, new } => {
                debug!(%old, %new, "Playback state changed");
                self.publish(topics::STATE, new.as_str()).await;
                if new == PlaybackState::Stopped {
                    self.publish(topics::NOW_PLAYING, PlaybackState::Stopped.as_str())
                        .await;
                }
            }
            PlayerEvent::TrackPlaybackStarted(track) => {
                self.publish(topics::NOW_PLAYING, &track.display()).await;
                self.publish_image(&track).await;
                self.publish_next_track().await;
            }
            PlayerEvent::TracklistChanged => {
                self.publish_next_track().await;
            }
        }
    }

    async fn publish_image(&self, track: &Track) {
        match self.player.album_image(track).await {
            Ok(Some(image)) => self.publish(topics::IMAGE, &image).await,
            Ok(None) => debug!(uri = %track.uri, "No album image"),
            Err(e) => warn!(uri = %track.uri, error = %e, "Album image lookup failed"),
        }
    }

    /// Publish the track after the current one to `/nextplaying`
    pub async fn publish_next_track(&self) {
        match self.player.next_track().await {
            Ok(Some(track)) => self.publish(topics::NEXT_PLAYING, &track.display()).await,
            Ok(None) => self.publish(topics::NEXT_PLAYING, NO_NEXT).await,
            Err(e) => warn!(error = %e, "Next track lookup failed"),
        }
    }

    /// Handle events until the sender side closes
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<PlayerEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Player event stream closed");
    }
}
