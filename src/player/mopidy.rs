//! Mopidy JSON-RPC Client
//!
//! Talks to Mopidy's `/mopidy/ws` endpoint. Requests are JSON-RPC 2.0 calls
//! correlated by id; anything carrying an `event` field is a player event and
//! is forwarded to the bridge.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, trace, warn};

use super::{PlaybackState, Player, PlayerError, PlayerEvent, PlayerResult, TlTrack, Track};
use crate::config::MopidyConfig;

type PendingMap = DashMap<u64, oneshot::Sender<PlayerResult<Value>>>;

/// How long `shutdown` waits for the connection task
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on the WebSocket handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Mopidy client
///
/// Created with [`MopidyClient::spawn`]. Calls made while the WebSocket is
/// down fail immediately with [`PlayerError::Disconnected`].
pub struct MopidyClient {
    config: MopidyConfig,
    next_id: AtomicU64,
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// State shared with the connection task
struct Shared {
    /// Requests awaiting a response, by JSON-RPC id
    pending: PendingMap,
    /// Writer of the live connection
    outgoing: RwLock<Option<mpsc::UnboundedSender<Message>>>,
}

impl Shared {
    fn fail_pending(&self) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(PlayerError::Disconnected));
            }
        }
    }
}

/// A decoded text frame from Mopidy
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    Response { id: u64, result: PlayerResult<Value> },
    /// `None` for events the bridge does not care about
    Event(Option<PlayerEvent>),
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum MopidyEvent {
    TrackPlaybackStarted {
        tl_track: TlTrack,
    },
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
    },
    StreamTitleChanged {
        title: String,
    },
    TracklistChanged,
    #[serde(other)]
    Other,
}

impl MopidyEvent {
    fn into_player_event(self) -> Option<PlayerEvent> {
        match self {
            MopidyEvent::TrackPlaybackStarted { tl_track } => {
                Some(PlayerEvent::TrackPlaybackStarted(tl_track.track))
            }
            MopidyEvent::PlaybackStateChanged {
                old_state,
                new_state,
            } => Some(PlayerEvent::PlaybackStateChanged {
                old: old_state,
                new: new_state,
            }),
            MopidyEvent::StreamTitleChanged { title } => {
                Some(PlayerEvent::StreamTitleChanged(title))
            }
            MopidyEvent::TracklistChanged => Some(PlayerEvent::TracklistChanged),
            MopidyEvent::Other => None,
        }
    }
}

/// Decode one text frame
pub(crate) fn parse_frame(text: &str) -> PlayerResult<Frame> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| PlayerError::InvalidResponse(e.to_string()))?;

    if value.get("event").is_some() {
        let event: MopidyEvent = serde_json::from_value(value)
            .map_err(|e| PlayerError::InvalidResponse(e.to_string()))?;
        return Ok(Frame::Event(event.into_player_event()));
    }

    let response: RpcResponse =
        serde_json::from_value(value).map_err(|e| PlayerError::InvalidResponse(e.to_string()))?;
    let result = match response.error {
        Some(err) => Err(PlayerError::Rpc {
            code: err.code,
            message: err.message,
        }),
        None => Ok(response.result),
    };
    Ok(Frame::Response {
        id: response.id,
        result,
    })
}

/// Interpret a `get_volume` result; `null` means no mixer
pub(crate) fn parse_volume(value: Value) -> PlayerResult<Option<i32>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| PlayerError::InvalidResponse(format!("volume {}", n))),
        other => Err(PlayerError::InvalidResponse(format!("volume {}", other))),
    }
}

/// First image URI for `uri` in a `core.library.get_images` result
pub(crate) fn first_image(result: &Value, uri: &str) -> Option<String> {
    result
        .get(uri)?
        .as_array()?
        .iter()
        .find_map(|image| image.get("uri").and_then(Value::as_str))
        .map(str::to_string)
}

impl MopidyClient {
    /// Spawn the connection task; events are sent on `events`
    pub fn spawn(config: MopidyConfig, events: mpsc::UnboundedSender<PlayerEvent>) -> Arc<Self> {
        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            outgoing: RwLock::new(None),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run(config.clone(), shared.clone(), events, shutdown_rx));

        Arc::new(Self {
            config,
            next_id: AtomicU64::new(1),
            shared,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        })
    }

    /// Whether the WebSocket is currently up
    pub fn is_connected(&self) -> bool {
        self.shared.outgoing.read().is_some()
    }

    /// Close the WebSocket and stop reconnecting
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().take();
        if let Some(mut task) = task {
            if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(url = %self.config.url, "Mopidy client did not stop in time, aborting");
                task.abort();
            }
        }
    }

    /// Perform one JSON-RPC call
    pub async fn call(&self, method: &str, params: Value) -> PlayerResult<Value> {
        let sender = self
            .shared
            .outgoing
            .read()
            .clone()
            .ok_or(PlayerError::Disconnected)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(id, tx);

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(id, method, "JSON-RPC request");

        if sender.send(Message::Text(request.to_string())).is_err() {
            self.shared.pending.remove(&id);
            return Err(PlayerError::Disconnected);
        }

        match timeout(self.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PlayerError::Disconnected),
            Err(_) => {
                self.shared.pending.remove(&id);
                debug!(id, method, "JSON-RPC request timed out");
                Err(PlayerError::Timeout)
            }
        }
    }

    async fn call_unit(&self, method: &str) -> PlayerResult<()> {
        self.call(method, json!({})).await.map(|_| ())
    }
}

#[async_trait]
impl Player for MopidyClient {
    async fn clear_tracklist(&self) -> PlayerResult<()> {
        self.call_unit("core.tracklist.clear").await
    }

    async fn add_track(&self, uri: &str) -> PlayerResult<()> {
        self.call("core.tracklist.add", json!({ "uris": [uri] }))
            .await
            .map(|_| ())
    }

    async fn play(&self) -> PlayerResult<()> {
        self.call_unit("core.playback.play").await
    }

    async fn stop(&self) -> PlayerResult<()> {
        self.call_unit("core.playback.stop").await
    }

    async fn pause(&self) -> PlayerResult<()> {
        self.call_unit("core.playback.pause").await
    }

    async fn resume(&self) -> PlayerResult<()> {
        self.call_unit("core.playback.resume").await
    }

    async fn next(&self) -> PlayerResult<()> {
        self.call_unit("core.playback.next").await
    }

    async fn previous(&self) -> PlayerResult<()> {
        self.call_unit("core.playback.previous").await
    }

    async fn get_state(&self) -> PlayerResult<PlaybackState> {
        match self.call("core.playback.get_state", json!({})).await? {
            Value::String(state) => state.parse(),
            other => Err(PlayerError::InvalidResponse(format!("state {}", other))),
        }
    }

    async fn get_volume(&self) -> PlayerResult<Option<i32>> {
        parse_volume(self.call("core.mixer.get_volume", json!({})).await?)
    }

    async fn set_volume(&self, volume: i32) -> PlayerResult<()> {
        match self
            .call("core.mixer.set_volume", json!({ "volume": volume }))
            .await?
        {
            Value::Bool(false) => Err(PlayerError::Rejected(format!("volume {}", volume))),
            _ => Ok(()),
        }
    }

    async fn next_track(&self) -> PlayerResult<Option<Track>> {
        let current = self
            .call("core.playback.get_current_tl_track", json!({}))
            .await?;
        let next = self
            .call("core.tracklist.next_track", json!({ "tl_track": current }))
            .await?;
        if next.is_null() {
            return Ok(None);
        }
        let tl_track: TlTrack =
            serde_json::from_value(next).map_err(|e| PlayerError::InvalidResponse(e.to_string()))?;
        Ok(Some(tl_track.track))
    }

    async fn album_image(&self, track: &Track) -> PlayerResult<Option<String>> {
        if let Some(image) = track.album_image() {
            return Ok(Some(image.to_string()));
        }
        if track.uri.is_empty() {
            return Ok(None);
        }
        let result = self
            .call("core.library.get_images", json!({ "uris": [track.uri] }))
            .await?;
        Ok(first_image(&result, &track.uri))
    }
}

/// Connection loop: connect, pump frames, back off, repeat
async fn run(
    config: MopidyConfig,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<PlayerEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        debug!(url = %config.url, "Connecting to Mopidy");

        match connect_and_run(&config, &shared, &events, &mut shutdown_rx).await {
            Ok(()) => {
                info!(url = %config.url, "Disconnected from Mopidy");
                return;
            }
            Err(e) => {
                error!(url = %config.url, error = %e, "Mopidy connection failed");
            }
        }

        *shared.outgoing.write() = None;
        shared.fail_pending();

        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_interval) => {}
            _ = shutdown_rx.changed() => {
                info!(url = %config.url, "Shutdown requested");
                return;
            }
        }
    }
}

async fn connect_and_run(
    config: &MopidyConfig,
    shared: &Shared,
    events: &mpsc::UnboundedSender<PlayerEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), String> {
    let (ws, _) = timeout(
        CONNECT_TIMEOUT,
        tokio_tungstenite::connect_async(config.url.as_str()),
    )
    .await
    .map_err(|_| "connect timed out".to_string())?
    .map_err(|e| e.to_string())?;
    info!(url = %config.url, "Connected to Mopidy");

    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    *shared.outgoing.write() = Some(out_tx);

    loop {
        tokio::select! {
            msg = out_rx.recv() => {
                let Some(msg) = msg else {
                    return Err("writer closed".to_string());
                };
                sink.send(msg).await.map_err(|e| e.to_string())?;
            }

            frame = stream.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => return Err(e.to_string()),
                    None => return Err("connection closed".to_string()),
                };
                match msg {
                    Message::Text(text) => dispatch(&text, shared, events),
                    Message::Close(_) => return Err("closed by server".to_string()),
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
                }
            }

            _ = shutdown_rx.changed() => {
                *shared.outgoing.write() = None;
                shared.fail_pending();
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}

fn dispatch(text: &str, shared: &Shared, events: &mpsc::UnboundedSender<PlayerEvent>) {
    match parse_frame(text) {
        Ok(Frame::Response { id, result }) => match shared.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(result);
            }
            None => debug!(id, "Response for unknown request"),
        },
        Ok(Frame::Event(Some(event))) => {
            trace!(?event, "Player event");
            if events.send(event).is_err() {
                debug!("Event receiver dropped");
            }
        }
        Ok(Frame::Event(None)) => {}
        Err(e) => warn!(error = %e, "Unparseable frame from Mopidy"),
    }
}
