//! Player module tests

use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

use super::mopidy::{first_image, parse_frame, parse_volume, Frame};
use super::*;

fn artist(name: &str) -> Artist {
    Artist {
        name: name.to_string(),
    }
}

#[test]
fn test_track_display_sorts_artists() {
    let track = Track {
        name: "Song".to_string(),
        artists: vec![artist("Bob"), artist("Alice")],
        ..Default::default()
    };
    assert_eq!(track.display(), "Alice, Bob:Song");
}

#[test]
fn test_track_display_without_artists() {
    let track = Track {
        name: "Intro".to_string(),
        ..Default::default()
    };
    assert_eq!(track.display(), ":Intro");
}

#[test]
fn test_track_album_image() {
    let mut track = Track::default();
    assert_eq!(track.album_image(), None);

    track.album = Some(Album {
        name: "Album".to_string(),
        images: vec![],
    });
    assert_eq!(track.album_image(), None);

    track.album = Some(Album {
        name: "Album".to_string(),
        images: vec!["http://img/1.jpg".to_string(), "http://img/2.jpg".to_string()],
    });
    assert_eq!(track.album_image(), Some("http://img/1.jpg"));
}

#[test_case("playing", PlaybackState::Playing)]
#[test_case("paused", PlaybackState::Paused)]
#[test_case("stopped", PlaybackState::Stopped)]
fn test_playback_state_roundtrip(name: &str, state: PlaybackState) {
    assert_eq!(name.parse::<PlaybackState>(), Ok(state));
    assert_eq!(state.as_str(), name);
    assert_eq!(state.to_string(), name);
}

#[test]
fn test_playback_state_unknown() {
    assert_eq!(
        "buffering".parse::<PlaybackState>(),
        Err(PlayerError::UnknownState("buffering".to_string()))
    );
}

#[test]
fn test_parse_result_response() {
    let frame = parse_frame(r#"{"jsonrpc":"2.0","id":7,"result":"playing"}"#).unwrap();
    assert_eq!(
        frame,
        Frame::Response {
            id: 7,
            result: Ok(json!("playing"))
        }
    );
}

#[test]
fn test_parse_null_result_response() {
    let frame = parse_frame(r#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
    assert_eq!(
        frame,
        Frame::Response {
            id: 3,
            result: Ok(serde_json::Value::Null)
        }
    );
}

#[test]
fn test_parse_error_response() {
    let frame = parse_frame(
        r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"Method not found"}}"#,
    )
    .unwrap();
    assert_eq!(
        frame,
        Frame::Response {
            id: 4,
            result: Err(PlayerError::Rpc {
                code: -32601,
                message: "Method not found".to_string()
            })
        }
    );
}

#[test]
fn test_parse_track_playback_started() {
    let text = json!({
        "event": "track_playback_started",
        "tl_track": {
            "__model__": "TlTrack",
            "tlid": 12,
            "track": {
                "__model__": "Track",
                "uri": "local:track:song.mp3",
                "name": "Song",
                "artists": [
                    {"__model__": "Artist", "name": "Zed"},
                    {"__model__": "Artist", "name": "Amy"}
                ],
                "album": {"__model__": "Album", "name": "Record", "images": ["http://img/a.png"]},
                "length": 215000
            }
        }
    })
    .to_string();

    let Frame::Event(Some(PlayerEvent::TrackPlaybackStarted(track))) = parse_frame(&text).unwrap()
    else {
        panic!("expected track_playback_started");
    };
    assert_eq!(track.uri, "local:track:song.mp3");
    assert_eq!(track.display(), "Amy, Zed:Song");
    assert_eq!(track.album_image(), Some("http://img/a.png"));
}

#[test]
fn test_parse_state_changed() {
    let text = r#"{"event":"playback_state_changed","old_state":"paused","new_state":"playing"}"#;
    assert_eq!(
        parse_frame(text).unwrap(),
        Frame::Event(Some(PlayerEvent::PlaybackStateChanged {
            old: PlaybackState::Paused,
            new: PlaybackState::Playing,
        }))
    );
}

#[test]
fn test_parse_stream_title_and_tracklist() {
    assert_eq!(
        parse_frame(r#"{"event":"stream_title_changed","title":"Live Set"}"#).unwrap(),
        Frame::Event(Some(PlayerEvent::StreamTitleChanged("Live Set".to_string())))
    );
    assert_eq!(
        parse_frame(r#"{"event":"tracklist_changed"}"#).unwrap(),
        Frame::Event(Some(PlayerEvent::TracklistChanged))
    );
}

#[test]
fn test_parse_ignored_event() {
    assert_eq!(
        parse_frame(r#"{"event":"volume_changed","volume":40}"#).unwrap(),
        Frame::Event(None)
    );
}

#[test]
fn test_parse_invalid_frames() {
    assert!(matches!(
        parse_frame("not json"),
        Err(PlayerError::InvalidResponse(_))
    ));
    assert!(matches!(
        parse_frame(r#"{"jsonrpc":"2.0","result":1}"#),
        Err(PlayerError::InvalidResponse(_))
    ));
    assert!(matches!(
        parse_frame(r#"{"event":"playback_state_changed","old_state":"x","new_state":"playing"}"#),
        Err(PlayerError::InvalidResponse(_))
    ));
}

#[test]
fn test_parse_volume() {
    assert_eq!(parse_volume(json!(null)), Ok(None));
    assert_eq!(parse_volume(json!(55)), Ok(Some(55)));
    assert!(parse_volume(json!("loud")).is_err());
    assert!(parse_volume(json!(1.5)).is_err());
}

#[test]
fn test_first_image() {
    let result = json!({
        "local:track:a": [
            {"__model__": "Image", "uri": "http://img/small.jpg", "width": 64},
            {"__model__": "Image", "uri": "http://img/large.jpg", "width": 640}
        ],
        "local:track:b": []
    });
    assert_eq!(
        first_image(&result, "local:track:a"),
        Some("http://img/small.jpg".to_string())
    );
    assert_eq!(first_image(&result, "local:track:b"), None);
    assert_eq!(first_image(&result, "local:track:c"), None);
}

#[tokio::test]
async fn test_disconnected_client_fails_fast() {
    let (events_tx, _events_rx) = tokio::sync::mpsc::unbounded_channel();
    let config = crate::config::MopidyConfig {
        // Nothing listens on the discard port
        url: "ws://127.0.0.1:9/mopidy/ws".to_string(),
        ..Default::default()
    };
    let client = MopidyClient::spawn(config, events_tx);

    assert!(!client.is_connected());
    assert_eq!(client.play().await, Err(PlayerError::Disconnected));

    client.shutdown().await;
}
