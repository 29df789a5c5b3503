//! Bridge Integration Tests
//!
//! Runs the MQTT client, command router and event publisher against an
//! in-process broker speaking the wire protocol through the crate's codec.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use mopidy_mqtt::bridge::{CommandRouter, EventPublisher, Topics};
use mopidy_mqtt::bus::{BusError, ConnectionStatus, MessageBus, MqttClient};
use mopidy_mqtt::codec::{Decoder, Encoder};
use mopidy_mqtt::config::MqttConfig;
use mopidy_mqtt::player::{PlaybackState, Player, PlayerEvent, PlayerResult, Track};
use mopidy_mqtt::protocol::{ConnAck, ConnectReturnCode, Packet, Publish, QoS, SubAck};

const WAIT: Duration = Duration::from_secs(5);

/// Player that records the name of every call
#[derive(Default)]
struct RecordingPlayer {
    calls: Mutex<Vec<String>>,
}

impl RecordingPlayer {
    fn record(&self, call: impl Into<String>) -> PlayerResult<()> {
        self.calls.lock().push(call.into());
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Player for RecordingPlayer {
    async fn clear_tracklist(&self) -> PlayerResult<()> {
        self.record("clear")
    }
    async fn add_track(&self, uri: &str) -> PlayerResult<()> {
        self.record(format!("add {}", uri))
    }
    async fn play(&self) -> PlayerResult<()> {
        self.record("play")
    }
    async fn stop(&self) -> PlayerResult<()> {
        self.record("stop")
    }
    async fn pause(&self) -> PlayerResult<()> {
        self.record("pause")
    }
    async fn resume(&self) -> PlayerResult<()> {
        self.record("resume")
    }
    async fn next(&self) -> PlayerResult<()> {
        self.record("next")
    }
    async fn previous(&self) -> PlayerResult<()> {
        self.record("previous")
    }
    async fn get_state(&self) -> PlayerResult<PlaybackState> {
        Ok(PlaybackState::Playing)
    }
    async fn get_volume(&self) -> PlayerResult<Option<i32>> {
        Ok(Some(50))
    }
    async fn set_volume(&self, volume: i32) -> PlayerResult<()> {
        self.record(format!("volume {}", volume))
    }
    async fn next_track(&self) -> PlayerResult<Option<Track>> {
        Ok(None)
    }
}

/// Server side of one client connection
struct BrokerConn {
    stream: TcpStream,
    read_buf: BytesMut,
    encoder: Encoder,
    decoder: Decoder,
}

impl BrokerConn {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = timeout(WAIT, listener.accept())
            .await
            .expect("client did not connect")
            .expect("accept failed");
        Self {
            stream,
            read_buf: BytesMut::new(),
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        }
    }

    async fn send(&mut self, packet: Packet) {
        let mut buf = BytesMut::new();
        self.encoder.encode(&packet, &mut buf).expect("encode");
        self.stream.write_all(&buf).await.expect("write");
    }

    async fn recv(&mut self) -> Packet {
        loop {
            if let Some((packet, used)) = self.decoder.decode(&self.read_buf).expect("decode") {
                self.read_buf.advance(used);
                return packet;
            }
            let n = timeout(WAIT, self.stream.read_buf(&mut self.read_buf))
                .await
                .expect("timed out waiting for packet")
                .expect("read");
            assert!(n > 0, "client closed the connection");
        }
    }

    /// Receive the next PUBLISH, skipping keep-alive traffic
    async fn recv_publish(&mut self) -> Publish {
        loop {
            match self.recv().await {
                Packet::Publish(publish) => return publish,
                Packet::PingReq => self.send(Packet::PingResp).await,
                other => panic!("expected PUBLISH, got {:?}", other),
            }
        }
    }

    /// Accept CONNECT and SUBSCRIBE, returning the subscribed filters
    async fn handshake(&mut self) -> Vec<String> {
        match self.recv().await {
            Packet::Connect(_) => {}
            other => panic!("expected CONNECT, got {:?}", other),
        }
        self.send(Packet::ConnAck(ConnAck::default())).await;

        let Packet::Subscribe(subscribe) = self.recv().await else {
            panic!("expected SUBSCRIBE");
        };
        self.send(Packet::SubAck(SubAck {
            packet_id: subscribe.packet_id,
            granted: vec![Some(QoS::AtMostOnce); subscribe.subscriptions.len()],
        }))
        .await;

        subscribe
            .subscriptions
            .into_iter()
            .map(|s| s.filter)
            .collect()
    }
}

async fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

fn mqtt_config(addr: SocketAddr, topic: &str) -> MqttConfig {
    MqttConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        topic: topic.to_string(),
        reconnect_interval: 1,
        max_reconnect_interval: 2,
        connect_timeout: 5,
        ..Default::default()
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_inbound_messages_drive_player() {
    let (listener, addr) = listener().await;
    let config = mqtt_config(addr, "home/livingroom");
    let topics = Topics::new(config.topic.clone());

    let player = Arc::new(RecordingPlayer::default());
    let router = Arc::new(CommandRouter::new(player.clone(), topics.clone()));
    let client = MqttClient::spawn(config, topics.inbound(), router);

    let mut broker = BrokerConn::accept(&listener).await;
    let filters = broker.handshake().await;
    assert_eq!(
        filters,
        vec![
            "home/livingroom/play",
            "home/livingroom/add",
            "home/livingroom/control",
            "home/livingroom/volume",
        ]
    );

    for (suffix, payload) in [
        ("/play", "spotify:track:1"),
        ("/control", "bogus"),
        ("/volume", "+5"),
        ("/add", "spotify:track:2"),
    ] {
        broker
            .send(Packet::Publish(Publish {
                topic: topics.full(suffix),
                payload: Bytes::from(payload),
                ..Default::default()
            }))
            .await;
    }

    wait_for(|| player.calls().len() >= 5).await;
    assert_eq!(
        player.calls(),
        vec![
            "clear",
            "add spotify:track:1",
            "play",
            "volume 55",
            "add spotify:track:2",
        ]
    );

    client.shutdown().await;
    assert_eq!(broker.recv().await, Packet::Disconnect);
}

#[tokio::test]
async fn test_qos1_delivery_is_acknowledged() {
    let (listener, addr) = listener().await;
    let config = mqtt_config(addr, "mopidy");
    let topics = Topics::new(config.topic.clone());

    let player = Arc::new(RecordingPlayer::default());
    let router = Arc::new(CommandRouter::new(player.clone(), topics.clone()));
    let client = MqttClient::spawn(config, topics.inbound(), router);

    let mut broker = BrokerConn::accept(&listener).await;
    broker.handshake().await;
    broker
        .send(Packet::Publish(Publish {
            qos: QoS::AtLeastOnce,
            packet_id: Some(42),
            topic: "mopidy/control".to_string(),
            payload: Bytes::from_static(b"next"),
            ..Default::default()
        }))
        .await;

    match broker.recv().await {
        Packet::PubAck(ack) => assert_eq!(ack.packet_id, 42),
        other => panic!("expected PUBACK, got {:?}", other),
    }
    assert_eq!(player.calls(), vec!["next"]);

    client.shutdown().await;
}

#[tokio::test]
async fn test_events_are_published_retained() {
    let (listener, addr) = listener().await;
    let config = mqtt_config(addr, "mopidy");
    let topics = Topics::new(config.topic.clone());

    let player = Arc::new(RecordingPlayer::default());
    let router = Arc::new(CommandRouter::new(player.clone(), topics.clone()));
    let client = MqttClient::spawn(config, topics.inbound(), router);

    let mut broker = BrokerConn::accept(&listener).await;
    broker.handshake().await;
    wait_for(|| client.status() == ConnectionStatus::Connected).await;

    let publisher = EventPublisher::new(client.clone(), player.clone(), topics);
    publisher
        .handle(PlayerEvent::PlaybackStateChanged {
            old: PlaybackState::Playing,
            new: PlaybackState::Stopped,
        })
        .await;
    publisher.handle(PlayerEvent::TracklistChanged).await;

    let expected = [
        ("mopidy/state", "stopped"),
        ("mopidy/nowplaying", "stopped"),
        ("mopidy/nextplaying", "No next"),
    ];
    for (topic, value) in expected {
        let publish = broker.recv_publish().await;
        assert_eq!(publish.topic, topic);
        assert_eq!(publish.payload, Bytes::from(value));
        assert!(publish.retain);
        assert_eq!(publish.qos, QoS::AtMostOnce);
    }

    client.shutdown().await;
}

#[tokio::test]
async fn test_credentials_are_sent() {
    let (listener, addr) = listener().await;
    let mut config = mqtt_config(addr, "mopidy");
    config.username = Some("user".to_string());
    config.password = Some("secret".to_string());
    config.client_id_prefix = "kitchen".to_string();

    let player = Arc::new(RecordingPlayer::default());
    let router = Arc::new(CommandRouter::new(player, Topics::new("mopidy")));
    let client = MqttClient::spawn(config, vec![], router);

    let mut broker = BrokerConn::accept(&listener).await;
    let Packet::Connect(connect) = broker.recv().await else {
        panic!("expected CONNECT");
    };
    assert_eq!(connect.username.as_deref(), Some("user"));
    assert_eq!(connect.password, Some(Bytes::from_static(b"secret")));
    assert!(connect.client_id.starts_with("kitchen-"));
    assert!(connect.clean_session);

    broker.send(Packet::ConnAck(ConnAck::default())).await;
    wait_for(|| client.status() == ConnectionStatus::Connected).await;
    client.shutdown().await;
    assert_eq!(broker.recv().await, Packet::Disconnect);
}

#[tokio::test]
async fn test_reconnects_after_refused_connack() {
    let (listener, addr) = listener().await;
    let config = mqtt_config(addr, "mopidy");
    let topics = Topics::new(config.topic.clone());

    let router = Arc::new(CommandRouter::new(
        Arc::new(RecordingPlayer::default()),
        topics.clone(),
    ));
    let client = MqttClient::spawn(config, topics.inbound(), router);

    let mut first = BrokerConn::accept(&listener).await;
    assert!(matches!(first.recv().await, Packet::Connect(_)));
    first
        .send(Packet::ConnAck(ConnAck {
            session_present: false,
            return_code: ConnectReturnCode::NotAuthorized,
        }))
        .await;

    // Retried after the reconnect interval
    let mut second = BrokerConn::accept(&listener).await;
    let filters = second.handshake().await;
    assert_eq!(filters.len(), 4);
    wait_for(|| client.status() == ConnectionStatus::Connected).await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_publish_without_connection_fails() {
    // Bound but never accepting a session: the client stays in handshake
    let (listener, addr) = listener().await;
    let mut config = mqtt_config(addr, "mopidy");
    config.connect_timeout = 1;
    let router = Arc::new(CommandRouter::new(
        Arc::new(RecordingPlayer::default()),
        Topics::new("mopidy"),
    ));
    let client = MqttClient::spawn(config, vec![], router);

    let result = client
        .publish("mopidy/state", Bytes::from_static(b"playing"), true)
        .await;
    assert!(matches!(result, Err(BusError::NotConnected)));

    client.shutdown().await;
    drop(listener);
}

#[tokio::test]
async fn test_shutdown_aborts_stalled_handshake() {
    let (listener, addr) = listener().await;
    let mut config = mqtt_config(addr, "mopidy");
    config.connect_timeout = 30;
    let router = Arc::new(CommandRouter::new(
        Arc::new(RecordingPlayer::default()),
        Topics::new("mopidy"),
    ));
    let client = MqttClient::spawn(config, vec![], router);

    // Take CONNECT but never answer it
    let mut broker = BrokerConn::accept(&listener).await;
    assert!(matches!(broker.recv().await, Packet::Connect(_)));

    timeout(Duration::from_secs(8), client.shutdown())
        .await
        .expect("shutdown waited on the connect timeout");
    assert_ne!(client.status(), ConnectionStatus::Connected);

    // The aborted task drops its socket
    let mut rest = [0u8; 16];
    let n = timeout(WAIT, broker.stream.read(&mut rest))
        .await
        .expect("socket still open after shutdown")
        .expect("read");
    assert_eq!(n, 0);
}
