//! MQTT Client
//!
//! Keeps a single connection to the broker alive, subscribes the bridge's
//! inbound topics after every successful CONNECT and relays publishes from
//! the rest of the bridge.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::{BusError, ConnectionStatus, InboundHandler, MessageBus};
use crate::codec::{Decoder, Encoder};
use crate::config::MqttConfig;
use crate::protocol::{Connect, Packet, PubAck, Publish, QoS, Subscribe, Subscription};

/// How long `shutdown` waits for the DISCONNECT to be flushed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Message to send to the connection task
#[derive(Debug)]
enum ClientCommand {
    /// Publish a message to the broker
    Publish {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    /// Disconnect and stop reconnecting
    Shutdown,
}

/// MQTT client owned by the bridge
///
/// Created with [`MqttClient::spawn`], which starts the background
/// connection task. Publishes go through a command channel so the client can
/// be shared freely between tasks.
pub struct MqttClient {
    /// Connection configuration
    config: MqttConfig,
    /// Current connection status
    status: Arc<RwLock<ConnectionStatus>>,
    /// Command channel to the connection task
    command_tx: mpsc::Sender<ClientCommand>,
    /// Connection task, taken on shutdown
    task: Mutex<Option<JoinHandle<()>>>,
}

/// State shared by every connection attempt
struct Connection {
    config: MqttConfig,
    subscriptions: Vec<String>,
    status: Arc<RwLock<ConnectionStatus>>,
    handler: Arc<dyn InboundHandler>,
    encoder: Encoder,
    decoder: Decoder,
}

impl MqttClient {
    /// Spawn the connection task
    ///
    /// `subscriptions` are full topic filters subscribed on every connect;
    /// messages on them are handed to `handler` one at a time.
    pub fn spawn(
        config: MqttConfig,
        subscriptions: Vec<String>,
        handler: Arc<dyn InboundHandler>,
    ) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::channel(1000);
        let status = Arc::new(RwLock::new(ConnectionStatus::Disconnected));

        let connection = Connection {
            config: config.clone(),
            subscriptions,
            status: status.clone(),
            handler,
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        };

        let task = tokio::spawn(connection.run(command_rx));

        Arc::new(Self {
            config,
            status,
            command_tx,
            task: Mutex::new(Some(task)),
        })
    }

    /// Get the current connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    /// Broker address this client connects to
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Send DISCONNECT and stop the connection task
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(ClientCommand::Shutdown).await;

        let task = self.task.lock().take();
        if let Some(mut task) = task {
            if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(broker = %self.config.address(), "MQTT client did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

#[async_trait]
impl MessageBus for MqttClient {
    async fn publish(&self, topic: &str, payload: Bytes, retain: bool) -> Result<(), BusError> {
        if self.status() != ConnectionStatus::Connected {
            return Err(BusError::NotConnected);
        }

        self.command_tx
            .send(ClientCommand::Publish {
                topic: topic.to_string(),
                payload,
                retain,
            })
            .await
            .map_err(|_| BusError::Closed)
    }
}

impl Connection {
    /// Run the connection loop until shutdown
    async fn run(self, mut command_rx: mpsc::Receiver<ClientCommand>) {
        let mut retry_interval = self.config.reconnect_interval_duration();
        let max_retry = self.config.max_reconnect_interval_duration();
        let address = self.config.address();

        loop {
            self.set_status(ConnectionStatus::Connecting);
            debug!(broker = %address, "Connecting to MQTT broker");

            match self.connect_and_run(&mut command_rx).await {
                Ok(()) => {
                    info!(broker = %address, "Disconnected from MQTT broker");
                    self.set_status(ConnectionStatus::Disconnected);
                    return;
                }
                Err(BusError::Closed) => {
                    self.set_status(ConnectionStatus::Disconnected);
                    return;
                }
                Err(e) => {
                    if *self.status.read() == ConnectionStatus::Connected {
                        retry_interval = self.config.reconnect_interval_duration();
                    }
                    error!(broker = %address, error = %e, "MQTT connection failed");
                    self.set_status(ConnectionStatus::Backoff);
                    debug!(broker = %address, delay = ?retry_interval, "Reconnecting");
                }
            }

            // Back off, but stay responsive to shutdown
            let sleep = tokio::time::sleep(retry_interval);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = command_rx.recv() => match cmd {
                        Some(ClientCommand::Publish { topic, .. }) => {
                            debug!(%topic, "Dropping publish while disconnected");
                        }
                        Some(ClientCommand::Shutdown) | None => {
                            info!(broker = %address, "Shutdown requested");
                            self.set_status(ConnectionStatus::Disconnected);
                            return;
                        }
                    },
                }
            }
            retry_interval = std::cmp::min(retry_interval * 2, max_retry);
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write() = status;
    }

    async fn write_packet(
        &self,
        write_half: &mut OwnedWriteHalf,
        buf: &mut BytesMut,
        packet: &Packet,
    ) -> Result<(), BusError> {
        buf.clear();
        self.encoder
            .encode(packet, buf)
            .map_err(|e| BusError::Other(format!("Encode error: {}", e)))?;
        write_half
            .write_all(buf)
            .await
            .map_err(|e| BusError::ConnectionLost(e.to_string()))
    }

    /// Pop the next complete packet off `read_buf`, if any
    fn next_packet(&self, read_buf: &mut BytesMut) -> Result<Option<Packet>, BusError> {
        match self.decoder.decode(read_buf) {
            Ok(Some((packet, used))) => {
                read_buf.advance(used);
                Ok(Some(packet))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(BusError::Other(format!("Decode error: {}", e))),
        }
    }

    async fn fill(read_half: &mut OwnedReadHalf, read_buf: &mut BytesMut) -> Result<(), BusError> {
        let n = read_half
            .read_buf(read_buf)
            .await
            .map_err(|e| BusError::ConnectionLost(e.to_string()))?;
        if n == 0 {
            return Err(BusError::ConnectionLost("Connection closed".to_string()));
        }
        Ok(())
    }

    /// Read until one complete packet is buffered
    async fn read_packet(
        &self,
        read_half: &mut OwnedReadHalf,
        read_buf: &mut BytesMut,
    ) -> Result<Packet, BusError> {
        loop {
            if let Some(packet) = self.next_packet(read_buf)? {
                return Ok(packet);
            }
            Self::fill(read_half, read_buf).await?;
        }
    }

    /// TCP connect, CONNECT/CONNACK exchange and SUBSCRIBE
    async fn handshake(
        &self,
        read_buf: &mut BytesMut,
        buf: &mut BytesMut,
    ) -> Result<(OwnedReadHalf, OwnedWriteHalf), BusError> {
        let connect_timeout = self.config.connect_timeout_duration();

        let stream = timeout(connect_timeout, TcpStream::connect(self.config.address()))
            .await
            .map_err(|_| BusError::Timeout)?
            .map_err(|e| BusError::ConnectionLost(e.to_string()))?;
        let (mut read_half, mut write_half) = stream.into_split();

        let credentials = self.config.credentials();
        let client_id = self.config.client_id();
        let connect = Packet::Connect(Box::new(Connect {
            client_id: client_id.clone(),
            clean_session: true,
            keep_alive: self.config.keepalive,
            username: credentials.map(|(user, _)| user.to_string()),
            password: credentials.map(|(_, pass)| Bytes::copy_from_slice(pass.as_bytes())),
        }));
        self.write_packet(&mut write_half, buf, &connect).await?;
        debug!(%client_id, authenticated = credentials.is_some(), "CONNECT sent");

        let connack = timeout(connect_timeout, self.read_packet(&mut read_half, read_buf))
            .await
            .map_err(|_| BusError::Timeout)??;

        match connack {
            Packet::ConnAck(connack) if connack.return_code.is_accepted() => {
                info!(
                    broker = %self.config.address(),
                    %client_id,
                    session_present = connack.session_present,
                    "Connected to MQTT broker"
                );
            }
            Packet::ConnAck(connack) => {
                return Err(BusError::Rejected(format!(
                    "CONNACK failed: {:?}",
                    connack.return_code
                )));
            }
            other => {
                return Err(BusError::Other(format!(
                    "Expected CONNACK, got packet type {}",
                    other.packet_type()
                )));
            }
        }

        if !self.subscriptions.is_empty() {
            let subscribe = Packet::Subscribe(Subscribe {
                packet_id: 1,
                subscriptions: self
                    .subscriptions
                    .iter()
                    .map(|filter| Subscription {
                        filter: filter.clone(),
                        qos: QoS::AtMostOnce,
                    })
                    .collect(),
            });
            self.write_packet(&mut write_half, buf, &subscribe).await?;
            for filter in &self.subscriptions {
                info!(topic = %filter, "Subscribing");
            }
        }

        Ok((read_half, write_half))
    }

    /// Connect to the broker and run the message loop
    ///
    /// Returns `Ok(())` once shutdown was requested and DISCONNECT sent.
    async fn connect_and_run(
        &self,
        command_rx: &mut mpsc::Receiver<ClientCommand>,
    ) -> Result<(), BusError> {
        let mut read_buf = BytesMut::with_capacity(4096);
        let mut buf = BytesMut::new();

        let (mut read_half, mut write_half) = self.handshake(&mut read_buf, &mut buf).await?;
        self.set_status(ConnectionStatus::Connected);

        let keepalive_interval = Duration::from_secs(self.config.keepalive as u64);
        let mut keepalive_timer = tokio::time::interval(keepalive_interval);
        keepalive_timer.reset();
        let mut awaiting_pingresp = false;

        loop {
            // Packets that arrived together with the CONNACK or a previous read
            while let Some(packet) = self.next_packet(&mut read_buf)? {
                match packet {
                    Packet::Publish(publish) => {
                        self.deliver(publish, &mut write_half, &mut buf).await?;
                    }
                    Packet::PingResp => {
                        awaiting_pingresp = false;
                        debug!("PINGRESP received");
                    }
                    Packet::SubAck(suback) => {
                        let refused = suback.refused();
                        if refused > 0 {
                            warn!(refused, "Broker refused subscriptions");
                        } else {
                            debug!(granted = suback.granted.len(), "SUBACK received");
                        }
                    }
                    Packet::PubAck(_) => {
                        debug!("PUBACK received");
                    }
                    other => {
                        return Err(BusError::Other(format!(
                            "Unexpected packet type {} from broker",
                            other.packet_type()
                        )));
                    }
                }
            }

            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::Publish { topic, payload, retain }) => {
                            let publish = Packet::Publish(Publish {
                                qos: QoS::AtMostOnce,
                                retain,
                                topic,
                                payload,
                                ..Default::default()
                            });
                            self.write_packet(&mut write_half, &mut buf, &publish).await?;
                        }
                        Some(ClientCommand::Shutdown) => {
                            let _ = self.write_packet(&mut write_half, &mut buf, &Packet::Disconnect).await;
                            let _ = write_half.shutdown().await;
                            return Ok(());
                        }
                        None => return Err(BusError::Closed),
                    }
                }

                result = Self::fill(&mut read_half, &mut read_buf) => {
                    result?;
                }

                _ = keepalive_timer.tick() => {
                    if awaiting_pingresp {
                        return Err(BusError::ConnectionLost("Keep-alive timeout".to_string()));
                    }
                    self.write_packet(&mut write_half, &mut buf, &Packet::PingReq).await?;
                    awaiting_pingresp = true;
                }
            }
        }
    }

    /// Hand an inbound PUBLISH to the handler and acknowledge it
    async fn deliver(
        &self,
        publish: Publish,
        write_half: &mut OwnedWriteHalf,
        buf: &mut BytesMut,
    ) -> Result<(), BusError> {
        debug!(topic = %publish.topic, bytes = publish.payload.len(), "Message received");
        self.handler
            .on_message(&publish.topic, publish.payload)
            .await;

        if publish.qos == QoS::AtLeastOnce {
            if let Some(packet_id) = publish.packet_id {
                let puback = Packet::PubAck(PubAck { packet_id });
                self.write_packet(write_half, buf, &puback).await?;
            }
        }
        Ok(())
    }
}
