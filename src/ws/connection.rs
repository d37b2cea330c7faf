#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::time::Instant;

use backoff::backoff::Backoff as _;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, interval_at, sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::packet::{Handshake, Packet, SocketPacket, event_payload};
use crate::Result;
use crate::events::{Dispatcher, SocketEvent};
use crate::transport::Connection;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// socket.io event name carrying Streamlabs alerts.
const EVENT_NAME: &str = "event";

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// socket.io session established
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Reconnecting after failure
    Reconnecting {
        /// Current reconnection attempt number
        attempt: u32,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Why an established socket went away. Delivered as the disconnect payload.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed locally
    ClientDisconnect,
    /// The server ended the session
    ServerDisconnect,
    /// No pong arrived within the heartbeat timeout
    PingTimeout,
    /// The underlying WebSocket closed
    TransportClose,
    /// The underlying WebSocket failed
    TransportError,
}

impl DisconnectReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientDisconnect => "io client disconnect",
            Self::ServerDisconnect => "io server disconnect",
            Self::PingTimeout => "ping timeout",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
        }
    }

    /// Whether the connection loop should try to bring the socket back.
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        !matches!(self, Self::ClientDisconnect | Self::ServerDisconnect)
    }
}

/// How a single WebSocket session ended.
struct Ended {
    reason: DisconnectReason,
    /// Whether the socket.io connect packet was received during the session
    connected: bool,
}

enum Heartbeat {
    Ping,
    Timeout,
}

/// Drives one socket.io connection: handshake, heartbeat, event delivery and automatic
/// reconnection with exponential backoff.
///
/// The loop runs on a background Tokio task until [`ConnectionManager::disconnect`] is
/// called, the manager is dropped, the server ends the session, or the reconnect budget in
/// [`super::config::ReconnectConfig`] runs out. Lifecycle notifications go to the
/// [`Dispatcher`] supplied at construction.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Watch channel receiver for state changes (for use in checking the current state)
    state_rx: watch::Receiver<ConnectionState>,
    /// Stops the background loop
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Start the connection loop against an Engine.IO URL.
    ///
    /// Requires a running Tokio runtime.
    pub fn new(endpoint: Url, config: Config, dispatcher: Dispatcher) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_e| WsError::NoRuntime)?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let loop_cancel = cancel.clone();
        runtime.spawn(async move {
            Self::connection_loop(endpoint, config, dispatcher, state_tx, loop_cancel).await;
        });

        Ok(Self { state_rx, cancel })
    }

    /// Main connection loop with automatic reconnection.
    async fn connection_loop(
        endpoint: Url,
        config: Config,
        dispatcher: Dispatcher,
        state_tx: watch::Sender<ConnectionState>,
        cancel: CancellationToken,
    ) {
        let mut attempt = 0_u32;
        let mut backoff: backoff::ExponentialBackoff = config.reconnect.clone().into();
        let mut was_connected = false;

        loop {
            _ = state_tx.send(ConnectionState::Connecting);

            let connected = tokio::select! {
                () = cancel.cancelled() => break,
                result = connect_async(endpoint.as_str()) => result,
            };

            match connected {
                Ok((ws_stream, _)) => {
                    let ended = Self::handle_connection(
                        ws_stream,
                        &config,
                        &dispatcher,
                        &state_tx,
                        &cancel,
                        was_connected,
                    )
                    .await;

                    if !ended.reason.should_reconnect() {
                        break;
                    }

                    if ended.connected {
                        was_connected = true;
                        attempt = 0;
                        backoff.reset();
                    } else {
                        attempt = attempt.saturating_add(1);
                    }
                }
                Err(e) => {
                    let error = crate::error::Error::from(WsError::Connection(e));
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Unable to connect: {error:?}");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &error;
                    attempt = attempt.saturating_add(1);
                }
            }

            // Check if we should stop reconnecting
            if let Some(max) = config.reconnect.max_attempts
                && attempt >= max
            {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempt, "Giving up on socket after repeated failures");
                break;
            }

            _ = state_tx.send(ConnectionState::Reconnecting { attempt });

            if let Some(duration) = backoff.next_backoff() {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = sleep(duration) => {}
                }
            }
        }

        _ = state_tx.send(ConnectionState::Disconnected);
    }

    /// Handle an active WebSocket connection until it ends.
    ///
    /// Dispatches [`SocketEvent::Disconnect`] before returning if the socket.io session was
    /// established.
    async fn handle_connection(
        ws_stream: WsStream,
        config: &Config,
        dispatcher: &Dispatcher,
        state_tx: &watch::Sender<ConnectionState>,
        cancel: &CancellationToken,
        reconnecting: bool,
    ) -> Ended {
        let (mut write, mut read) = ws_stream.split();

        let handshake = tokio::select! {
            () = cancel.cancelled() => {
                _ = write.close().await;
                return Ended { reason: DisconnectReason::ClientDisconnect, connected: false };
            }
            result = timeout(config.handshake_timeout, Self::read_handshake(&mut read)) => {
                match result {
                    Ok(Ok(handshake)) => handshake,
                    Ok(Err(e)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(error = %e, "Engine.IO handshake failed");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                        return Ended { reason: DisconnectReason::TransportError, connected: false };
                    }
                    Err(_) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            "No Engine.IO handshake within {:?}",
                            config.handshake_timeout
                        );
                        return Ended { reason: DisconnectReason::TransportError, connected: false };
                    }
                }
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(sid = %handshake.sid, "Engine.IO session opened");

        let ping_interval = handshake
            .ping_interval()
            .filter(|interval| !interval.is_zero())
            .unwrap_or(config.heartbeat_interval);
        let ping_timeout = handshake.ping_timeout().unwrap_or(config.heartbeat_timeout);

        // Channel to notify heartbeat loop when a pong is received
        let (pong_tx, pong_rx) = watch::channel(Instant::now());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::unbounded_channel();

        let heartbeat_handle = tokio::spawn(async move {
            Self::heartbeat_loop(heartbeat_tx, ping_interval, ping_timeout, pong_rx).await;
        });

        let mut connected = false;

        let reason = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    if connected {
                        _ = Self::send(&mut write, &Packet::Message {
                            namespace: "/".to_owned(),
                            packet: SocketPacket::Disconnect,
                        })
                        .await;
                    }
                    _ = write.close().await;
                    break DisconnectReason::ClientDisconnect;
                }

                // Handle incoming frames
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            #[cfg(feature = "tracing")]
                            tracing::trace!(%text, "Received socket frame");

                            let packet = match Packet::parse(text.as_str()) {
                                Ok(packet) => packet,
                                Err(e) => {
                                    #[cfg(feature = "tracing")]
                                    tracing::warn!(%text, error = %e, "Failed to parse socket frame");
                                    #[cfg(not(feature = "tracing"))]
                                    let _ = (&text, &e);
                                    continue;
                                }
                            };

                            // Other namespaces carry nothing for us.
                            if let Packet::Message { namespace, .. } = &packet
                                && namespace != "/"
                            {
                                continue;
                            }

                            match packet {
                                Packet::Ping(data) => {
                                    if Self::send(&mut write, &Packet::Pong(data)).await.is_err() {
                                        break DisconnectReason::TransportError;
                                    }
                                }
                                Packet::Pong(_) => {
                                    _ = pong_tx.send(Instant::now());
                                }
                                Packet::Close => break DisconnectReason::TransportClose,
                                Packet::Message { packet: SocketPacket::Connect, .. } => {
                                    if !connected {
                                        connected = true;
                                        _ = state_tx.send(ConnectionState::Connected {
                                            since: Instant::now(),
                                        });
                                        if reconnecting {
                                            dispatcher.dispatch(SocketEvent::Reconnect);
                                        }
                                        dispatcher.dispatch(SocketEvent::Connect);
                                    }
                                }
                                Packet::Message { packet: SocketPacket::Disconnect, .. } => {
                                    break DisconnectReason::ServerDisconnect;
                                }
                                Packet::Message {
                                    packet: SocketPacket::Event { name, args, .. },
                                    ..
                                } if name == EVENT_NAME => {
                                    dispatcher.dispatch(SocketEvent::Event(event_payload(args)));
                                }
                                Packet::Message { packet: SocketPacket::Error(payload), .. } => {
                                    let error = WsError::ConnectRefused(payload);
                                    #[cfg(feature = "tracing")]
                                    tracing::warn!(%error, "Server refused socket connection");
                                    #[cfg(not(feature = "tracing"))]
                                    let _ = &error;
                                    break DisconnectReason::ServerDisconnect;
                                }
                                _ => {
                                    // Upgrades, noops, duplicate opens, acks and other event names.
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            break DisconnectReason::TransportClose;
                        }
                        Some(Err(e)) => {
                            let error = WsError::Connection(e);
                            #[cfg(feature = "tracing")]
                            tracing::warn!(%error, "Socket transport error");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &error;
                            break DisconnectReason::TransportError;
                        }
                        Some(Ok(_)) => {
                            // Binary frames and WebSocket-level ping/pong.
                        }
                    }
                }

                // Handle requests from the heartbeat loop
                Some(beat) = heartbeat_rx.recv() => {
                    match beat {
                        Heartbeat::Ping => {
                            if Self::send(&mut write, &Packet::Ping(String::new())).await.is_err() {
                                break DisconnectReason::TransportError;
                            }
                        }
                        Heartbeat::Timeout => break DisconnectReason::PingTimeout,
                    }
                }
            }
        };

        // Cleanup
        heartbeat_handle.abort();

        if connected {
            _ = state_tx.send(ConnectionState::Disconnected);
            dispatcher.dispatch(SocketEvent::Disconnect(Value::String(
                reason.as_str().to_owned(),
            )));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(reason = reason.as_str(), connected, "Socket session ended");

        Ended { reason, connected }
    }

    /// Waits for the Engine.IO open packet that starts every session.
    async fn read_handshake(read: &mut WsRead) -> std::result::Result<Handshake, WsError> {
        while let Some(frame) = read.next().await {
            match frame.map_err(WsError::Connection)? {
                Message::Text(text) => {
                    return match Packet::parse(text.as_str())? {
                        Packet::Open(handshake) => Ok(handshake),
                        _ => Err(WsError::Handshake(format!(
                            "expected open packet, got {}",
                            text.as_str()
                        ))),
                    };
                }
                Message::Close(_) => return Err(WsError::ConnectionClosed),
                _ => {}
            }
        }

        Err(WsError::ConnectionClosed)
    }

    /// Heartbeat loop that requests pings and monitors pong responses.
    async fn heartbeat_loop(
        heartbeat_tx: mpsc::UnboundedSender<Heartbeat>,
        ping_interval: Duration,
        ping_timeout: Duration,
        mut pong_rx: watch::Receiver<Instant>,
    ) {
        let mut ticker = interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);

        loop {
            ticker.tick().await;

            // Mark current pong state as seen before sending the ping
            drop(pong_rx.borrow_and_update());

            if heartbeat_tx.send(Heartbeat::Ping).is_err() {
                // Message loop has terminated
                break;
            }

            match timeout(ping_timeout, pong_rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    // Channel closed, connection is terminating
                    break;
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Heartbeat timeout: no pong received within {ping_timeout:?}");
                    _ = heartbeat_tx.send(Heartbeat::Timeout);
                    break;
                }
            }
        }
    }

    async fn send(write: &mut WsWrite, packet: &Packet) -> std::result::Result<(), WsError> {
        write
            .send(Message::Text(packet.encode().into()))
            .await
            .map_err(WsError::Connection)
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stop the connection loop. The socket sends a socket.io disconnect, closes, and
    /// reports `"io client disconnect"` if it was connected.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }
}

impl Connection for ConnectionManager {
    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && self.state().is_connected()
    }

    fn close(&mut self) {
        self.disconnect();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
