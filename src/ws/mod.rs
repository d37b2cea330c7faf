//! socket.io realtime transport.
//!
//! - [`WsTransport`]: production [`Transport`] speaking Engine.IO v3 / socket.io v2 over a
//!   WebSocket
//! - [`ConnectionManager`]: one live socket with heartbeat and reconnection
//! - [`packet`]: the text frame codec

pub mod config;
pub mod connection;
pub mod error;
pub mod packet;

pub use config::{Config, ReconnectConfig};
pub use connection::{ConnectionManager, ConnectionState, DisconnectReason};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
use url::Url;

use crate::Result;
use crate::events::Dispatcher;
use crate::transport::Transport;

/// Opens socket.io connections over `tokio-tungstenite`.
#[expect(
    clippy::module_name_repetitions,
    reason = "WsTransport names its wire protocol when used next to other transports"
)]
#[derive(Clone, Debug, Default)]
pub struct WsTransport {
    config: Config,
}

impl WsTransport {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Transport for WsTransport {
    type Connection = ConnectionManager;

    fn open(&self, endpoint: &Url, dispatcher: Dispatcher) -> Result<Self::Connection> {
        let url = handshake_url(endpoint, &self.config);

        #[cfg(feature = "tracing")]
        tracing::debug!(host = ?url.host_str(), "Opening socket connection");

        ConnectionManager::new(url, self.config.clone(), dispatcher)
    }
}

/// Turns a socket endpoint such as `wss://sockets.streamlabs.com?token=...` into the
/// Engine.IO WebSocket URL, keeping the existing query.
#[must_use]
pub fn handshake_url(endpoint: &Url, config: &Config) -> Url {
    let mut url = endpoint.clone();

    let scheme = match url.scheme() {
        "https" => Some("wss"),
        "http" => Some("ws"),
        _ => None,
    };
    if let Some(scheme) = scheme {
        // Both are special schemes, so the swap cannot be rejected.
        _ = url.set_scheme(scheme);
    }

    url.set_path(&config.path);
    url.query_pairs_mut()
        .append_pair("EIO", &config.eio_version.to_string())
        .append_pair("transport", "websocket");
    url
}
