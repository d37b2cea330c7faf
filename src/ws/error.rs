#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// A frame did not decode as an Engine.IO / socket.io packet
    MalformedPacket(String),
    /// Error parsing the JSON part of a packet
    MessageParse(serde_json::Error),
    /// The server did not complete the Engine.IO handshake
    Handshake(String),
    /// The server refused the socket.io connection, usually because of a bad token
    ConnectRefused(serde_json::Value),
    /// WebSocket connection was closed
    ConnectionClosed,
    /// Operation timed out
    Timeout,
    /// No async runtime was available to drive the connection
    NoRuntime,
    /// Event stream lagged and missed messages
    Lagged {
        /// Number of messages that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::MalformedPacket(frame) => write!(f, "Malformed socket.io packet: {frame}"),
            Self::MessageParse(e) => write!(f, "Failed to parse WebSocket message: {e}"),
            Self::Handshake(reason) => write!(f, "Engine.IO handshake failed: {reason}"),
            Self::ConnectRefused(payload) => write!(f, "Socket connection refused: {payload}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::Timeout => write!(f, "WebSocket operation timed out"),
            Self::NoRuntime => write!(f, "WebSocket transport requires a running Tokio runtime"),
            Self::Lagged { count } => write!(f, "Event stream lagged, missed {count} messages"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
