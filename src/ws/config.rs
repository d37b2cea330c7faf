#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

// socket.io v2 server defaults, used until the handshake says otherwise
const DEFAULT_PING_INTERVAL_DURATION: Duration = Duration::from_secs(25);
const DEFAULT_PING_TIMEOUT_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_HANDSHAKE_TIMEOUT_DURATION: Duration = Duration::from_secs(20);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Engine.IO protocol revision spoken by the Streamlabs socket server.
pub const DEFAULT_EIO_VERSION: u8 = 3;
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time to wait for the Engine.IO open packet after the WebSocket upgrade
    pub handshake_timeout: Duration,
    /// Ping interval used when the server's handshake does not advertise one
    pub heartbeat_interval: Duration,
    /// Pong deadline used when the server's handshake does not advertise one
    pub heartbeat_timeout: Duration,
    /// `EIO` query parameter sent on connect
    pub eio_version: u8,
    /// Path of the socket.io endpoint on the server
    pub path: String,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT_DURATION,
            heartbeat_interval: DEFAULT_PING_INTERVAL_DURATION,
            heartbeat_timeout: DEFAULT_PING_TIMEOUT_DURATION,
            eio_version: DEFAULT_EIO_VERSION,
            path: DEFAULT_SOCKET_PATH.to_owned(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Initial backoff duration for first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}
