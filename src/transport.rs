//! The realtime socket seam.
//!
//! A [`Transport`] turns an endpoint URL (with the socket token embedded in its query) into a
//! live [`Connection`]. Lifecycle notifications flow back through the [`Dispatcher`] on a
//! transport-owned task. [`crate::ws::WsTransport`] is the production implementation.

use url::Url;

use crate::Result;
use crate::events::Dispatcher;

pub trait Transport: Send + Sync {
    type Connection: Connection;

    /// Opens a connection to `endpoint` and starts delivering events to `dispatcher`.
    ///
    /// Returns as soon as the connection attempt is underway; connecting happens in the
    /// background and is reported via [`crate::events::SocketEvent::Connect`].
    fn open(&self, endpoint: &Url, dispatcher: Dispatcher) -> Result<Self::Connection>;
}

pub trait Connection: Send {
    /// Whether the socket is currently connected.
    fn is_open(&self) -> bool;

    /// Tears the socket down. Idempotent. No further events are delivered after the
    /// resulting disconnect notification.
    fn close(&mut self);
}
