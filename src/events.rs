//! Lifecycle and application events surfaced by a realtime connection.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;

/// Handler for payload-free lifecycle notifications.
pub type Handler = Arc<dyn Fn() + Send + Sync + 'static>;

/// Handler receiving an opaque payload.
pub type PayloadHandler = Arc<dyn Fn(&Value) + Send + Sync + 'static>;

/// A notification delivered by the realtime transport.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum SocketEvent {
    /// The socket completed its handshake.
    Connect,
    /// The socket dropped. Carries the transport's reason, usually a string such as
    /// `"transport close"`.
    Disconnect(Value),
    /// The socket came back after a drop. Followed by [`SocketEvent::Connect`].
    Reconnect,
    /// An application `event` message. The payload is passed through untouched.
    Event(Value),
}

/// The caller-supplied handlers.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub(crate) on_connect: Option<Handler>,
    pub(crate) on_disconnect: Option<PayloadHandler>,
    pub(crate) on_reconnect: Option<Handler>,
    pub(crate) on_event: Option<PayloadHandler>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_reconnect", &self.on_reconnect.is_some())
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}

/// Handlers shared between a session and every connection it opened.
pub type SharedCallbacks = Arc<RwLock<Callbacks>>;

/// Routes transport notifications to the currently registered [`Callbacks`] and to the
/// session's event stream.
///
/// Handlers are looked up when a notification fires, so a connection that is still tearing
/// down after a handler change reports to the new handler.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    callbacks: SharedCallbacks,
    events: broadcast::Sender<SocketEvent>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(callbacks: SharedCallbacks, events: broadcast::Sender<SocketEvent>) -> Self {
        Self { callbacks, events }
    }

    /// Invokes the matching handler, if one is registered, then publishes `event` to
    /// stream subscribers.
    pub fn dispatch(&self, event: SocketEvent) {
        // The lock is released before the handler runs.
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match &event {
            SocketEvent::Connect => {
                if let Some(handler) = &callbacks.on_connect {
                    handler();
                }
            }
            SocketEvent::Disconnect(reason) => {
                if let Some(handler) = &callbacks.on_disconnect {
                    handler(reason);
                }
            }
            SocketEvent::Reconnect => {
                if let Some(handler) = &callbacks.on_reconnect {
                    handler();
                }
            }
            SocketEvent::Event(payload) => {
                if let Some(handler) = &callbacks.on_event {
                    handler(payload);
                }
            }
        }

        // No receivers is fine: nobody asked for the stream.
        _ = self.events.send(event);
    }
}
