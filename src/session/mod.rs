#![expect(
    clippy::module_name_repetitions,
    reason = "Session types deliberately include the module name for clarity"
)]

//! The token and connection lifecycle.
//!
//! A [`SessionManager`] owns three pieces of state and keeps them consistent:
//!
//! - the **web token**, a long-lived OAuth 2.0 access token persisted in a [`CacheFile`]
//! - the **socket token**, a short-lived credential fetched from `socket/token` with the web
//!   token, never persisted
//! - the **connection**, at most one realtime socket opened with the current socket token
//!
//! Changing the web token invalidates the socket token; changing the socket token or the
//! registered callbacks replaces any live connection. Opening is always eager: every rebuild
//! opens the new connection immediately.
//!
//! # Example
//!
//! ```rust, no_run
//! use futures::StreamExt as _;
//! use streamlabs_socket_client::auth::{Config as OAuthConfig, StreamlabsOAuth};
//! use streamlabs_socket_client::session::{Config, StreamlabsSession};
//! use streamlabs_socket_client::ws::WsTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let oauth = StreamlabsOAuth::new(
//!         OAuthConfig::builder()
//!             .client_id("client-id")
//!             .client_secret("client-secret".to_owned())
//!             .redirect_uri("http://localhost:8080/callback")
//!             .build(),
//!     )?;
//!     let config = Config::builder().cache_file("token.txt").build();
//!
//!     let mut session = StreamlabsSession::new(oauth, WsTransport::default(), config).await?;
//!     if !session.is_authorized() {
//!         println!("Visit {}", session.authorization_url());
//!         session.authorize("code-from-redirect").await?;
//!     }
//!
//!     session.on_event(|payload| println!("{payload}"))?;
//!     session.connect().await?;
//!
//!     let mut events = Box::pin(session.events());
//!     while let Some(event) = events.next().await {
//!         println!("{:?}", event?);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod config;

use std::sync::{Arc, PoisonError, RwLockWriteGuard};

use async_stream::try_stream;
use futures::Stream;
use reqwest::{Client as ReqwestClient, Method};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use url::Url;

pub use self::config::Config;
use crate::auth::{OAuthClient, StreamlabsOAuth};
use crate::error::{Error, MissingSocketToken};
use crate::events::{Callbacks, Dispatcher, SharedCallbacks, SocketEvent};
use crate::store::CacheFile;
use crate::transport::{Connection, Transport};
use crate::ws::{WsError, WsTransport};
use crate::{Result, base_url, http_client};

/// Broadcast channel capacity for [`SessionManager::events`].
const BROADCAST_CAPACITY: usize = 1024;

/// A session talking to Streamlabs over the production OAuth client and socket transport.
pub type StreamlabsSession = SessionManager<StreamlabsOAuth, WsTransport>;

#[derive(Debug, Deserialize)]
struct SocketTokenResponse {
    #[serde(default)]
    socket_token: Option<Value>,
}

/// Owns the web token, socket token and realtime connection of one account.
///
/// Operations take `&mut self`: a session has a single logical owner, and share it behind a
/// lock if several tasks need it. Socket notifications arrive on the transport's own task and
/// are delivered to whichever callbacks are registered when they fire.
pub struct SessionManager<O: OAuthClient, T: Transport> {
    oauth: O,
    transport: T,
    store: CacheFile,
    client: ReqwestClient,
    socket_token_url: Url,
    socket_host: Url,
    web_token: Option<SecretString>,
    socket_token: Option<SecretString>,
    connection: Option<T::Connection>,
    callbacks: SharedCallbacks,
    events: broadcast::Sender<SocketEvent>,
    initial_fetch_error: Option<Error>,
}

impl<O: OAuthClient, T: Transport> SessionManager<O, T> {
    /// Creates a session, loading the web token from the cache file.
    ///
    /// When a web token is cached, a socket token is fetched right away. Failing to fetch one
    /// is not fatal and leaves the session without a socket token; the failure is kept in
    /// [`Self::initial_fetch_error`], which tells a revoked token (`Kind::Auth`) apart from an
    /// outage (`Kind::Transport`). No connection is opened.
    ///
    /// Fails with [`crate::error::Kind::Config`] on an empty cache path or an unusable host,
    /// and with [`crate::error::Kind::Io`] when the cache file cannot be created or read.
    pub async fn new(oauth: O, transport: T, config: Config) -> Result<Self> {
        let socket_token_url = base_url(config.api_host())?.join("socket/token")?;
        let socket_host = socket_host(config.socket_host())?;

        let store = CacheFile::get_or_create(config.cache_file())?;
        let web_token = store.load()?.map(SecretString::from);
        let client = http_client(config.user_agent())?;
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);

        let mut session = Self {
            oauth,
            transport,
            store,
            client,
            socket_token_url,
            socket_host,
            web_token,
            socket_token: None,
            connection: None,
            callbacks: SharedCallbacks::default(),
            events,
            initial_fetch_error: None,
        };

        if session.is_authorized() {
            #[cfg(feature = "tracing")]
            tracing::debug!(path = %session.store.path().display(), "Loaded cached web token");

            if let Err(e) = session.fetch_socket_token().await {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to fetch socket token for cached web token");
                session.initial_fetch_error = Some(e);
            }
        }

        Ok(session)
    }

    /// Whether a web token is present.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.web_token.is_some()
    }

    /// Whether a connection exists and the transport reports it open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(<T::Connection as Connection>::is_open)
    }

    #[must_use]
    pub fn has_socket_token(&self) -> bool {
        self.socket_token.is_some()
    }

    #[must_use]
    pub fn web_token(&self) -> Option<&SecretString> {
        self.web_token.as_ref()
    }

    #[must_use]
    pub fn socket_token(&self) -> Option<&SecretString> {
        self.socket_token.as_ref()
    }

    #[must_use]
    pub fn cache_file(&self) -> &CacheFile {
        &self.store
    }

    /// Why the socket token fetch made by [`Self::new`] failed, if it did. Cleared by the next
    /// successful fetch.
    #[must_use]
    pub fn initial_fetch_error(&self) -> Option<&Error> {
        self.initial_fetch_error.as_ref()
    }

    /// The URL the user visits to grant this application access.
    #[must_use]
    pub fn authorization_url(&self) -> String {
        self.oauth.authorization_url()
    }

    /// Exchanges an authorization `code` for a web token and adopts it.
    ///
    /// A rejected exchange leaves the session untouched. Otherwise see
    /// [`Self::authorize_with_api_token`].
    pub async fn authorize(&mut self, code: &str) -> Result<()> {
        let token = self.oauth.exchange_code(code).await?;

        #[cfg(feature = "tracing")]
        tracing::info!("Authorization code exchanged for web token");

        self.replace_web_token(token.access_token).await
    }

    /// Adopts a caller-supplied web token.
    ///
    /// The token is written to the cache, the old socket token is dropped and a new one is
    /// fetched, then a live connection is rebuilt with the new socket token (or closed if none
    /// could be obtained). Every step runs even if an earlier one failed; the first failure is
    /// returned, cache errors before fetch errors.
    pub async fn authorize_with_api_token<S: Into<String>>(&mut self, token: S) -> Result<()> {
        self.replace_web_token(SecretString::from(token.into())).await
    }

    /// Adopts a caller-supplied socket token, bypassing the web token entirely.
    ///
    /// A live connection is rebuilt with it. The web token and the cache are not touched.
    pub fn authorize_with_socket_token<S: Into<String>>(&mut self, token: S) -> Result<()> {
        self.socket_token = Some(SecretString::from(token.into()));
        self.refresh_connection()
    }

    /// Fetches a fresh socket token when a web token is present, then (re)opens the connection.
    ///
    /// Returns whether a socket token is present afterwards. Without one any connection is
    /// closed. A failed fetch is returned as is and changes nothing.
    pub async fn reauthorize_socket(&mut self) -> Result<bool> {
        if self.is_authorized() {
            self.fetch_socket_token().await?;
        }

        if self.has_socket_token() {
            self.open_connection()?;
        } else {
            self.close();
        }

        Ok(self.has_socket_token())
    }

    /// Replaces the connection with a new one using the current socket token.
    ///
    /// Returns `false`, doing nothing, when there is no socket token.
    pub fn reconnect_socket(&mut self) -> Result<bool> {
        if !self.has_socket_token() {
            return Ok(false);
        }

        self.open_connection()?;
        Ok(true)
    }

    /// Opens a new connection, fetching a socket token first if only a web token is held.
    ///
    /// Fails with [`MissingSocketToken`] when no socket token can be had.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_authorized() && !self.has_socket_token() {
            self.fetch_socket_token().await?;
        }

        self.open_connection()
    }

    /// Tears down the connection, if any. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Closing socket connection");

            connection.close();
        }
    }

    /// Replaces a live connection with a fresh one.
    ///
    /// Every callback setter calls this, so the new handler sees the full lifecycle of a new
    /// connection starting with its `Connect`. Does nothing when no connection exists.
    pub fn rebind(&mut self) -> Result<()> {
        if self.connection.is_some() {
            self.open_connection()?;
        }
        Ok(())
    }

    /// Sets the handler run when the socket connects. Forces a [`Self::rebind`].
    pub fn on_connect<F>(&mut self, handler: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks_mut().on_connect = Some(Arc::new(handler));
        self.rebind()
    }

    /// Sets the handler run with the reason when the socket drops. Forces a [`Self::rebind`].
    pub fn on_disconnect<F>(&mut self, handler: F) -> Result<()>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.callbacks_mut().on_disconnect = Some(Arc::new(handler));
        self.rebind()
    }

    /// Sets the handler run when the socket comes back after a drop. Forces a
    /// [`Self::rebind`].
    pub fn on_reconnect<F>(&mut self, handler: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks_mut().on_reconnect = Some(Arc::new(handler));
        self.rebind()
    }

    /// Sets the handler run with the payload of every `event` message. Forces a
    /// [`Self::rebind`].
    pub fn on_event<F>(&mut self, handler: F) -> Result<()>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.callbacks_mut().on_event = Some(Arc::new(handler));
        self.rebind()
    }

    fn callbacks_mut(&self) -> RwLockWriteGuard<'_, Callbacks> {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Streams every notification from this session's connections, including those opened
    /// after the call.
    ///
    /// A consumer that falls behind gets a [`WsError::Lagged`] item and keeps receiving.
    pub fn events(&self) -> impl Stream<Item = Result<SocketEvent>> + use<O, T> {
        let mut rx = self.events.subscribe();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Event stream lagged, missed {n} messages");
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }

    async fn replace_web_token(&mut self, token: SecretString) -> Result<()> {
        let persisted = self.store.save(token.expose_secret());
        if let Err(e) = &persisted {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Unable to persist web token");
            #[cfg(not(feature = "tracing"))]
            let _ = e;
        }

        self.web_token = Some(token);
        self.socket_token = None;

        let fetched = self.fetch_socket_token().await;
        let refreshed = self.refresh_connection();

        persisted.and(fetched).and(refreshed)
    }

    /// `GET socket/token`, signed with the web token. A 200 whose `socket_token` is missing,
    /// empty or not a string keeps the previous socket token.
    async fn fetch_socket_token(&mut self) -> Result<()> {
        let Some(web_token) = &self.web_token else {
            return Ok(());
        };

        let mut url = self.socket_token_url.clone();
        url.query_pairs_mut()
            .append_pair("access_token", web_token.expose_secret());

        let mut request = self.client.request(Method::GET, url).build()?;
        self.oauth.sign_request(Some(web_token), &mut request)?;

        let response: SocketTokenResponse = crate::request(&self.client, request).await?;

        self.initial_fetch_error = None;

        match response.socket_token {
            Some(Value::String(token)) if !token.is_empty() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Socket token refreshed");
                self.socket_token = Some(SecretString::from(token));
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Socket token response was empty, keeping previous token");
            }
        }

        Ok(())
    }

    /// After a credential change: rebuild a live connection, or close it when the change left
    /// no socket token behind.
    fn refresh_connection(&mut self) -> Result<()> {
        if self.connection.is_none() {
            return Ok(());
        }

        if self.has_socket_token() {
            self.open_connection()
        } else {
            self.close();
            Ok(())
        }
    }

    /// Closes any existing connection and opens a new one with the current socket token.
    fn open_connection(&mut self) -> Result<()> {
        self.close();

        let token = self.socket_token.as_ref().ok_or(MissingSocketToken)?;
        let endpoint = self.socket_endpoint(token);
        let dispatcher = Dispatcher::new(Arc::clone(&self.callbacks), self.events.clone());

        self.connection = Some(self.transport.open(&endpoint, dispatcher)?);

        #[cfg(feature = "tracing")]
        tracing::debug!("Socket connection opened");

        Ok(())
    }

    fn socket_endpoint(&self, token: &SecretString) -> Url {
        let mut endpoint = self.socket_host.clone();
        endpoint
            .query_pairs_mut()
            .append_pair("token", token.expose_secret());
        endpoint
    }
}

impl<O: OAuthClient, T: Transport> Drop for SessionManager<O, T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn socket_host(host: &str) -> Result<Url> {
    let url = Url::parse(host)
        .map_err(|e| Error::configuration(format!("invalid socket host {host:?}: {e}")))?;

    if url.cannot_be_a_base() {
        return Err(Error::configuration(format!(
            "socket host {host:?} cannot carry a token query"
        )));
    }

    Ok(url)
}
