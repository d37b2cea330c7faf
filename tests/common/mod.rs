#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Not every integration test binary uses every helper"
)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use httpmock::{Mock, MockServer};
use reqwest::StatusCode;
use serde_json::json;
use streamlabs_socket_client::Result;
use streamlabs_socket_client::auth::{Config as OAuthConfig, StreamlabsOAuth};
use streamlabs_socket_client::events::Dispatcher;
use streamlabs_socket_client::session::{Config, SessionManager};
use streamlabs_socket_client::transport::{Connection, Transport};
use tempfile::TempDir;
use url::Url;

pub const CLIENT_ID: &str = "client";
pub const CLIENT_SECRET: &str = "secret";
pub const REDIRECT_URI: &str = "http://localhost/callback";
/// `Basic base64("client:secret")`
pub const BASIC_AUTH: &str = "Basic Y2xpZW50OnNlY3JldA==";

pub type TestSession = SessionManager<StreamlabsOAuth, RecordingTransport>;

#[derive(Debug, Default)]
struct Recorded {
    opened: Vec<Url>,
    dispatchers: Vec<Dispatcher>,
    closes: usize,
}

/// In-memory [`Transport`] that records every connection the session opens and closes.
///
/// Connections report open as soon as they are created. Tests drive notifications through
/// the captured [`Dispatcher`]s.
#[derive(Clone, Debug, Default)]
pub struct RecordingTransport {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    /// Endpoints passed to every `open`, oldest first.
    #[must_use]
    pub fn opened(&self) -> Vec<Url> {
        self.recorded.lock().unwrap().opened.clone()
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.recorded.lock().unwrap().opened.len()
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.recorded.lock().unwrap().closes
    }

    /// Dispatcher bound to the most recently opened connection.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        self.recorded
            .lock()
            .unwrap()
            .dispatchers
            .last()
            .cloned()
            .unwrap()
    }

    /// Dispatcher bound to the `index`th connection.
    #[must_use]
    pub fn dispatcher_at(&self, index: usize) -> Dispatcher {
        self.recorded.lock().unwrap().dispatchers[index].clone()
    }
}

impl Transport for RecordingTransport {
    type Connection = RecordingConnection;

    fn open(&self, endpoint: &Url, dispatcher: Dispatcher) -> Result<Self::Connection> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.opened.push(endpoint.clone());
        recorded.dispatchers.push(dispatcher);

        Ok(RecordingConnection {
            open: AtomicBool::new(true),
            recorded: Arc::clone(&self.recorded),
        })
    }
}

#[derive(Debug)]
pub struct RecordingConnection {
    open: AtomicBool,
    recorded: Arc<Mutex<Recorded>>,
}

impl Connection for RecordingConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.recorded.lock().unwrap().closes += 1;
        }
    }
}

pub fn oauth(server: &MockServer) -> StreamlabsOAuth {
    StreamlabsOAuth::new(
        OAuthConfig::builder()
            .client_id(CLIENT_ID)
            .client_secret(CLIENT_SECRET.to_owned())
            .redirect_uri(REDIRECT_URI)
            .api_host(server.base_url())
            .build(),
    )
    .unwrap()
}

#[must_use]
pub fn cache_path(dir: &TempDir) -> PathBuf {
    dir.path().join("streamlabs").join("token.txt")
}

/// Writes `contents` verbatim to the cache file, creating its directory.
pub fn write_cache(dir: &TempDir, contents: &str) -> PathBuf {
    let path = cache_path(dir);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

#[must_use]
pub fn read_cache(path: &Path) -> String {
    fs::read_to_string(path).unwrap().trim().to_owned()
}

pub async fn create_session(
    server: &MockServer,
    dir: &TempDir,
    transport: &RecordingTransport,
) -> anyhow::Result<TestSession> {
    let config = Config::builder()
        .cache_file(cache_path(dir))
        .api_host(server.base_url())
        .build();

    Ok(SessionManager::new(oauth(server), transport.clone(), config).await?)
}

/// Serves `socket_token` to requests signed with `web_token`.
pub fn mock_socket_token<'server>(
    server: &'server MockServer,
    web_token: &str,
    socket_token: &str,
) -> Mock<'server> {
    server.mock(|when, then| {
        when.method(httpmock::Method::GET)
            .path("/socket/token")
            .query_param("access_token", web_token)
            .header("authorization", format!("Bearer {web_token}"));
        then.status(StatusCode::OK)
            .json_body(json!({ "socket_token": socket_token }));
    })
}

/// Rejects socket token requests made with `web_token`.
pub fn mock_socket_token_status<'server>(
    server: &'server MockServer,
    web_token: &str,
    status: StatusCode,
) -> Mock<'server> {
    server.mock(|when, then| {
        when.method(httpmock::Method::GET)
            .path("/socket/token")
            .query_param("access_token", web_token);
        then.status(status)
            .json_body(json!({ "error": "invalid_token" }));
    })
}
