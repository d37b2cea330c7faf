use std::path::{Path, PathBuf};

use bon::Builder;

use crate::{DEFAULT_API_HOST, DEFAULT_SOCKET_HOST, USER_AGENT};

/// Configuration for [`super::SessionManager`].
///
/// ```
/// use streamlabs_socket_client::session::Config;
///
/// let config = Config::builder().cache_file("/var/lib/overlay/token.txt").build();
/// assert_eq!(config.socket_host(), "wss://sockets.streamlabs.com");
/// ```
#[derive(Clone, Debug, Builder)]
pub struct Config {
    /// File holding the web token between runs. Created on demand.
    #[builder(into)]
    cache_file: PathBuf,
    /// Base of the REST API serving `socket/token`. Primarily useful for testing.
    #[builder(into, default = DEFAULT_API_HOST.to_owned())]
    api_host: String,
    /// Realtime socket host; the socket token is appended as the `token` query parameter.
    #[builder(into, default = DEFAULT_SOCKET_HOST.to_owned())]
    socket_host: String,
    #[builder(into, default = USER_AGENT.to_owned())]
    user_agent: String,
}

impl Config {
    #[must_use]
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    #[must_use]
    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    #[must_use]
    pub fn socket_host(&self) -> &str {
        &self.socket_host
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
