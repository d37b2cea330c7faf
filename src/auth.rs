#![expect(
    clippy::module_name_repetitions,
    reason = "OAuth types name the protocol they speak"
)]

//! OAuth 2.0 authorization-code flow against the Streamlabs API.
//!
//! [`OAuthClient`] is the seam the [`crate::session::SessionManager`] consumes. [`StreamlabsOAuth`]
//! is the production implementation; tests and embedders can substitute their own.

use async_trait::async_trait;
use bon::Builder;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, Request};
/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DEFAULT_API_HOST, Result, ToQueryParams as _, USER_AGENT, base_url, http_client};

/// Scope required to call the socket token endpoint.
pub const DEFAULT_SCOPE: &str = "socket.token";

/// Long-lived credential returned by a successful code exchange.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize)]
pub struct AccessToken {
    pub access_token: SecretString,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    /// Lifetime of `access_token` in seconds, when the platform reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// The three OAuth 2.0 capabilities the session depends on.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// URL the user visits to grant access. Pure; never touches the network.
    fn authorization_url(&self) -> String;

    /// Trades an authorization `code` for an [`AccessToken`].
    async fn exchange_code(&self, code: &str) -> Result<AccessToken>;

    /// Attaches an `Authorization` header to `request`: `Bearer <token>` when a token is given,
    /// `Client-ID <client id>` otherwise.
    fn sign_request(&self, token: Option<&SecretString>, request: &mut Request) -> Result<()>;
}

/// Application registration used to drive the OAuth 2.0 flow.
#[derive(Clone, Debug, Builder)]
pub struct Config {
    #[builder(into)]
    client_id: String,
    #[builder(into)]
    client_secret: SecretString,
    /// Must match the redirect URI registered with the Streamlabs application.
    #[builder(into)]
    redirect_uri: String,
    #[builder(into, default = DEFAULT_SCOPE.to_owned())]
    scope: String,
    /// Opaque value echoed back to the redirect URI.
    #[builder(into)]
    state: Option<String>,
    /// Override for the API host. Primarily useful for testing.
    #[builder(into, default = DEFAULT_API_HOST.to_owned())]
    api_host: String,
    #[builder(into, default = USER_AGENT.to_owned())]
    user_agent: String,
}

#[derive(Serialize)]
struct AuthorizationParams<'config> {
    response_type: &'static str,
    client_id: &'config str,
    redirect_uri: &'config str,
    scope: &'config str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'config str>,
}

#[derive(Serialize)]
struct TokenParams<'config> {
    grant_type: &'static str,
    client_id: &'config str,
    client_secret: &'config str,
    redirect_uri: &'config str,
    code: &'config str,
}

/// [`OAuthClient`] backed by the Streamlabs `authorize` and `token` endpoints.
#[derive(Clone, Debug)]
pub struct StreamlabsOAuth {
    config: Config,
    host: Url,
    client: ReqwestClient,
}

impl StreamlabsOAuth {
    pub fn new(config: Config) -> Result<Self> {
        let host = base_url(&config.api_host)?;
        let client = http_client(&config.user_agent)?;

        Ok(Self {
            config,
            host,
            client,
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Returns the base URL of the API.
    #[must_use]
    pub fn host(&self) -> &Url {
        &self.host
    }
}

#[async_trait]
impl OAuthClient for StreamlabsOAuth {
    fn authorization_url(&self) -> String {
        let params = AuthorizationParams {
            response_type: "code",
            client_id: &self.config.client_id,
            redirect_uri: &self.config.redirect_uri,
            scope: &self.config.scope,
            state: self.config.state.as_deref(),
        };

        format!("{}authorize{}", self.host, params.query_params())
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessToken> {
        let params = TokenParams {
            grant_type: "authorization_code",
            client_id: &self.config.client_id,
            client_secret: self.config.client_secret.expose_secret(),
            redirect_uri: &self.config.redirect_uri,
            code,
        };

        let request = self
            .client
            .request(Method::POST, self.host.join("token")?)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(serde_html_form::to_string(&params)?)
            .build()?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Exchanging authorization code for access token");

        crate::request(&self.client, request).await
    }

    fn sign_request(&self, token: Option<&SecretString>, request: &mut Request) -> Result<()> {
        let value = match token {
            Some(token) => format!("Bearer {}", token.expose_secret()),
            None => format!("Client-ID {}", self.config.client_id),
        };

        let mut value = HeaderValue::from_str(&value)?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        Ok(())
    }
}
