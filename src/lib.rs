#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod auth;
pub mod error;
pub mod events;
pub mod session;
pub mod store;
pub mod transport;
pub mod ws;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Request, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Base of the Streamlabs REST API, used for OAuth and socket token issuance.
pub const DEFAULT_API_HOST: &str = "https://streamlabs.com/api/v1.0/";

/// Realtime socket host. The socket token is appended as the `token` query parameter.
pub const DEFAULT_SOCKET_HOST: &str = "wss://sockets.streamlabs.com";

pub const USER_AGENT: &str = "streamlabs-socket-client";

/// Parses `host` into a base [`Url`] whose path ends in `/`, so relative joins append to it
/// rather than replacing the last segment.
pub(crate) fn base_url(host: &str) -> Result<Url> {
    let mut url = Url::parse(host)
        .map_err(|e| Error::configuration(format!("invalid host {host:?}: {e}")))?;

    if url.cannot_be_a_base() {
        return Err(Error::configuration(format!(
            "host {host:?} cannot be used as a base URL"
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

pub(crate) fn http_client(user_agent: &str) -> Result<ReqwestClient> {
    let mut headers = HeaderMap::new();

    headers.insert("User-Agent", HeaderValue::from_str(user_agent)?);
    headers.insert("Accept", HeaderValue::from_static("application/json"));

    Ok(ReqwestClient::builder().default_headers(headers).build()?)
}

/// Trait for converting request types to URL query parameters.
///
/// This trait is automatically implemented for all types that implement [`Serialize`].
/// It uses [`serde_html_form`] to serialize the struct fields into a query string.
pub trait ToQueryParams: Serialize {
    /// Converts the request to a URL query string.
    ///
    /// Returns an empty string if no parameters are set, otherwise returns
    /// a string starting with `?` followed by URL-encoded key-value pairs.
    fn query_params(&self) -> String {
        let params = serde_html_form::to_string(self)
            .inspect_err(|e| {
                #[cfg(feature = "tracing")]
                tracing::error!("Unable to convert to URL-encoded string {e:?}");
                #[cfg(not(feature = "tracing"))]
                let _: &serde_html_form::ser::Error = e;
            })
            .unwrap_or_default();

        if params.is_empty() {
            String::new()
        } else {
            format!("?{params}")
        }
    }
}

impl<T: Serialize> ToQueryParams for T {}

/// Executes `request` and deserializes the JSON body of a `200 OK` response.
///
/// Any other status becomes a [`error::Status`] error, which is classified as
/// [`error::Kind::Auth`]: every call made through here is a credential exchange.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        level = "debug",
        skip(client, request),
        fields(
            method = %request.method(),
            path = request.url().path(),
            status_code
        )
    )
)]
pub(crate) async fn request<Response: DeserializeOwned>(
    client: &ReqwestClient,
    request: Request,
) -> Result<Response> {
    let method = request.method().clone();
    let path = request.url().path().to_owned();

    let response = client.execute(request).await?;
    let status_code = response.status();

    #[cfg(feature = "tracing")]
    tracing::Span::current().record("status_code", status_code.as_u16());

    if status_code != StatusCode::OK {
        let message = response.text().await.unwrap_or_default();

        #[cfg(feature = "tracing")]
        tracing::warn!(
            status = %status_code,
            method = %method,
            path = %path,
            message = %message,
            "API request failed"
        );

        return Err(Error::status(status_code, method, path, message));
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}
