use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// HTTP method type, re-exported for use with error inspection.
pub use reqwest::Method;
/// HTTP status code type, re-exported for use with error inspection.
pub use reqwest::StatusCode;
use reqwest::header;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Invalid arguments supplied when constructing a client or session
    Config,
    /// Error reading, creating or writing the token cache file
    Io,
    /// Platform rejected a credential, either during code exchange or socket token issuance
    Auth,
    /// Network-level failure talking to the HTTP API
    Transport,
    /// Error related to the realtime socket connection
    WebSocket,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    /// Returns the HTTP status code when this error was caused by a rejected API call.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.downcast_ref::<Status>().map(|status| status.status_code)
    }

    pub fn configuration<S: Into<String>>(reason: S) -> Self {
        Configuration {
            reason: reason.into(),
        }
        .into()
    }

    pub fn status<S: Into<String>>(
        status_code: StatusCode,
        method: Method,
        path: String,
        message: S,
    ) -> Self {
        Status {
            status_code,
            method,
            path,
            message: message.into(),
        }
        .into()
    }

    pub fn cache_file<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        CacheFile {
            path: path.into(),
            source,
        }
        .into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A non-200 response from the Streamlabs API.
#[non_exhaustive]
#[derive(Debug)]
pub struct Status {
    pub status_code: StatusCode,
    pub method: Method,
    pub path: String,
    pub message: String,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error({}) making {} call to {} with {}",
            self.status_code, self.method, self.path, self.message
        )
    }
}

impl StdError for Status {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Configuration {
    pub reason: String,
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.reason)
    }
}

impl StdError for Configuration {}

/// Failure touching the on-disk token cache.
#[non_exhaustive]
#[derive(Debug)]
pub struct CacheFile {
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for CacheFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache file {}: {}", self.path.display(), self.source)
    }
}

impl StdError for CacheFile {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

/// Returned when a connection is requested but no socket token could be obtained.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct MissingSocketToken;

impl fmt::Display for MissingSocketToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no socket token available: authorize with a web token or a socket token first"
        )
    }
}

impl StdError for MissingSocketToken {}

impl From<MissingSocketToken> for Error {
    fn from(err: MissingSocketToken) -> Self {
        Error::with_source(Kind::Auth, err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::with_source(Kind::Transport, e)
    }
}

impl From<header::InvalidHeaderValue> for Error {
    fn from(e: header::InvalidHeaderValue) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<serde_html_form::ser::Error> for Error {
    fn from(e: serde_html_form::ser::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<Configuration> for Error {
    fn from(err: Configuration) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

impl From<Status> for Error {
    fn from(err: Status) -> Self {
        Error::with_source(Kind::Auth, err)
    }
}

impl From<CacheFile> for Error {
    fn from(err: CacheFile) -> Self {
        Error::with_source(Kind::Io, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_should_succeed() {
        let status = Status {
            status_code: StatusCode::FORBIDDEN,
            method: Method::GET,
            path: "/api/v1.0/socket/token".to_owned(),
            message: "denied".to_owned(),
        };

        assert_eq!(
            status.to_string(),
            "error(403 Forbidden) making GET call to /api/v1.0/socket/token with denied"
        );
    }

    #[test]
    fn status_into_error_is_auth_kind() {
        let error = Error::status(
            StatusCode::UNAUTHORIZED,
            Method::POST,
            "/token".to_owned(),
            "invalid_grant",
        );

        assert_eq!(error.kind(), Kind::Auth);
        assert_eq!(error.status_code(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn cache_file_error_keeps_io_source() {
        let error = Error::cache_file(
            "/tmp/token.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );

        assert_eq!(error.kind(), Kind::Io);
        let cache = error.downcast_ref::<CacheFile>().unwrap();
        assert_eq!(cache.source.kind(), io::ErrorKind::PermissionDenied);
        assert!(error.to_string().contains("/tmp/token.txt"));
    }

    #[test]
    fn status_code_is_none_for_other_errors() {
        let error = Error::configuration("empty cache path");

        assert_eq!(error.kind(), Kind::Config);
        assert_eq!(error.status_code(), None);
    }
}
