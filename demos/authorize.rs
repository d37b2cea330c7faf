//! Authorize against Streamlabs, connect to the realtime socket and log every alert.
//!
//! Reads the application registration from `STREAMLABS_CLIENT_ID`, `STREAMLABS_CLIENT_SECRET`
//! and `STREAMLABS_REDIRECT_URI`. On the first run the authorization URL is logged and the
//! `code` from the redirect is read from stdin; later runs reuse the cached web token.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,hyper_util=off,hyper=off,reqwest=off,h2=off,rustls=off cargo run --example authorize --features tracing
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=authorize.log RUST_LOG=info,hyper_util=off,hyper=off,reqwest=off,h2=off,rustls=off cargo run --example authorize --features tracing
//! ```

use std::fs::File;
use std::io::BufRead as _;

use futures::StreamExt as _;
use streamlabs_socket_client::auth::{Config as OAuthConfig, StreamlabsOAuth};
use streamlabs_socket_client::session::{Config, StreamlabsSession};
use streamlabs_socket_client::ws::WsTransport;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let oauth = StreamlabsOAuth::new(
        OAuthConfig::builder()
            .client_id(std::env::var("STREAMLABS_CLIENT_ID")?)
            .client_secret(std::env::var("STREAMLABS_CLIENT_SECRET")?)
            .redirect_uri(std::env::var("STREAMLABS_REDIRECT_URI")?)
            .build(),
    )?;
    let cache_file =
        std::env::var("STREAMLABS_TOKEN_FILE").unwrap_or_else(|_| "token.txt".to_owned());
    let config = Config::builder().cache_file(cache_file).build();

    let mut session = StreamlabsSession::new(oauth, WsTransport::default(), config).await?;

    if !session.is_authorized() {
        info!(
            url = %session.authorization_url(),
            "Open this URL and paste the code from the redirect"
        );

        let mut code = String::new();
        std::io::stdin().lock().read_line(&mut code)?;
        session.authorize(code.trim()).await?;
        info!(path = %session.cache_file().path().display(), "Web token cached");
    }

    session.on_connect(|| info!("connected"))?;
    session.on_disconnect(|reason| warn!(%reason, "disconnected"))?;
    session.on_reconnect(|| info!("reconnected"))?;
    session.on_event(|payload| {
        info!(
            kind = payload.get("type").and_then(|t| t.as_str()).unwrap_or("unknown"),
            %payload,
            "alert"
        );
    })?;

    session.connect().await?;

    let mut events = Box::pin(session.events());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(Ok(event)) => debug!(?event),
                Some(Err(e)) => warn!(error = %e),
                None => break,
            },
        }
    }

    session.close();

    Ok(())
}
