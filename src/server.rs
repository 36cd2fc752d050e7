//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding the enricher,
//! config metadata, and uptime), [`build_router`] for mounting the
//! enricher behind `/health` and the middleware layers,
//! [`build_http_client`] for the connection-pooled hyper client shared by
//! enrichment fetches and upstream forwarding, and [`shutdown_signal`],
//! which resolves once the process is told to stop.

use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ConfigVersion;
use crate::enrich::Enricher;
use crate::health::health_handler;

#[derive(Debug)]
pub struct LoadedConfig {
    pub version: ConfigVersion,
    pub source_name: String,
    pub upstream: String,
    pub loaded_at: Instant,
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub config: LoadedConfig,
    pub enricher: Enricher,
    pub start_time: Instant,
}

/// Idle pooled connections to enrichment services and the upstream are
/// closed after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Plain-HTTP and TLS connector over the webpki roots.
fn connector() -> HttpsConnector {
    // rustls cannot pick a crypto provider on its own when several are
    // compiled in; installing twice is a no-op.
    let _ = rustls::crypto::ring::default_provider().install_default();
    hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build()
}

/// The pooled client shared by [`HttpFetcher`](crate::enrich::HttpFetcher),
/// [`ForwardHandler`](crate::upstream::ForwardHandler) and the `health`
/// command.
#[must_use]
pub fn build_http_client() -> HttpClient {
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .build(connector())
}

pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    let enricher = state.enricher.clone();
    Router::new()
        .route("/health", get(health_handler))
        .fallback_service(enricher)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

/// What asked the server to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM; in-flight enrichments are then drained
/// by axum's graceful shutdown.
pub async fn shutdown_signal() {
    let signal = tokio::select! {
        () = interrupted() => ShutdownSignal::Interrupt,
        () = terminated() => ShutdownSignal::Terminate,
    };
    tracing::info!(signal = signal.as_str(), "shutting down, draining in-flight requests");
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminated() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending::<()>().await;
}
