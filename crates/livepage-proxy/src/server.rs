//! Axum HTTP server: shared state, router, listener, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::LiveConfig;
use crate::exclusion::{ExclusionSet, PathRoute};
use crate::proxy::{correlation, live, local};

/// Shared application state. Read-only once the server starts.
#[derive(Clone)]
pub struct AppState {
    pub live: Arc<LiveConfig>,
    pub exclusions: Arc<ExclusionSet>,
    pub live_client: reqwest::Client,
    pub dev_client: reqwest::Client,
}

impl AppState {
    /// Build the upstream clients around validated settings.
    ///
    /// Neither client follows redirects: the browser must see them. The dev
    /// server client accepts self-signed certificates.
    pub fn new(
        live: LiveConfig,
        exclusions: ExclusionSet,
        live_timeout: Duration,
        dev_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let live_client = reqwest::Client::builder()
            .timeout(live_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let dev_client = reqwest::Client::builder()
            .timeout(dev_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            live: Arc::new(live),
            exclusions: Arc::new(exclusions),
            live_client,
            dev_client,
        })
    }
}

/// Every path goes through one handler; routing is the path classifier's job.
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Build and run the HTTP server.
pub async fn run(state: AppState, listen_addr: &str) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(address = %listen_addr, "livepage-proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("livepage-proxy shut down gracefully");
    Ok(())
}

/// Route one request to the dev server or through the live-origin pipeline.
async fn handle_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let request_id = correlation::generate_id();
    let route = state.exclusions.classify(request.uri().path());

    let span = livepage_tracing::proxy_request_span!(
        request_id,
        request.method(),
        request.uri().path()
    );
    span.record("route", route.as_str());

    async {
        tracing::debug!(route = route.as_str(), "Routing request");
        match route {
            PathRoute::PassThrough => {
                local::forward_to_dev_server(&state.dev_client, &state.live.dev_server.origin(), request)
                    .await
            }
            PathRoute::Intercept => live::forward_to_live(&state.live_client, &state.live, request).await,
        }
    }
    .instrument(span)
    .await
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler, shutdown signal disabled");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
