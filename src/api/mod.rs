//! HTTP server module
//!
//! Receives build-completion webhooks and exposes health, a server-sent
//! event stream of session progress, and the OpenAPI document.

use crate::{Relay, Result};
use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod validate;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the router with all route definitions
///
/// # Routes
///
/// ## Webhook
/// - `POST /build` - Build-completion notification from the build provider
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /events` - Server-sent events stream
/// - `GET /openapi.json` - OpenAPI document
pub fn create_router(relay: Relay) -> Router {
    let state = AppState::new(relay);

    Router::new()
        // Webhook
        .route("/build", post(routes::receive_build))
        // System
        .route("/health", get(routes::health_check))
        .route("/events", get(routes::event_stream))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the webhook endpoint until `shutdown` resolves
///
/// In-flight requests are allowed to finish once `shutdown` fires. Sessions
/// spawned by the relay are not waited for here; see [`Relay::shutdown`].
///
/// # Example
///
/// ```no_run
/// use build_relay::{Config, Relay};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let relay = Relay::new(Config::from_env()?)?;
///
/// build_relay::api::start_api_server(relay, async {
///     tokio::signal::ctrl_c().await.ok();
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server<F>(relay: Relay, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = relay.config().webhook.bind_address;

    tracing::info!(address = %bind_address, "Starting webhook server");

    let app = create_router(relay);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "Webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("Webhook server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
