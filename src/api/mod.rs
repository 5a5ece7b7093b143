//! Trigger API
//!
//! A small HTTP surface for starting batch runs on demand. A run started here
//! reads the configured data file and sends the requester a confirmation
//! message once every other record has been attempted.

use crate::Result;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error_response;
pub mod identity;
pub mod openapi;
pub mod routes;
pub mod state;

pub use identity::{Identity, IdentityClient};
pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `POST /send` - Run the configured batch (requires the session cookie)
pub fn create_router(state: AppState) -> Router {
    let session_cookie = state.config.api.session_cookie.clone();

    let protected = Router::new()
        .route("/send", post(routes::send_batch))
        .route_layer(middleware::from_fn_with_state(
            session_cookie,
            auth::require_session,
        ));

    Router::new()
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the API server on the configured bind address.
///
/// Runs until `state.shutdown` is cancelled.
pub async fn start_api_server(state: AppState) -> Result<()> {
    let bind_address = state.config.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    serve(listener, state).await
}

/// Serve the API on an already bound listener until `state.shutdown` fires
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    if let Ok(address) = listener.local_addr() {
        tracing::info!(
            address = %address,
            "API server listening"
        );
    }

    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
