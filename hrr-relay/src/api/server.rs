//! HTTP server setup and routing
//!
//! Listener endpoints (`/stream`, `/stream.mp3`), the add-track endpoint, a
//! few control and status routes, and an SSE feed of broadcast events.

use crate::acquire::Acquirer;
use crate::error::{Error, Result};
use crate::playback::Broadcast;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub broadcast: Arc<Broadcast>,
    pub acquirer: Arc<dyn Acquirer>,
}

impl AppContext {
    pub fn new(broadcast: Arc<Broadcast>, acquirer: Arc<dyn Acquirer>) -> Self {
        Self {
            broadcast,
            acquirer,
        }
    }
}

/// Build the router with every route attached
pub fn create_router(ctx: AppContext) -> Router {
    let index = include_str!("listener_ui.html");

    Router::new()
        // Listener page
        .route("/", get(move || async move { axum::response::Html(index) }))

        // Health endpoint
        .route("/health", get(super::handlers::health))

        // Listening
        .route("/stream", get(super::stream::stream))
        .route("/stream.mp3", get(super::stream::stream))

        // Queue control
        .route("/add", post(super::handlers::add_track))
        .route("/skip", post(super::handlers::skip))
        .route("/queue", get(super::handlers::get_queue))
        .route("/queue/:track_id", delete(super::handlers::remove_from_queue))

        // Status
        .route("/status", get(super::handlers::get_status))

        // SSE event stream
        .route("/events", get(super::sse::event_stream))

        // Attach application context
        .with_state(ctx)

        // Request logging
        .layer(TraceLayer::new_for_http())

        // Browser clients post from other origins; preflight for /add included
        .layer(CorsLayer::permissive())
}

/// Run HTTP API server until `shutdown` is cancelled
pub async fn run(
    addr: SocketAddr,
    ctx: AppContext,
    shutdown: tokio_util::sync::CancellationToken,
) -> Result<()> {
    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
