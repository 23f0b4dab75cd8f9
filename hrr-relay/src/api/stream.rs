//! Listener endpoint
//!
//! `GET /stream` joins the broadcast. The response body is the sink's channel;
//! it stays open across track changes and ends only when the client leaves or
//! the relay shuts down. While idle the answer is `204 No Content`.

use super::server::AppContext;
use crate::error::Error;
use crate::playback::fanout;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

/// GET /stream, GET /stream.mp3
pub async fn stream(State(ctx): State<AppContext>) -> Response {
    match fanout::attach(&ctx.broadcast).await {
        Ok(listener) => {
            debug!(sink_id = %listener.sink_id, "Streaming to new listener");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "audio/mpeg"),
                    (header::CACHE_CONTROL, "no-cache, no-store"),
                ],
                Body::from_stream(listener.into_stream()),
            )
                .into_response()
        }
        Err(Error::Idle) => (
            StatusCode::NO_CONTENT,
            [(header::CACHE_CONTROL, "no-cache")],
        )
            .into_response(),
        // Listener limit: 503
        Err(e) => e.into_response(),
    }
}
