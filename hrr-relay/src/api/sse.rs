//! Server-Sent Events endpoint
//!
//! Each stream ends when the relay shuts down.

use super::server::AppContext;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /events - broadcast events as SSE
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let shutdown = ctx.broadcast.shutdown_token().clone().cancelled_owned();
    hrr_common::sse::event_stream(ctx.broadcast.events(), "hrr-relay", shutdown)
}
