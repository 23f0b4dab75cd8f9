//! HTTP request handlers
//!
//! Control and status endpoints. Errors leave through the single
//! `IntoResponse` impl for [`Error`] at the bottom of this file.

use super::server::AppContext;
use crate::acquire::{spawn_add_request, AcquisitionError, AddRequest};
use crate::error::Error;
use crate::playback::{BroadcastStatus, QueueEntryView, TrackSummary};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    status: String,
    message: String,
}

/// JSON form of an add request
#[derive(Debug, Deserialize)]
pub struct AddTrackRequest {
    #[serde(alias = "query")]
    track: String,
}

#[derive(Debug, Serialize)]
pub struct AddTrackResponse {
    status: String,
    request_id: Uuid,
    query: String,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    length: usize,
    entries: Vec<QueueEntryView>,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    status: String,
    track: TrackSummary,
}

// ============================================================================
// Health
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "hrr-relay".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Queue Control
// ============================================================================

/// POST /add - Queue a track by search query
///
/// Accepts `{"track": "..."}` or a plain-text body. Answers `202 Accepted` at
/// once; the outcome arrives on `/events` tagged with the returned request id.
pub async fn add_track(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<AddTrackResponse>), Error> {
    if !ctx.acquirer.is_available() {
        return Err(AcquisitionError::Disabled.into());
    }
    let query = parse_add_body(&headers, &body)?;

    // Known sources are rejected before anything is spawned
    for key in [Some(query.clone()), ctx.acquirer.source_key_hint(&query)]
        .into_iter()
        .flatten()
    {
        if ctx.broadcast.contains_source_key(&key).await {
            info!("Rejected duplicate add request for {}", key);
            return Err(Error::DuplicateTrack(key));
        }
    }

    let request = AddRequest::new(query.clone());
    info!(request_id = %request.id, "Add request: \"{}\"", query);
    let request_id = spawn_add_request(ctx.broadcast.clone(), ctx.acquirer.clone(), request);

    Ok((
        StatusCode::ACCEPTED,
        Json(AddTrackResponse {
            status: "accepted".to_string(),
            request_id,
            query,
        }),
    ))
}

fn parse_add_body(headers: &HeaderMap, body: &str) -> Result<String, Error> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    let query = if is_json {
        serde_json::from_str::<AddTrackRequest>(body)
            .map_err(|e| Error::BadRequest(format!("Invalid JSON: {}", e)))?
            .track
    } else {
        body.to_string()
    };

    let query = query.trim();
    if query.is_empty() {
        return Err(Error::BadRequest("Track query is empty".to_string()));
    }
    Ok(query.to_string())
}

/// POST /skip - End the current track now
pub async fn skip(State(ctx): State<AppContext>) -> Result<Json<TrackResponse>, Error> {
    let skipped = ctx.broadcast.skip().await?;
    Ok(Json(TrackResponse {
        status: "skipped".to_string(),
        track: TrackSummary::from(&skipped),
    }))
}

/// DELETE /queue/:track_id - Remove a queue entry
pub async fn remove_from_queue(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
) -> Result<Json<TrackResponse>, Error> {
    let removed = ctx.broadcast.remove(track_id).await?;
    Ok(Json(TrackResponse {
        status: "removed".to_string(),
        track: TrackSummary::from(&removed),
    }))
}

// ============================================================================
// Status
// ============================================================================

/// GET /queue - Queue in play order, current track first
pub async fn get_queue(State(ctx): State<AppContext>) -> Json<QueueResponse> {
    let entries = ctx.broadcast.queue_snapshot().await;
    Json(QueueResponse {
        length: entries.len(),
        entries,
    })
}

/// GET /status - Now-playing snapshot
pub async fn get_status(State(ctx): State<AppContext>) -> Json<BroadcastStatus> {
    Json(ctx.broadcast.status().await)
}

// ============================================================================
// Error Mapping
// ============================================================================

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::DuplicateTrack(_) | Error::Idle => StatusCode::CONFLICT,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Acquisition(AcquisitionError::Disabled) | Error::ListenerLimit(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Acquisition(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                status: "error".to_string(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
