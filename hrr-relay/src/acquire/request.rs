//! Add-track requests
//!
//! `POST /add` answers before anything is downloaded; the work runs here in a
//! background task and its outcome is published as a `RadioEvent`.

use super::Acquirer;
use crate::catalog::Track;
use crate::error::{Error, Result};
use crate::playback::{Broadcast, InsertOutcome};
use hrr_common::RadioEvent;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// One pending add request
#[derive(Debug, Clone)]
pub struct AddRequest {
    pub id: Uuid,
    pub query: String,
}

impl AddRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
        }
    }
}

/// Start `request` in the background and return its id
pub fn spawn_add_request(
    broadcast: Arc<Broadcast>,
    acquirer: Arc<dyn Acquirer>,
    request: AddRequest,
) -> Uuid {
    let id = request.id;
    tokio::spawn(async move {
        // Outcome is reported through events
        let _ = fulfil_add_request(&broadcast, acquirer.as_ref(), &request).await;
    });
    id
}

/// Resolve, de-duplicate, fetch and queue one request
///
/// The source key is claimed before the download and held until the track is
/// queued, so a second request for the same source fails as a duplicate
/// without fetching.
pub async fn fulfil_add_request(
    broadcast: &Broadcast,
    acquirer: &dyn Acquirer,
    request: &AddRequest,
) -> Result<InsertOutcome> {
    info!(
        request_id = %request.id,
        "Acquiring \"{}\" via {}",
        request.query,
        acquirer.name()
    );

    let result: Result<(Track, InsertOutcome)> = async {
        let source = acquirer.resolve(&request.query).await?;
        let _claim = broadcast
            .claim_source(&source.source_key)
            .await
            .ok_or_else(|| Error::DuplicateTrack(source.source_key.clone()))?;
        let track = acquirer.fetch(&source).await?;
        let outcome = broadcast.insert_after_current(track.clone()).await?;
        Ok((track, outcome))
    }
    .await;

    let events = broadcast.events();
    match result {
        Ok((track, outcome)) => {
            events.emit(RadioEvent::TrackAdded {
                request_id: request.id,
                track_id: track.id,
                name: track.display_name,
                position: outcome.index + 1,
                tracks_until_playback: outcome.tracks_until_playback,
                timestamp: hrr_common::time::now(),
            });
            Ok(outcome)
        }
        Err(Error::DuplicateTrack(source_key)) => {
            info!(request_id = %request.id, "Rejected duplicate {}", source_key);
            events.emit(RadioEvent::DuplicateRejected {
                request_id: request.id,
                source_key: source_key.clone(),
                timestamp: hrr_common::time::now(),
            });
            Err(Error::DuplicateTrack(source_key))
        }
        Err(e) => {
            warn!(request_id = %request.id, "Add request \"{}\" failed: {}", request.query, e);
            events.emit(RadioEvent::AcquisitionFailed {
                request_id: request.id,
                query: request.query.clone(),
                message: e.to_string(),
                timestamp: hrr_common::time::now(),
            });
            Err(e)
        }
    }
}
