//! Scheduler
//!
//! The one timer loop per broadcast. States:
//! - **Idle**: queue empty; wait for an edit to wake us
//! - **Playing**: current track started, timer armed for its duration
//! - **TrackEnded**: evict one-shot tracks, advance past resident ones
//!
//! A manual transition (skip, remove of the current entry) stops the clock and
//! wakes the loop; the pending timer for the interrupted generation is dropped
//! and `Broadcast::end_track` ignores any expiry that still slips through.

use super::broadcast::Broadcast;
use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawn the scheduler loop
pub fn spawn(broadcast: Arc<Broadcast>) -> JoinHandle<()> {
    tokio::spawn(run(broadcast))
}

/// Scheduler loop; returns on shutdown
pub async fn run(broadcast: Arc<Broadcast>) {
    let shutdown = broadcast.shutdown_token().clone();
    let backoff = broadcast.settings().skip_backoff();
    let mut consecutive_failures = 0usize;
    // Queue length when the current run of failures began
    let mut failure_cycle = 0usize;

    info!("Scheduler started");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let track = match broadcast.current_track().await {
            Some(track) => track,
            None => {
                consecutive_failures = 0;
                broadcast.enter_idle().await;
                tokio::select! {
                    _ = broadcast.wake().notified() => {}
                    _ = shutdown.cancelled() => break,
                }
                continue;
            }
        };

        if let Err(e) = check_readable(&track.path).await {
            if consecutive_failures == 0 {
                failure_cycle = broadcast.queue_len().await;
            }
            let remaining = broadcast.drop_unreadable(&track, &e).await;
            consecutive_failures += 1;
            if remaining > 0 && consecutive_failures >= failure_cycle {
                warn!(
                    "{} tracks in a row failed to open, pausing for {:?}",
                    consecutive_failures, backoff
                );
                consecutive_failures = 0;
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
            continue;
        }

        let Some(now_playing) = broadcast.start_track(track.id).await else {
            // Queue edited between lookup and start; re-evaluate
            continue;
        };
        consecutive_failures = 0;

        let deadline = now_playing.started_at + track.duration();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(evicted) = broadcast.end_track(now_playing.generation).await {
                        broadcast.discard_file(&evicted).await;
                    }
                    break;
                }
                _ = broadcast.wake().notified() => {
                    if broadcast.is_live(now_playing.generation).await {
                        // Edit that did not touch the current track
                        continue;
                    }
                    debug!(
                        "Generation {} interrupted, re-evaluating",
                        now_playing.generation
                    );
                    break;
                }
                _ = shutdown.cancelled() => {
                    info!("Scheduler stopped");
                    return;
                }
            }
        }
    }

    info!("Scheduler stopped");
}

async fn check_readable(path: &Path) -> Result<()> {
    let opened = async {
        let file = tokio::fs::File::open(path).await?;
        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path is a directory",
            ));
        }
        Ok::<(), std::io::Error>(())
    };
    opened
        .await
        .map_err(|source| Error::track_read(path, source))
}
