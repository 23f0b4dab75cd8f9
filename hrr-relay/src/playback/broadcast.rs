//! Broadcast
//!
//! The one shared logical stream every listener joins.
//!
//! **Responsibilities:**
//! - Own the queue and clock behind a single mutex, so a scheduler tick never
//!   observes a half-applied edit
//! - Publish track changes on a `watch` channel; sink pumps follow it
//! - Wake the scheduler when an edit changes what should be playing
//!
//! **Ownership:** only the scheduler starts and ends tracks (`start_track`,
//! `end_track`). Everything else edits the queue and, when it disturbs the
//! current track, stops the clock and wakes the scheduler to re-evaluate.

use super::fanout::ListenerRegistry;
use super::queue::{InsertOutcome, PlaybackQueue};
use super::PlaybackClock;
use crate::catalog::{Provenance, Track};
use crate::config::StreamSettings;
use crate::error::{Error, Result};
use hrr_common::events::{QueueChangeTrigger, SkipReason};
use hrr_common::{EventBus, RadioEvent};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The track currently on air
#[derive(Debug, Clone)]
pub struct NowPlaying {
    /// Increments on every track start; identifies one playback window
    pub generation: u64,
    pub track: Arc<Track>,
    pub started_at: Instant,
    pub queue_index: usize,
}

/// What sinks should be streaming
#[derive(Debug, Clone)]
pub enum BroadcastSignal {
    Idle,
    Playing(NowPlaying),
}

impl BroadcastSignal {
    pub fn now_playing(&self) -> Option<&NowPlaying> {
        match self {
            BroadcastSignal::Playing(np) => Some(np),
            BroadcastSignal::Idle => None,
        }
    }
}

/// Serializable view of a track
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub id: Uuid,
    pub name: String,
    pub duration_ms: u64,
    pub bitrate_bps: u32,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            name: track.display_name.clone(),
            duration_ms: track.duration_ms,
            bitrate_bps: track.bitrate_bps,
            provenance: track.provenance,
            source_key: track.source_key.clone(),
        }
    }
}

/// Now-playing snapshot
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStatus {
    /// "playing" or "idle"
    pub state: &'static str,
    pub track: Option<TrackSummary>,
    pub elapsed_ms: u64,
    /// Elapsed and total as `M:SS / M:SS`
    pub position: Option<String>,
    pub queue_index: Option<usize>,
    pub queue_length: usize,
    pub listeners: usize,
    pub generation: u64,
}

/// One queue entry in play order
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntryView {
    /// 0 is the current track
    pub order: usize,
    pub is_current: bool,
    #[serde(flatten)]
    pub track: TrackSummary,
}

struct BroadcastState {
    queue: PlaybackQueue,
    clock: PlaybackClock,
    generation: u64,
}

/// Shared broadcast: queue, clock, listener set and track-change signal
pub struct Broadcast {
    state: Mutex<BroadcastState>,
    signal: watch::Sender<BroadcastSignal>,
    wake: Notify,
    /// Source keys of add requests between resolution and insert
    pending_sources: std::sync::Mutex<HashSet<String>>,
    events: EventBus,
    listeners: ListenerRegistry,
    settings: StreamSettings,
    delete_after_play: bool,
    shutdown: CancellationToken,
}

/// Reservation of a source key for one add request; released on drop
pub(crate) struct SourceClaim<'a> {
    broadcast: &'a Broadcast,
    key: String,
}

impl Drop for SourceClaim<'_> {
    fn drop(&mut self) {
        self.broadcast
            .pending_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl Broadcast {
    pub fn new(settings: StreamSettings, events: EventBus, shutdown: CancellationToken) -> Self {
        let (signal, _) = watch::channel(BroadcastSignal::Idle);
        Self {
            state: Mutex::new(BroadcastState {
                queue: PlaybackQueue::new(),
                clock: PlaybackClock::new(),
                generation: 0,
            }),
            signal,
            wake: Notify::new(),
            pending_sources: std::sync::Mutex::new(HashSet::new()),
            events,
            listeners: ListenerRegistry::default(),
            settings,
            delete_after_play: false,
            shutdown,
        }
    }

    /// Delete acquired files once they leave the queue
    pub fn with_delete_after_play(mut self, enabled: bool) -> Self {
        self.delete_after_play = enabled;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Stop the scheduler and end every listener stream
    pub fn shutdown(&self) {
        info!("Broadcast shutting down");
        self.shutdown.cancel();
    }

    /// Follow track changes; the current value is marked seen
    pub fn subscribe(&self) -> watch::Receiver<BroadcastSignal> {
        self.signal.subscribe()
    }

    /// Current track-change signal
    pub fn signal(&self) -> BroadcastSignal {
        self.signal.borrow().clone()
    }

    // ========================================================================
    // Queue edits
    // ========================================================================

    /// Append the startup catalog scan
    pub async fn load_catalog(&self, tracks: Vec<Track>) {
        if tracks.is_empty() {
            warn!("No resident tracks; broadcast idles until the first add");
            return;
        }
        self.append_all(tracks, QueueChangeTrigger::CatalogScan).await;
    }

    /// Add to the tail; returns the new entry's index
    pub async fn append(&self, track: Track) -> usize {
        self.append_all(vec![track], QueueChangeTrigger::TrackAdded)
            .await
    }

    /// Index of the last appended entry
    async fn append_all(&self, tracks: Vec<Track>, trigger: QueueChangeTrigger) -> usize {
        let (index, length, was_empty) = {
            let mut state = self.state.lock().await;
            let was_empty = state.queue.is_empty();
            let mut index = 0;
            for track in tracks {
                index = state.queue.append(track);
            }
            (index, state.queue.len(), was_empty)
        };

        self.emit_queue_changed(length, trigger);
        if was_empty {
            self.wake.notify_one();
        }
        index
    }

    /// Queue a track to play right after the current one
    ///
    /// Restarts an idle broadcast. Duplicate source keys are rejected.
    pub async fn insert_after_current(&self, track: Track) -> Result<InsertOutcome> {
        let name = track.display_name.clone();
        let (outcome, length, was_empty) = {
            let mut state = self.state.lock().await;
            let was_empty = state.queue.is_empty();
            let outcome = state.queue.insert_after_current(track)?;
            (outcome, state.queue.len(), was_empty)
        };

        info!(
            "Queued \"{}\" at position {} ({} tracks ahead of it)",
            name,
            outcome.index + 1,
            outcome.tracks_until_playback
        );
        self.emit_queue_changed(length, QueueChangeTrigger::TrackAdded);
        if was_empty {
            self.wake.notify_one();
        }
        Ok(outcome)
    }

    /// True if `key` is queued or an add request for it is in progress
    pub async fn contains_source_key(&self, key: &str) -> bool {
        self.is_pending(key) || self.state.lock().await.queue.contains_source_key(key)
    }

    fn is_pending(&self, key: &str) -> bool {
        self.pending_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Reserve `key` for one add request
    ///
    /// `None` when the source is already queued or claimed by another request.
    pub(crate) async fn claim_source(&self, key: &str) -> Option<SourceClaim<'_>> {
        if self.state.lock().await.queue.contains_source_key(key) {
            return None;
        }
        let inserted = self
            .pending_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
        inserted.then(|| SourceClaim {
            broadcast: self,
            key: key.to_string(),
        })
    }

    /// End the current track now, as if its timer had fired
    pub async fn skip(&self) -> Result<Track> {
        let (skipped, evicted, length) = {
            let mut state = self.state.lock().await;
            if !state.clock.is_playing() {
                return Err(Error::Idle);
            }
            let skipped = state.queue.current().cloned().ok_or(Error::Idle)?;
            let evicted = state.queue.finish_current();
            state.clock.stop();
            (skipped, evicted, state.queue.len())
        };

        info!("Skipping \"{}\"", skipped.display_name);
        self.emit_skipped(&skipped, SkipReason::UserSkip);
        if let Some(evicted) = evicted {
            self.emit_queue_changed(length, QueueChangeTrigger::Evicted);
            self.discard_file(&evicted).await;
        }
        self.wake.notify_one();
        Ok(skipped)
    }

    /// Remove any entry; removing the current one switches tracks immediately
    pub async fn remove(&self, id: Uuid) -> Result<Track> {
        let (removed, interrupted, length) = {
            let mut state = self.state.lock().await;
            let removed = state
                .queue
                .remove(id)
                .ok_or_else(|| Error::NotFound(format!("Queue entry {id}")))?;
            let interrupted = removed.was_current && state.clock.is_playing();
            if interrupted {
                state.clock.stop();
            }
            (removed.track, interrupted, state.queue.len())
        };

        info!("Removed \"{}\" from the queue", removed.display_name);
        if interrupted {
            self.emit_skipped(&removed, SkipReason::Removed);
            self.wake.notify_one();
        }
        self.emit_queue_changed(length, QueueChangeTrigger::UserRemove);
        self.discard_file(&removed).await;
        Ok(removed)
    }

    // ========================================================================
    // Read side
    // ========================================================================

    pub async fn status(&self) -> BroadcastStatus {
        let state = self.state.lock().await;
        let playing = state.clock.is_playing();
        let track = if playing { state.queue.current() } else { None };
        let elapsed_ms = state.clock.elapsed_ms(Instant::now());

        BroadcastStatus {
            state: if track.is_some() { "playing" } else { "idle" },
            position: track.map(|t| {
                format!(
                    "{} / {}",
                    hrr_common::time::format_ms(elapsed_ms.min(t.duration_ms)),
                    hrr_common::time::format_ms(t.duration_ms)
                )
            }),
            track: track.map(TrackSummary::from),
            elapsed_ms,
            queue_index: if playing { state.queue.current_index() } else { None },
            queue_length: state.queue.len(),
            listeners: self.listeners.count(),
            generation: state.generation,
        }
    }

    /// Queue in play order, current entry first
    pub async fn queue_snapshot(&self) -> Vec<QueueEntryView> {
        let state = self.state.lock().await;
        let current_id = state.queue.current().map(|t| t.id);
        state
            .queue
            .upcoming()
            .enumerate()
            .map(|(order, track)| QueueEntryView {
                order,
                is_current: Some(track.id) == current_id && state.clock.is_playing(),
                track: TrackSummary::from(track),
            })
            .collect()
    }

    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    // ========================================================================
    // Scheduler side
    // ========================================================================

    pub(crate) fn wake(&self) -> &Notify {
        &self.wake
    }

    /// Entry the scheduler should play next
    pub(crate) async fn current_track(&self) -> Option<Track> {
        let mut state = self.state.lock().await;
        state.queue.clamp();
        state.queue.current().cloned()
    }

    /// Start `track_id` if it is still the current entry
    pub(crate) async fn start_track(&self, track_id: Uuid) -> Option<NowPlaying> {
        let mut state = self.state.lock().await;
        let queue_index = state.queue.current_index()?;
        let track = state.queue.current().filter(|t| t.id == track_id)?.clone();

        let now = Instant::now();
        state.clock.start(now);
        state.generation += 1;

        let now_playing = NowPlaying {
            generation: state.generation,
            track: Arc::new(track),
            started_at: now,
            queue_index,
        };
        self.signal
            .send_replace(BroadcastSignal::Playing(now_playing.clone()));

        info!(
            track = %now_playing.track.display_name,
            generation = now_playing.generation,
            "Now playing \"{}\" ({})",
            now_playing.track.display_name,
            hrr_common::time::format_ms(now_playing.track.duration_ms)
        );
        self.events.emit(RadioEvent::TrackStarted {
            track_id,
            name: now_playing.track.display_name.clone(),
            duration_ms: now_playing.track.duration_ms,
            queue_index,
            generation: now_playing.generation,
            timestamp: hrr_common::time::now(),
        });

        Some(now_playing)
    }

    /// True while `generation` is on air and nobody has interrupted it
    pub(crate) async fn is_live(&self, generation: u64) -> bool {
        let state = self.state.lock().await;
        state.generation == generation && state.clock.is_playing()
    }

    /// Timer expiry for `generation`; returns the evicted track, if any
    ///
    /// Stale generations (already interrupted by a skip or remove) are ignored.
    pub(crate) async fn end_track(&self, generation: u64) -> Option<Track> {
        let (ended, evicted, length) = {
            let mut state = self.state.lock().await;
            if state.generation != generation || !state.clock.is_playing() {
                debug!("Ignoring stale track timer for generation {}", generation);
                return None;
            }
            let ended = state.queue.current().cloned()?;
            let evicted = state.queue.finish_current();
            state.clock.stop();
            (ended, evicted, state.queue.len())
        };

        debug!("Track ended: \"{}\"", ended.display_name);
        self.events.emit(RadioEvent::TrackEnded {
            track_id: ended.id,
            name: ended.display_name.clone(),
            evicted: evicted.is_some(),
            timestamp: hrr_common::time::now(),
        });
        if evicted.is_some() {
            info!("Evicted one-shot track \"{}\"", ended.display_name);
            self.emit_queue_changed(length, QueueChangeTrigger::Evicted);
        }
        evicted
    }

    /// Skip a track whose file could not be opened; returns the queue length
    ///
    /// Missing files leave the queue whatever their provenance. Other errors
    /// follow the usual end-of-track rule.
    pub(crate) async fn drop_unreadable(&self, track: &Track, error: &Error) -> usize {
        let missing = matches!(
            error,
            Error::TrackRead { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        );
        let (removed, length) = {
            let mut state = self.state.lock().await;
            if state.queue.current().map(|t| t.id) != Some(track.id) {
                return state.queue.len();
            }
            let removed = if missing {
                state.queue.remove_current()
            } else {
                state.queue.finish_current()
            };
            (removed, state.queue.len())
        };

        warn!("Skipping unreadable track \"{}\": {}", track.display_name, error);
        let reason = if missing {
            SkipReason::Missing
        } else {
            SkipReason::Unreadable
        };
        self.emit_skipped(track, reason);

        if let Some(removed) = removed {
            let trigger = if missing {
                QueueChangeTrigger::Dropped
            } else {
                QueueChangeTrigger::Evicted
            };
            self.emit_queue_changed(length, trigger);
            if !missing {
                self.discard_file(&removed).await;
            }
        }
        length
    }

    /// Publish idle once; called by the scheduler when the queue is empty
    pub(crate) async fn enter_idle(&self) {
        self.state.lock().await.clock.stop();

        let changed = self.signal.send_if_modified(|signal| {
            if matches!(signal, BroadcastSignal::Idle) {
                false
            } else {
                *signal = BroadcastSignal::Idle;
                true
            }
        });

        if changed {
            info!("Queue empty, broadcast idle");
            self.events.emit(RadioEvent::BroadcastIdle {
                timestamp: hrr_common::time::now(),
            });
        }
    }

    /// Best-effort removal of an acquired file that left the queue
    pub(crate) async fn discard_file(&self, track: &Track) {
        if !self.delete_after_play || !track.is_one_shot() {
            return;
        }
        let path: PathBuf = track.path.clone();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Deleted {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not delete {}: {}", path.display(), e),
        }
    }

    fn emit_skipped(&self, track: &Track, reason: SkipReason) {
        self.events.emit(RadioEvent::TrackSkipped {
            track_id: track.id,
            name: track.display_name.clone(),
            reason,
            timestamp: hrr_common::time::now(),
        });
    }

    fn emit_queue_changed(&self, length: usize, trigger: QueueChangeTrigger) {
        self.events.emit(RadioEvent::QueueChanged {
            length,
            trigger,
            timestamp: hrr_common::time::now(),
        });
    }
}
