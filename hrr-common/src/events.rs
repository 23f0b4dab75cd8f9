//! Event types for the relay event system
//!
//! Provides the shared event definitions and the EventBus that carries them.
//! Events are emitted by the broadcast scheduler, the listener fan-out and the
//! add-track workflow, and are streamed to clients over SSE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Why the queue changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueChangeTrigger {
    /// Initial catalog scan populated the queue
    CatalogScan,
    /// A track was inserted by an add request
    TrackAdded,
    /// A one-shot track finished and was evicted
    Evicted,
    /// An unreadable track was dropped by the scheduler
    Dropped,
    /// A track was removed by an explicit request
    UserRemove,
}

/// Why a track was skipped instead of played to the end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The backing file could not be opened or read
    Unreadable,
    /// The backing file no longer exists
    Missing,
    /// A client asked to skip
    UserSkip,
    /// The current entry was removed from the queue
    Removed,
}

/// Relay event types
///
/// Serialized with an internal `type` tag so SSE clients can switch on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RadioEvent {
    /// A track started on the broadcast; every listener restarts at offset 0
    TrackStarted {
        track_id: Uuid,
        name: String,
        duration_ms: u64,
        queue_index: usize,
        /// Increments on every track change
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// A track played to the end of its duration
    TrackEnded {
        track_id: Uuid,
        name: String,
        /// True when the track was one-shot and left the queue
        evicted: bool,
        timestamp: DateTime<Utc>,
    },

    /// A track was skipped
    TrackSkipped {
        track_id: Uuid,
        name: String,
        reason: SkipReason,
        timestamp: DateTime<Utc>,
    },

    /// Queue is empty, nothing is playing
    BroadcastIdle {
        timestamp: DateTime<Utc>,
    },

    /// Queue contents changed
    QueueChanged {
        length: usize,
        trigger: QueueChangeTrigger,
        timestamp: DateTime<Utc>,
    },

    /// An add request finished and its track is queued
    TrackAdded {
        request_id: Uuid,
        track_id: Uuid,
        name: String,
        /// 1-based position in the queue
        position: usize,
        /// Tracks that will play before this one
        tracks_until_playback: usize,
        timestamp: DateTime<Utc>,
    },

    /// An add request failed during acquisition
    AcquisitionFailed {
        request_id: Uuid,
        query: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// An add request resolved to a track that is already queued
    DuplicateRejected {
        request_id: Uuid,
        source_key: String,
        timestamp: DateTime<Utc>,
    },

    /// A listener attached to the broadcast
    ListenerJoined {
        sink_id: Uuid,
        listeners: usize,
        offset_bytes: u64,
        timestamp: DateTime<Utc>,
    },

    /// A listener went away
    ListenerLeft {
        sink_id: Uuid,
        listeners: usize,
        timestamp: DateTime<Utc>,
    },
}

impl RadioEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            RadioEvent::TrackStarted { .. } => "TrackStarted",
            RadioEvent::TrackEnded { .. } => "TrackEnded",
            RadioEvent::TrackSkipped { .. } => "TrackSkipped",
            RadioEvent::BroadcastIdle { .. } => "BroadcastIdle",
            RadioEvent::QueueChanged { .. } => "QueueChanged",
            RadioEvent::TrackAdded { .. } => "TrackAdded",
            RadioEvent::AcquisitionFailed { .. } => "AcquisitionFailed",
            RadioEvent::DuplicateRejected { .. } => "DuplicateRejected",
            RadioEvent::ListenerJoined { .. } => "ListenerJoined",
            RadioEvent::ListenerLeft { .. } => "ListenerLeft",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lag and lose
/// the oldest events rather than blocking emitters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RadioEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit(&self, event: RadioEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
