//! Playback core
//!
//! One broadcast, one scheduler, many listeners:
//! - [`queue`]: play order and the current-entry cursor
//! - [`clock`]: wall-clock anchor for the current track
//! - [`broadcast`]: shared state behind one mutex, track-change signal
//! - [`scheduler`]: the timer loop that starts and ends tracks
//! - [`estimator`]: elapsed time to byte offset, for joins
//! - [`fanout`]: per-listener pump tasks

pub mod broadcast;
pub mod clock;
pub mod estimator;
pub mod fanout;
pub mod queue;
pub mod scheduler;

pub use broadcast::{
    Broadcast, BroadcastSignal, BroadcastStatus, NowPlaying, QueueEntryView, TrackSummary,
};
pub use clock::PlaybackClock;
pub use fanout::{attach, ListenerRegistry, ListenerStream};
pub use queue::{InsertOutcome, PlaybackQueue};
