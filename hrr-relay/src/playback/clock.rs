//! Playback clock
//!
//! Wall-clock anchor for the current track. Uses `tokio::time::Instant` so
//! paused-time tests drive it the same way they drive the scheduler timer.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    track_started_at: Option<Instant>,
    is_playing: bool,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor a new track at `now`
    pub fn start(&mut self, now: Instant) {
        self.track_started_at = Some(now);
        self.is_playing = true;
    }

    /// Pause; the anchor is kept for inspection but no longer meaningful
    pub fn stop(&mut self) {
        self.is_playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn track_started_at(&self) -> Option<Instant> {
        self.track_started_at
    }

    /// Time since the current track started, zero when stopped
    pub fn elapsed(&self, now: Instant) -> Duration {
        match (self.is_playing, self.track_started_at) {
            (true, Some(started)) => now.saturating_duration_since(started),
            _ => Duration::ZERO,
        }
    }

    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        self.elapsed(now).as_millis() as u64
    }
}
