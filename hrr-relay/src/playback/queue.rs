//! Playback queue
//!
//! Ordered list of tracks in play order, plus the cursor naming the entry
//! that is currently playing. The cursor lives here rather than in the clock
//! so every mutation can re-clamp it in the same step.
//!
//! **Insert rule:** new tracks go directly after the current track, behind any
//! acquired tracks already waiting there (first come, first played).

use crate::catalog::Track;
use crate::error::{Error, Result};
use uuid::Uuid;

/// Where an inserted track landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Index in the queue
    pub index: usize,
    /// Tracks that will play between the current one and the new one
    pub tracks_until_playback: usize,
}

/// Result of removing an arbitrary entry
#[derive(Debug, Clone)]
pub struct Removed {
    pub track: Track,
    pub was_current: bool,
}

/// Play-order queue with a wrapping cursor
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    entries: Vec<Track>,
    current: usize,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue holding `tracks` in order, cursor at the first
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        Self {
            entries: tracks,
            current: 0,
        }
    }

    /// Add to the tail
    pub fn append(&mut self, track: Track) -> usize {
        self.entries.push(track);
        self.entries.len() - 1
    }

    /// Insert so the track plays next, after pending acquired tracks
    ///
    /// Fails with [`Error::DuplicateTrack`] when the source key is already queued.
    pub fn insert_after_current(&mut self, track: Track) -> Result<InsertOutcome> {
        if let Some(key) = track.source_key.as_deref() {
            if self.contains_source_key(key) {
                return Err(Error::DuplicateTrack(key.to_string()));
            }
        }

        if self.entries.is_empty() {
            self.entries.push(track);
            self.current = 0;
            return Ok(InsertOutcome {
                index: 0,
                tracks_until_playback: 0,
            });
        }

        self.clamp();
        let len = self.entries.len();

        // Walk past the run of acquired tracks waiting behind the current one
        let mut offset = 1;
        while offset < len && self.entries[(self.current + offset) % len].is_one_shot() {
            offset += 1;
        }

        let target = self.current + offset;
        let index = if target <= len {
            self.entries.insert(target, track);
            target
        } else {
            // The waiting run wrapped past the tail
            let index = target - len;
            self.entries.insert(index, track);
            self.current += 1;
            index
        };

        Ok(InsertOutcome {
            index,
            tracks_until_playback: offset - 1,
        })
    }

    /// Remove the current entry, cursor stays on the entry that followed it
    pub fn remove_current(&mut self) -> Option<Track> {
        if self.entries.is_empty() {
            return None;
        }
        self.clamp();
        let track = self.entries.remove(self.current);
        self.clamp();
        Some(track)
    }

    /// Move the cursor to the next entry, wrapping to 0
    pub fn advance(&mut self) {
        if !self.entries.is_empty() {
            self.current = (self.current + 1) % self.entries.len();
        }
    }

    /// Apply the track-ended rule to the current entry
    ///
    /// One-shot tracks are removed and returned; resident tracks advance the cursor.
    pub fn finish_current(&mut self) -> Option<Track> {
        match self.current() {
            Some(track) if track.is_one_shot() => self.remove_current(),
            Some(_) => {
                self.advance();
                None
            }
            None => None,
        }
    }

    /// Remove any entry by id, keeping the cursor on the same track when possible
    pub fn remove(&mut self, id: Uuid) -> Option<Removed> {
        let index = self.position(id)?;
        let was_current = index == self.current;
        let track = self.entries.remove(index);
        if index < self.current {
            self.current -= 1;
        }
        self.clamp();
        Some(Removed { track, was_current })
    }

    /// Reset the cursor to 0 if it points past the tail
    pub fn clamp(&mut self) {
        if self.current >= self.entries.len() {
            self.current = 0;
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.entries.get(self.current)
    }

    pub fn current_index(&self) -> Option<usize> {
        (self.current < self.entries.len()).then_some(self.current)
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|t| t.id == id)
    }

    pub fn contains_source_key(&self, key: &str) -> bool {
        self.entries
            .iter()
            .any(|t| t.source_key.as_deref() == Some(key))
    }

    /// Entries in play order, starting with the current one
    pub fn upcoming(&self) -> impl Iterator<Item = &Track> {
        let split = self.current.min(self.entries.len());
        self.entries[split..].iter().chain(self.entries[..split].iter())
    }

    /// Entries in storage order
    pub fn tracks(&self) -> &[Track] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
