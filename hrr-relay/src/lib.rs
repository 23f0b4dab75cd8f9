//! # Highrise Radio Relay Library (hrr-relay)
//!
//! Internet-radio relay: one looping broadcast, many HTTP listeners, all in
//! sync with a single scheduler clock.
//!
//! **Purpose:** Scan a folder of resident tracks, play them in a loop on a
//! virtual timeline, stream the current position to every listener, and let
//! listeners queue extra one-shot tracks fetched from YouTube.
//!
//! **Architecture:** `Broadcast` (queue + clock behind one mutex) driven by one
//! scheduler task; per-listener pump tasks follow its track-change signal.

pub mod acquire;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
