//! # HRR Common Library
//!
//! Shared code for the Highrise radio relay crates:
//! - Error type
//! - Configuration file discovery and folder resolution
//! - Event types (RadioEvent enum) and EventBus
//! - SSE streaming of events
//! - Time formatting helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, RadioEvent};
