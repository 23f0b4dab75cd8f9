//! Error types for hrr-relay
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Track read failures are returned as `TrackRead`; the scheduler and the fan-out
//! log them and recover locally, so they never reach an HTTP response.

use crate::acquire::AcquisitionError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for hrr-relay
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// A track with the same source key is already queued
    #[error("Duplicate track: {0} is already in the queue")]
    DuplicateTrack(String),

    /// The backing file of a track could not be opened or read
    #[error("Cannot read track {path}: {source}")]
    TrackRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Acquiring a track from the external source failed
    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// Nothing is playing
    #[error("Broadcast is idle")]
    Idle,

    /// Listener limit reached
    #[error("Listener limit of {0} reached")]
    ListenerLimit(usize),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// Read failure for the file behind a track
    pub fn track_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::TrackRead {
            path: path.into(),
            source,
        }
    }
}

impl From<hrr_common::Error> for Error {
    fn from(e: hrr_common::Error) -> Self {
        match e {
            hrr_common::Error::Io(e) => Error::Io(e),
            hrr_common::Error::Config(msg) => Error::Config(msg),
        }
    }
}

/// Convenience Result type using hrr-relay Error
pub type Result<T> = std::result::Result<T, Error>;
