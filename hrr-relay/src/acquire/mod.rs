//! Track acquisition
//!
//! Turns a free-text query into a one-shot [`Track`] on local disk. Split in
//! two steps so the caller can reject duplicates before paying for a download:
//! - `resolve`: query → source identity (cheap, network search)
//! - `fetch`: source identity → downloaded, probed file (slow, external tool)
//!
//! Implementations must be safe to call concurrently with playback.

pub mod request;
pub mod youtube;

use crate::catalog::Track;
use async_trait::async_trait;
use thiserror::Error;

pub use request::{fulfil_add_request, spawn_add_request, AddRequest};
pub use youtube::YouTubeAcquirer;

/// Acquisition failures, reported to the requester and never to the broadcast
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// The search returned nothing usable
    #[error("No result for query \"{0}\"")]
    NotFound(String),

    /// Adding tracks is switched off in configuration
    #[error("Track acquisition is disabled")]
    Disabled,

    /// The download tool is not installed
    #[error("Download tool not available: {0}")]
    ToolMissing(String),

    /// The download tool ran and failed
    #[error("Download failed: {0}")]
    ToolFailed(String),

    /// Search request failed
    #[error("Network error: {0}")]
    Network(String),

    /// The download did not finish in time
    #[error("Download timed out after {0}s")]
    Timeout(u64),

    /// Local file handling failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AcquisitionError {
    fn from(e: reqwest::Error) -> Self {
        AcquisitionError::Network(e.to_string())
    }
}

/// Identity of a remote source, known before anything is downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// De-duplication key, stable for the same remote item
    pub source_key: String,
    /// Location handed to the downloader
    pub url: String,
    /// Name to show for the track
    pub title: String,
}

/// External track source
#[async_trait]
pub trait Acquirer: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &'static str;

    /// False when every request would fail without trying
    fn is_available(&self) -> bool {
        true
    }

    /// Source key a query names directly, when known without any lookup
    fn source_key_hint(&self, _query: &str) -> Option<String> {
        None
    }

    /// Find the remote item a query refers to
    async fn resolve(&self, query: &str) -> Result<ResolvedSource, AcquisitionError>;

    /// Download and probe a resolved item into an acquired track
    async fn fetch(&self, source: &ResolvedSource) -> Result<Track, AcquisitionError>;
}

/// Resolve and fetch in one call
pub async fn acquire_track(
    acquirer: &dyn Acquirer,
    query: &str,
) -> Result<Track, AcquisitionError> {
    let source = acquirer.resolve(query).await?;
    acquirer.fetch(&source).await
}

/// Acquirer used when acquisition is switched off
pub struct DisabledAcquirer;

#[async_trait]
impl Acquirer for DisabledAcquirer {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn resolve(&self, _query: &str) -> Result<ResolvedSource, AcquisitionError> {
        Err(AcquisitionError::Disabled)
    }

    async fn fetch(&self, _source: &ResolvedSource) -> Result<Track, AcquisitionError> {
        Err(AcquisitionError::Disabled)
    }
}
