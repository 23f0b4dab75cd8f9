//! Track catalog
//!
//! **Responsibilities:**
//! - Track entity shared by the queue, scheduler and fan-out
//! - Startup scan of the resident playlist folder
//! - Best-effort duration/bitrate metadata (see [`probe`])
//!
//! Resident tracks loop forever; acquired tracks play once and are evicted.

pub mod probe;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

pub use probe::{probe_track, TrackMetadata};

/// Duration used when a file cannot be probed at all
pub const DEFAULT_DURATION_MS: u64 = 180_000;

/// Nominal bitrate (128 kbps) used when none can be derived
pub const DEFAULT_BITRATE_BPS: u32 = 128_000;

/// File extensions accepted by the catalog scan
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac"];

/// Where a track came from, which decides whether it recurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Permanent catalog member, cycles indefinitely
    Resident,
    /// Fetched on demand, played at most once
    Acquired,
}

/// One playable audio item
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    /// Stable identity for queue operations and events
    pub id: Uuid,

    /// Backing file
    pub path: PathBuf,

    /// Name for logs and status output
    pub display_name: String,

    /// Scheduling length; authoritative even when estimated
    pub duration_ms: u64,

    /// Nominal bitrate, used only to estimate join offsets
    pub bitrate_bps: u32,

    pub provenance: Provenance,

    /// External identity used to reject duplicate inserts
    pub source_key: Option<String>,
}

impl Track {
    /// Create a resident track from probed metadata
    pub fn resident(path: impl Into<PathBuf>, metadata: TrackMetadata) -> Self {
        Self::new(path.into(), metadata, Provenance::Resident, None)
    }

    /// Create a one-shot acquired track
    pub fn acquired(
        path: impl Into<PathBuf>,
        metadata: TrackMetadata,
        source_key: impl Into<String>,
    ) -> Self {
        Self::new(
            path.into(),
            metadata,
            Provenance::Acquired,
            Some(source_key.into()),
        )
    }

    fn new(
        path: PathBuf,
        metadata: TrackMetadata,
        provenance: Provenance,
        source_key: Option<String>,
    ) -> Self {
        let display_name = display_name_for(&path);
        Self {
            id: Uuid::new_v4(),
            path,
            display_name,
            duration_ms: metadata.duration_ms,
            bitrate_bps: metadata.bitrate_bps.max(1),
            provenance,
            source_key,
        }
    }

    /// Override the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Duration for offset math and timers; never zero
    pub fn effective_duration_ms(&self) -> u64 {
        self.duration_ms.max(1)
    }

    /// Playback window length
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.effective_duration_ms())
    }

    /// True for tracks that leave the queue after playing
    pub fn is_one_shot(&self) -> bool {
        self.provenance == Provenance::Acquired
    }
}

/// File stem, falling back to the full path
fn display_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// True when the path has one of [`AUDIO_EXTENSIONS`]
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Scan `dir` for resident tracks
///
/// Recurses into subfolders, orders by file name so the broadcast order is
/// stable across restarts, and probes each file. A missing or unreadable
/// folder yields an empty list: the broadcast then idles until the first add.
pub async fn scan_resident_tracks(dir: &Path) -> Vec<Track> {
    let dir = dir.to_path_buf();
    let scan_dir = dir.clone();

    let result = tokio::task::spawn_blocking(move || scan_blocking(&scan_dir)).await;
    match result {
        Ok(tracks) => {
            info!(
                "Catalog scan of {} found {} resident tracks",
                dir.display(),
                tracks.len()
            );
            tracks
        }
        Err(e) => {
            warn!("Catalog scan task failed: {}", e);
            Vec::new()
        }
    }
}

fn scan_blocking(dir: &Path) -> Vec<Track> {
    if !dir.is_dir() {
        warn!("Audio folder {} does not exist", dir.display());
        return Vec::new();
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable catalog entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));

    paths
        .into_iter()
        .map(|path| {
            let metadata = probe_track(&path);
            debug!(
                path = %path.display(),
                duration_ms = metadata.duration_ms,
                bitrate_bps = metadata.bitrate_bps,
                "Probed resident track"
            );
            Track::resident(path, metadata)
        })
        .collect()
}
