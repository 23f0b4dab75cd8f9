//! Test server wrapper for integration tests
//!
//! Builds a full hrr-relay router over a temporary audio folder, with a stub
//! acquirer in place of YouTube. Requests go through `tower::ServiceExt::oneshot`;
//! no socket is opened.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use hrr_common::{EventBus, RadioEvent};
use hrr_relay::acquire::{Acquirer, AcquisitionError, ResolvedSource};
use hrr_relay::api::{create_router, AppContext};
use hrr_relay::catalog::{Track, TrackMetadata};
use hrr_relay::config::StreamSettings;
use hrr_relay::playback::{scheduler, Broadcast};

/// Nominal bitrate of every fixture: 16 bytes per millisecond
pub const FIXTURE_BITRATE: u32 = 128_000;

/// Write a fixture file lasting `duration_ms` at the fixture bitrate
///
/// The first `head` bytes are `head_byte`, the rest `fill`, so a reader can
/// tell whether it got the start of the file.
pub fn write_fixture(dir: &Path, name: &str, duration_ms: u64, head_byte: u8, fill: u8) -> PathBuf {
    let size = (duration_ms * 16) as usize;
    let head = 4096.min(size);
    let mut bytes = vec![fill; size];
    bytes[..head].fill(head_byte);

    let path = dir.join(format!("{name}.mp3"));
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Resident track backed by a fixture file
pub fn resident_fixture(dir: &Path, name: &str, duration_ms: u64, head_byte: u8, fill: u8) -> Track {
    let path = write_fixture(dir, name, duration_ms, head_byte, fill);
    Track::resident(
        path,
        TrackMetadata {
            duration_ms,
            bitrate_bps: FIXTURE_BITRATE,
        },
    )
}

/// Acquirer that "downloads" by writing a fixture into its cache folder
pub struct StubAcquirer {
    cache_dir: PathBuf,
    duration_ms: u64,
}

impl StubAcquirer {
    pub fn new(cache_dir: impl Into<PathBuf>, duration_ms: u64) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            duration_ms,
        }
    }
}

#[async_trait]
impl Acquirer for StubAcquirer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn source_key_hint(&self, query: &str) -> Option<String> {
        query.strip_prefix("stub:").map(|_| query.to_string())
    }

    async fn resolve(&self, query: &str) -> Result<ResolvedSource, AcquisitionError> {
        if query.contains("missing") {
            return Err(AcquisitionError::NotFound(query.to_string()));
        }
        let key = query.to_lowercase().replace(' ', "-");
        Ok(ResolvedSource {
            source_key: format!("stub:{key}"),
            url: format!("stub://{key}"),
            title: query.to_string(),
        })
    }

    async fn fetch(&self, source: &ResolvedSource) -> Result<Track, AcquisitionError> {
        let name = source.source_key.replace(':', "_");
        let path = write_fixture(&self.cache_dir, &name, self.duration_ms, 0xA0, 0xA1);
        Ok(Track::acquired(
            path,
            TrackMetadata {
                duration_ms: self.duration_ms,
                bitrate_bps: FIXTURE_BITRATE,
            },
            source.source_key.clone(),
        )
        .with_display_name(source.title.clone()))
    }
}

/// Test server instance with router, broadcast and running scheduler
pub struct TestServer {
    router: Router,
    pub broadcast: Arc<Broadcast>,
    scheduler: Option<JoinHandle<()>>,
    pub dir: TempDir,
}

impl TestServer {
    /// Start with the given `(name, duration_ms)` resident tracks
    pub async fn start(tracks: &[(&str, u64)]) -> Self {
        Self::start_with(tracks, StreamSettings::default()).await
    }

    pub async fn start_with(tracks: &[(&str, u64)], settings: StreamSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let audio_dir = dir.path().join("audio");
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir_all(&audio_dir).unwrap();
        std::fs::create_dir_all(&cache_dir).unwrap();

        let resident = tracks
            .iter()
            .enumerate()
            .map(|(i, (name, duration_ms))| {
                resident_fixture(&audio_dir, name, *duration_ms, 0x10 + i as u8, 0x20 + i as u8)
            })
            .collect();

        let broadcast = Arc::new(
            Broadcast::new(settings, EventBus::new(256), CancellationToken::new())
                .with_delete_after_play(true),
        );
        broadcast.load_catalog(resident).await;

        let acquirer = Arc::new(StubAcquirer::new(&cache_dir, 1_000));
        let router = create_router(AppContext::new(Arc::clone(&broadcast), acquirer));
        let scheduler = Some(scheduler::spawn(Arc::clone(&broadcast)));

        Self {
            router,
            broadcast,
            scheduler,
            dir,
        }
    }

    /// Subscribe to broadcast events
    pub fn events(&self) -> broadcast::Receiver<RadioEvent> {
        self.broadcast.events().subscribe()
    }

    /// Wait for the scheduler to publish its first track
    pub async fn wait_until_playing(&self) {
        let mut rx = self.broadcast.subscribe();
        loop {
            if rx.borrow_and_update().now_playing().is_some() {
                return;
            }
            rx.changed().await.unwrap();
        }
    }

    /// Send a request and return the raw response
    pub async fn send(&self, request: Request<Body>) -> http::Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a JSON (or empty) request and parse the JSON answer, if any
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Option<Value>) {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = self.send(builder.body(body).unwrap()).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).ok();
        (status, json)
    }

    /// Stop the scheduler and every listener stream
    pub async fn shutdown(mut self) {
        self.broadcast.shutdown();
        if let Some(handle) = self.scheduler.take() {
            handle.await.unwrap();
        }
    }
}
