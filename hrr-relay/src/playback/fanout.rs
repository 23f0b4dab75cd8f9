//! Listener fan-out
//!
//! Each attached listener gets its own pump task feeding a bounded channel
//! that backs the HTTP response body. Pumps never decide track changes on
//! their own; they follow the broadcast's `watch` signal:
//! - join: current track from the estimated live offset
//! - every later track change: new track from byte 0, old file handle closed
//! - idle or end of file: send nothing, keep the connection open
//!
//! A full channel only stalls that listener's pump. A dropped body (client
//! gone) ends the pump and deregisters the sink.

use super::broadcast::{Broadcast, BroadcastSignal};
use super::estimator;
use crate::catalog::Track;
use crate::error::{Error, Result};
use bytes::Bytes;
use hrr_common::RadioEvent;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Body chunks as delivered to the HTTP layer
pub type ChunkResult = std::io::Result<Bytes>;

/// Attached listener counts
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    active: AtomicUsize,
    total: AtomicU64,
}

impl ListenerRegistry {
    /// Listeners currently attached
    pub fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Listeners attached since startup
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Count one more listener unless `limit` is reached (0 = unlimited)
    ///
    /// Returns the new active count.
    fn try_join(&self, limit: usize) -> Option<usize> {
        let previous = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (limit == 0 || n < limit).then_some(n + 1)
            })
            .ok()?;
        self.total.fetch_add(1, Ordering::SeqCst);
        Some(previous + 1)
    }

    fn leave(&self) -> usize {
        self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
    }
}

/// Deregisters a sink when its pump ends, however it ends
struct SinkRegistration {
    sink_id: Uuid,
    broadcast: Arc<Broadcast>,
}

impl Drop for SinkRegistration {
    fn drop(&mut self) {
        let listeners = self.broadcast.listeners().leave();
        info!(sink_id = %self.sink_id, listeners, "Listener left");
        self.broadcast.events().emit(RadioEvent::ListenerLeft {
            sink_id: self.sink_id,
            listeners,
            timestamp: hrr_common::time::now(),
        });
    }
}

/// Body side of an attached listener
pub struct ListenerStream {
    pub sink_id: Uuid,
    /// Track the listener joined into
    pub track: Arc<Track>,
    /// Estimated byte offset the listener started at
    pub offset_bytes: u64,
    receiver: mpsc::Receiver<ChunkResult>,
}

impl ListenerStream {
    /// Next chunk; `None` once the pump has finished
    pub async fn recv(&mut self) -> Option<ChunkResult> {
        self.receiver.recv().await
    }

    /// Adapter for `axum::body::Body::from_stream`
    pub fn into_stream(self) -> ReceiverStream<ChunkResult> {
        ReceiverStream::new(self.receiver)
    }
}

/// Open file position for one sink, paced at the track's nominal byte rate
struct TrackReader {
    file: File,
    bitrate_bps: u32,
    chunk_size: usize,
    /// Bytes read since this reader was opened
    read: u64,
    opened_at: Instant,
    lead: Duration,
}

/// A chunk and the earliest instant it may go out
struct PacedChunk {
    bytes: Bytes,
    not_before: Instant,
}

impl TrackReader {
    /// Open `track` at byte `offset`; returns the reader and the file size
    async fn open(
        track: &Track,
        offset: u64,
        chunk_size: usize,
        lead: Duration,
    ) -> Result<Self> {
        let file = async {
            let mut file = File::open(&track.path).await?;
            if offset > 0 {
                file.seek(SeekFrom::Start(offset)).await?;
            }
            Ok::<_, std::io::Error>(file)
        }
        .await
        .map_err(|source| Error::track_read(&track.path, source))?;
        Ok(Self {
            file,
            bitrate_bps: track.bitrate_bps,
            chunk_size: chunk_size.max(1),
            read: 0,
            opened_at: Instant::now(),
            lead,
        })
    }

    /// Open `track` at the offset matching `elapsed_ms` of play time
    async fn open_for_join(
        track: &Track,
        elapsed_ms: u64,
        guard_ms: u64,
        chunk_size: usize,
        lead: Duration,
    ) -> Result<(Self, u64)> {
        let size = tokio::fs::metadata(&track.path)
            .await
            .map_err(|source| Error::track_read(&track.path, source))?
            .len();
        let offset = estimator::join_offset(track, elapsed_ms, Some(size), guard_ms);
        let reader = Self::open(track, offset, chunk_size, lead).await?;
        Ok((reader, offset))
    }

    /// Read the next chunk, `None` at end of file
    async fn next_chunk(&mut self) -> std::io::Result<Option<PacedChunk>> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);

        let audio_ms = estimator::ms_for_bytes(self.bitrate_bps, self.read);
        let due = self.opened_at + Duration::from_millis(audio_ms);
        let not_before = due.checked_sub(self.lead).unwrap_or(self.opened_at);

        self.read += n as u64;
        Ok(Some(PacedChunk {
            bytes: Bytes::from(buf),
            not_before,
        }))
    }
}

/// Attach a listener to the broadcast
///
/// Fails with `Error::Idle` while idle or shutting down, and with
/// `Error::ListenerLimit` when `max_listeners` sinks are already attached.
/// Otherwise spawns the sink's pump and returns the body side.
pub async fn attach(broadcast: &Arc<Broadcast>) -> Result<ListenerStream> {
    if broadcast.shutdown_token().is_cancelled() {
        return Err(Error::Idle);
    }

    // Subscribing marks the current value seen: the pump's first `changed()`
    // is the next track boundary.
    let mut signal_rx = broadcast.subscribe();
    let now_playing = match &*signal_rx.borrow_and_update() {
        BroadcastSignal::Playing(np) => np.clone(),
        BroadcastSignal::Idle => return Err(Error::Idle),
    };

    let settings = broadcast.settings();
    let listeners = broadcast
        .listeners()
        .try_join(settings.max_listeners)
        .ok_or(Error::ListenerLimit(settings.max_listeners))?;
    let sink_id = Uuid::new_v4();
    let registration = SinkRegistration {
        sink_id,
        broadcast: Arc::clone(broadcast),
    };

    let elapsed_ms = Instant::now()
        .saturating_duration_since(now_playing.started_at)
        .as_millis() as u64;

    let (reader, offset_bytes) = match TrackReader::open_for_join(
        &now_playing.track,
        elapsed_ms,
        settings.join_guard_ms,
        settings.chunk_size,
        settings.lead(),
    )
    .await
    {
        Ok((reader, offset)) => (Some(reader), offset),
        Err(e) => {
            // The listener still attaches and picks up the next track
            warn!(sink_id = %sink_id, "Joining listener waits for the next track: {}", e);
            (None, 0)
        }
    };

    let (tx, rx) = mpsc::channel(settings.sink_buffer_chunks.max(1));

    info!(
        sink_id = %sink_id,
        listeners,
        "Listener joined \"{}\" at {} ({} bytes in)",
        now_playing.track.display_name,
        hrr_common::time::format_ms(elapsed_ms),
        offset_bytes
    );
    broadcast.events().emit(RadioEvent::ListenerJoined {
        sink_id,
        listeners,
        offset_bytes,
        timestamp: hrr_common::time::now(),
    });

    tokio::spawn(pump(
        Arc::clone(broadcast),
        signal_rx,
        tx,
        reader,
        registration,
    ));

    Ok(ListenerStream {
        sink_id,
        track: now_playing.track,
        offset_bytes,
        receiver: rx,
    })
}

/// Per-sink loop: read, pace, send; switch on every track change
async fn pump(
    broadcast: Arc<Broadcast>,
    mut signal_rx: watch::Receiver<BroadcastSignal>,
    tx: mpsc::Sender<ChunkResult>,
    mut reader: Option<TrackReader>,
    registration: SinkRegistration,
) {
    let shutdown = broadcast.shutdown_token().clone();
    let sink_id = registration.sink_id;

    loop {
        let next = match reader.as_mut() {
            Some(r) => r.next_chunk().await,
            None => Ok(None),
        };
        let chunk = match next {
            Ok(Some(chunk)) => Some(chunk),
            Ok(None) => {
                // End of data; close the file and wait for the next boundary
                reader = None;
                None
            }
            Err(e) => {
                warn!(sink_id = %sink_id, "Read error, waiting for next track: {}", e);
                reader = None;
                None
            }
        };

        match chunk {
            Some(chunk) => {
                let len = chunk.bytes.len();
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tx.closed() => break,
                    changed = signal_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        reader = switch_track(&broadcast, &mut signal_rx, sink_id).await;
                    }
                    permit = paced_reserve(&tx, chunk.not_before) => match permit {
                        Ok(permit) => {
                            permit.send(Ok(chunk.bytes));
                            trace!(sink_id = %sink_id, bytes = len, "Chunk sent");
                        }
                        Err(_) => break,
                    },
                }
            }
            None => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tx.closed() => break,
                    changed = signal_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        reader = switch_track(&broadcast, &mut signal_rx, sink_id).await;
                    }
                }
            }
        }
    }

    debug!(sink_id = %sink_id, "Sink pump finished");
    drop(registration);
}

async fn paced_reserve(
    tx: &mpsc::Sender<ChunkResult>,
    not_before: Instant,
) -> std::result::Result<mpsc::Permit<'_, ChunkResult>, mpsc::error::SendError<()>> {
    tokio::time::sleep_until(not_before).await;
    tx.reserve().await
}

/// Reader for the newly published track, from byte 0
async fn switch_track(
    broadcast: &Broadcast,
    signal_rx: &mut watch::Receiver<BroadcastSignal>,
    sink_id: Uuid,
) -> Option<TrackReader> {
    let signal = signal_rx.borrow_and_update().clone();
    let now_playing = signal.now_playing()?;
    let settings = broadcast.settings();

    match TrackReader::open(&now_playing.track, 0, settings.chunk_size, settings.lead()).await {
        Ok(reader) => {
            debug!(
                sink_id = %sink_id,
                generation = now_playing.generation,
                "Sink switched to \"{}\"",
                now_playing.track.display_name
            );
            Some(reader)
        }
        Err(e) => {
            warn!(sink_id = %sink_id, "Sink waits for the next track: {}", e);
            None
        }
    }
}
