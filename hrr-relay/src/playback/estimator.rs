//! Byte position estimator
//!
//! Maps elapsed play time to a byte offset with constant-bitrate arithmetic.
//! No frame parsing: a joining listener may hear a short glitch at the seek
//! point. Only joins use this; attached listeners always restart at byte 0.

use crate::catalog::Track;

/// Expected encoded size of a track at its nominal bitrate
pub fn nominal_size(track: &Track) -> u64 {
    bytes_for_ms(track.bitrate_bps, track.effective_duration_ms()).max(1)
}

/// Bytes covered by `ms` of audio at `bitrate_bps`
pub fn bytes_for_ms(bitrate_bps: u32, ms: u64) -> u64 {
    (ms as u128 * bitrate_bps as u128 / 8000).min(u64::MAX as u128) as u64
}

/// Milliseconds of audio in `bytes` at `bitrate_bps`
pub fn ms_for_bytes(bitrate_bps: u32, bytes: u64) -> u64 {
    (bytes as u128 * 8000 / bitrate_bps.max(1) as u128).min(u64::MAX as u128) as u64
}

/// Byte offset for `elapsed_ms` into `track`
///
/// Result lies in `[0, size)`, where size is `file_size` when known and the
/// nominal size otherwise. An empty file always yields 0.
pub fn estimate_byte_offset(track: &Track, elapsed_ms: u64, file_size: Option<u64>) -> u64 {
    let size = file_size.unwrap_or_else(|| nominal_size(track));
    if size == 0 {
        return 0;
    }
    bytes_for_ms(track.bitrate_bps, elapsed_ms).min(size - 1)
}

/// Clamp a join's elapsed time to `[0, duration - guard]`
///
/// Keeps a joiner from starting in the last `guard_ms` of a track, where the
/// estimate would point at or past the end of the data.
pub fn clamp_join_elapsed(track: &Track, elapsed_ms: u64, guard_ms: u64) -> u64 {
    let limit = track.effective_duration_ms().saturating_sub(guard_ms);
    elapsed_ms.min(limit)
}

/// Offset for a listener joining `elapsed_ms` into the current track
pub fn join_offset(track: &Track, elapsed_ms: u64, file_size: Option<u64>, guard_ms: u64) -> u64 {
    estimate_byte_offset(track, clamp_join_elapsed(track, elapsed_ms, guard_ms), file_size)
}
