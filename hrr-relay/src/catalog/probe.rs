//! Best-effort track metadata probing
//!
//! Uses symphonia to read the container's frame count. Nothing is decoded.
//! Fallback chain, in order:
//! 1. Duration from the container, bitrate from `size * 8 / duration`
//! 2. No duration: bitrate defaults to 128 kbps, duration from `size * 8 / bitrate`
//! 3. No file size either: 180 s at 128 kbps

use super::{DEFAULT_BITRATE_BPS, DEFAULT_DURATION_MS};
use std::path::Path;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Scheduling metadata for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackMetadata {
    pub duration_ms: u64,
    pub bitrate_bps: u32,
}

impl Default for TrackMetadata {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_DURATION_MS,
            bitrate_bps: DEFAULT_BITRATE_BPS,
        }
    }
}

/// Probe a file, never failing
///
/// Blocking; call from `spawn_blocking` in async contexts.
pub fn probe_track(path: &Path) -> TrackMetadata {
    let file_size = match std::fs::metadata(path) {
        Ok(meta) => Some(meta.len()),
        Err(e) => {
            warn!("Cannot stat {}: {}", path.display(), e);
            None
        }
    };

    let probed = match probe_duration_ms(path) {
        Ok(duration) => duration,
        Err(e) => {
            debug!("Metadata probe failed for {}: {}", path.display(), e);
            None
        }
    };

    if probed.is_none() {
        warn!(
            "No duration for {}, estimating from file size",
            path.display()
        );
    }

    derive_metadata(file_size, probed)
}

/// Apply the fallback chain to whatever was learned about a file
pub fn derive_metadata(file_size: Option<u64>, probed_duration_ms: Option<u64>) -> TrackMetadata {
    match (file_size, probed_duration_ms) {
        (Some(size), Some(duration_ms)) if duration_ms > 0 => {
            let bitrate = (size as u128 * 8 * 1000 / duration_ms as u128)
                .clamp(1, u32::MAX as u128) as u32;
            TrackMetadata {
                duration_ms,
                bitrate_bps: bitrate,
            }
        }
        (None, Some(duration_ms)) if duration_ms > 0 => TrackMetadata {
            duration_ms,
            bitrate_bps: DEFAULT_BITRATE_BPS,
        },
        (Some(size), _) => TrackMetadata {
            duration_ms: duration_from_size(size, DEFAULT_BITRATE_BPS),
            bitrate_bps: DEFAULT_BITRATE_BPS,
        },
        (None, _) => TrackMetadata::default(),
    }
}

/// Playing time of `size` bytes at `bitrate_bps`
pub fn duration_from_size(size: u64, bitrate_bps: u32) -> u64 {
    let bitrate = bitrate_bps.max(1) as u128;
    (size as u128 * 8 * 1000 / bitrate) as u64
}

fn probe_duration_ms(path: &Path) -> Result<Option<u64>, symphonia::core::errors::Error> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let duration = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .and_then(|track| {
            let frames = track.codec_params.n_frames?;
            let rate = track.codec_params.sample_rate?;
            if rate == 0 {
                return None;
            }
            Some(frames * 1000 / rate as u64)
        });

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, seconds: u32, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(seconds * sample_rate) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_derive_with_probed_duration() {
        // 10 s, 160000 bytes -> 128 kbps
        let meta = derive_metadata(Some(160_000), Some(10_000));
        assert_eq!(meta.duration_ms, 10_000);
        assert_eq!(meta.bitrate_bps, 128_000);
    }

    #[test]
    fn test_derive_without_duration_uses_size() {
        let meta = derive_metadata(Some(32_000), None);
        assert_eq!(meta.bitrate_bps, DEFAULT_BITRATE_BPS);
        assert_eq!(meta.duration_ms, 2000);
    }

    #[test]
    fn test_derive_zero_duration_treated_as_unknown() {
        let meta = derive_metadata(Some(16_000), Some(0));
        assert_eq!(meta.duration_ms, 1000);
    }

    #[test]
    fn test_derive_nothing_known() {
        assert_eq!(derive_metadata(None, None), TrackMetadata::default());
        assert_eq!(TrackMetadata::default().duration_ms, 180_000);
        assert_eq!(TrackMetadata::default().bitrate_bps, 128_000);
    }

    #[test]
    fn test_probe_missing_file_uses_defaults() {
        let meta = probe_track(Path::new("/no/such/track.mp3"));
        assert_eq!(meta, TrackMetadata::default());
    }

    #[test]
    fn test_probe_wav_reads_container_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 2, 8000);

        let meta = probe_track(&path);
        assert_eq!(meta.duration_ms, 2000);
        // 16-bit mono at 8 kHz is 128 kbps of payload plus a small header
        assert!(meta.bitrate_bps >= 128_000 && meta.bitrate_bps < 130_000);
    }
}
