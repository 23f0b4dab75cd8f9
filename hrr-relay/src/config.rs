//! Configuration management for hrr-relay
//!
//! Two layers, merged once at startup:
//! 1. **Command line / environment**: `clap` flags in `main.rs`, each with an `HRR_*` env fallback
//! 2. **TOML file**: optional, every key has a built-in default
//!
//! Nothing here can change while the relay is running.

use crate::error::Result;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: u16,

    /// Bind address
    pub bind: IpAddr,

    /// Folder holding the resident playlist
    pub audio_dir: Option<PathBuf>,

    /// Folder where acquired tracks are downloaded
    pub cache_dir: Option<PathBuf>,

    pub stream: StreamSettings,
    pub acquire: AcquireSettings,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            audio_dir: None,
            cache_dir: None,
            stream: StreamSettings::default(),
            acquire: AcquireSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

/// Listener streaming parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Bytes per file read / body chunk
    pub chunk_size: usize,

    /// How far (ms of audio) a sink may run ahead of real time
    ///
    /// Clients buffer this much on join; pacing keeps the rest at the
    /// track's nominal byte rate.
    pub lead_ms: u64,

    /// Chunks buffered per sink before its pump waits on the client
    pub sink_buffer_chunks: usize,

    /// Joins never start closer than this to the end of the current track
    pub join_guard_ms: u64,

    /// Pause after every queued track failed to open in a row
    pub skip_backoff_ms: u64,

    /// Concurrent listener limit, 0 for unlimited
    pub max_listeners: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_size: 16 * 1024,
            lead_ms: 3000,
            sink_buffer_chunks: 8,
            join_guard_ms: 100,
            skip_backoff_ms: 5000,
            max_listeners: 100,
        }
    }
}

impl StreamSettings {
    /// Lead allowance as a Duration
    pub fn lead(&self) -> Duration {
        Duration::from_millis(self.lead_ms)
    }

    /// Backoff after a full failed cycle as a Duration
    pub fn skip_backoff(&self) -> Duration {
        Duration::from_millis(self.skip_backoff_ms)
    }
}

/// Track acquisition (search + download) parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquireSettings {
    /// Disable to reject every add request
    pub enabled: bool,

    /// yt-dlp command name or path
    pub yt_dlp: String,

    /// Download timeout in seconds
    pub timeout_secs: u64,

    /// Target audio bitrate passed to the postprocessor
    pub audio_quality: String,

    /// Delete the downloaded file once the track has been evicted
    pub delete_after_play: bool,
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            yt_dlp: "yt-dlp".to_string(),
            timeout_secs: 120,
            audio_quality: "192k".to_string(),
            delete_after_play: true,
        }
    }
}

impl AcquireSettings {
    /// Download timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or full filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive for `EnvFilter` when `RUST_LOG` is unset
    ///
    /// A bare level applies to the relay crates and request tracing; anything
    /// containing `=` or `,` is passed through untouched.
    pub fn filter_directive(&self) -> String {
        let level = self.level.trim();
        if level.contains('=') || level.contains(',') {
            level.to_string()
        } else {
            format!("hrr_relay={level},hrr_common={level},tower_http={level}")
        }
    }
}

/// Values taken from the command line (or their env fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
    pub audio_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub no_acquire: bool,
}

/// Fully resolved relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub audio_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub stream: StreamSettings,
    pub acquire: AcquireSettings,
    pub logging: LoggingConfig,
}

impl Config {
    /// Merge CLI overrides over an optional TOML file
    pub fn resolve(cli: CliOverrides, config_file: Option<&Path>) -> Result<Self> {
        let toml_config = match config_file {
            Some(path) => hrr_common::config::load_toml::<TomlConfig>(path)?,
            None => TomlConfig::default(),
        };
        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: CliOverrides, toml_config: TomlConfig) -> Self {
        let port = cli.port.unwrap_or(toml_config.port);
        let bind = cli.bind.unwrap_or(toml_config.bind);

        let audio_dir = hrr_common::config::resolve_folder(
            cli.audio_dir.as_deref(),
            "HRR_AUDIO_DIR",
            toml_config.audio_dir.as_deref(),
            Path::new("audio"),
        );
        let cache_dir = hrr_common::config::resolve_folder(
            cli.cache_dir.as_deref(),
            "HRR_CACHE_DIR",
            toml_config.cache_dir.as_deref(),
            Path::new("cache"),
        );

        let mut logging = toml_config.logging;
        if let Some(level) = cli.log_level {
            logging.level = level;
        }

        let mut acquire = toml_config.acquire;
        if cli.no_acquire {
            acquire.enabled = false;
        }

        Self {
            bind_addr: SocketAddr::new(bind, port),
            audio_dir,
            cache_dir,
            stream: toml_config.stream,
            acquire,
            logging,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliOverrides::default(), TomlConfig::default())
    }
}
