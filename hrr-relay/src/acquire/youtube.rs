//! YouTube search + yt-dlp acquisition
//!
//! Search scrapes the results page for the first video id; download shells
//! out to `yt-dlp`, extracting an mp3 into the cache folder. A cached file
//! with the same video id is reused without downloading again.

use super::{Acquirer, AcquisitionError, ResolvedSource};
use crate::catalog::{probe_track, Track};
use crate::config::AcquireSettings;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

const SEARCH_URL: &str = "https://www.youtube.com/results";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Length of a YouTube video id
const VIDEO_ID_LEN: usize = 11;

/// Source key prefix for YouTube items
pub const SOURCE_KEY_PREFIX: &str = "youtube:";

/// Acquirer backed by YouTube search and the yt-dlp download tool
pub struct YouTubeAcquirer {
    client: reqwest::Client,
    cache_dir: PathBuf,
    settings: AcquireSettings,
}

impl YouTubeAcquirer {
    pub fn new(cache_dir: impl Into<PathBuf>, settings: AcquireSettings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .unwrap_or_default();

        Self {
            client,
            cache_dir: cache_dir.into(),
            settings,
        }
    }

    /// Cache location for a video id
    pub fn cache_path(&self, video_id: &str) -> PathBuf {
        self.cache_dir.join(format!("youtube_{video_id}.mp3"))
    }

    /// Pick the download tool: a copy in the home folder wins over the configured command
    fn tool_path(&self) -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            let local = home.join("yt-dlp");
            if local.is_file() {
                return local;
            }
        }
        PathBuf::from(&self.settings.yt_dlp)
    }

    async fn search(&self, query: &str) -> Result<String, AcquisitionError> {
        debug!("Searching YouTube for \"{}\"", query);
        let html = self
            .client
            .get(SEARCH_URL)
            .query(&[("search_query", query)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        extract_first_video_id(&html).ok_or_else(|| AcquisitionError::NotFound(query.to_string()))
    }

    async fn download(&self, url: &str, output: &Path) -> Result<(), AcquisitionError> {
        let tool = self.tool_path();
        let postprocessor = format!("-b:a {} -ar 44100", self.settings.audio_quality);

        info!("Downloading {} with {}", url, tool.display());

        let child = Command::new(&tool)
            .arg("-x")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--audio-quality")
            .arg("0")
            .arg("--postprocessor-args")
            .arg(&postprocessor)
            .arg("-o")
            .arg(output)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    AcquisitionError::ToolMissing(tool.display().to_string())
                }
                _ => AcquisitionError::Io(e),
            })?;

        let output_result =
            tokio::time::timeout(self.settings.timeout(), child.wait_with_output())
                .await
                .map_err(|_| AcquisitionError::Timeout(self.settings.timeout_secs))??;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            let message = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no output")
                .to_string();
            return Err(AcquisitionError::ToolFailed(format!(
                "{} ({})",
                message, output_result.status
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Acquirer for YouTubeAcquirer {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn source_key_hint(&self, query: &str) -> Option<String> {
        video_id_from_url(query.trim()).map(|id| source_key_for(&id))
    }

    async fn resolve(&self, query: &str) -> Result<ResolvedSource, AcquisitionError> {
        let query = query.trim();
        let video_id = match video_id_from_url(query) {
            Some(id) => id,
            None => self.search(query).await?,
        };

        Ok(ResolvedSource {
            source_key: source_key_for(&video_id),
            url: format!("{WATCH_URL}{video_id}"),
            title: query.to_string(),
        })
    }

    async fn fetch(&self, source: &ResolvedSource) -> Result<Track, AcquisitionError> {
        let video_id = source
            .source_key
            .strip_prefix(SOURCE_KEY_PREFIX)
            .ok_or_else(|| AcquisitionError::NotFound(source.source_key.clone()))?;
        let path = self.cache_path(video_id);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!("Reusing cached download {}", path.display());
        } else {
            tokio::fs::create_dir_all(&self.cache_dir).await?;
            self.download(&source.url, &path).await?;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                warn!("yt-dlp finished but {} is missing", path.display());
                return Err(AcquisitionError::ToolFailed(format!(
                    "no output file at {}",
                    path.display()
                )));
            }
        }

        let probe_path = path.clone();
        let metadata = tokio::task::spawn_blocking(move || probe_track(&probe_path))
            .await
            .unwrap_or_default();

        Ok(Track::acquired(path, metadata, source.source_key.clone())
            .with_display_name(source.title.clone()))
    }
}

/// Dedup key for a video id
pub fn source_key_for(video_id: &str) -> String {
    format!("{SOURCE_KEY_PREFIX}{video_id}")
}

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// First `"videoId":"..."` on a search results page
pub fn extract_first_video_id(html: &str) -> Option<String> {
    const MARKER: &str = "\"videoId\":\"";
    html.match_indices(MARKER).find_map(|(start, _)| {
        let rest = &html[start + MARKER.len()..];
        let candidate = rest.get(..VIDEO_ID_LEN)?;
        let closed = rest[VIDEO_ID_LEN..].starts_with('"');
        (closed && is_video_id(candidate)).then(|| candidate.to_string())
    })
}

/// Video id from a watch or short link, if the query is one
pub fn video_id_from_url(query: &str) -> Option<String> {
    let candidate = if query.contains("youtube.com/") {
        let pos = query.find("v=")?;
        query.get(pos + 2..pos + 2 + VIDEO_ID_LEN)?
    } else if let Some(pos) = query.find("youtu.be/") {
        query.get(pos + 9..pos + 9 + VIDEO_ID_LEN)?
    } else {
        return None;
    };

    is_video_id(candidate).then(|| candidate.to_string())
}
