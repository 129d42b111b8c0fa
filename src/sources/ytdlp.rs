use async_process::Command;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::SourceError;
use crate::audio::track::{Provider, Track};

/// Metadata lookups through the `yt-dlp` binary (YouTube and SoundCloud).
pub struct YtDlpClient {
    program: String,
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
    is_live: Option<bool>,
}

impl YtDlpClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            // Limitar requests concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Resolves a video, track or playlist URL.
    pub async fn resolve(&self, url: &str, provider: Provider) -> Result<Vec<Track>, SourceError> {
        let stdout = if is_playlist(url) {
            info!("📋 Obteniendo playlist: {}", url);
            self.run(&["--flat-playlist", "--dump-json", "--no-warnings", url])
                .await?
        } else {
            debug!("📊 Obteniendo info de: {}", url);
            self.run(&["--no-playlist", "--dump-json", "--no-warnings", url])
                .await?
        };

        Ok(parse_tracks(&stdout, provider))
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SourceError> {
        info!("🔍 Buscando en YouTube: {}", query);
        let search_query = format!("ytsearch{}:{}", limit.max(1), query);

        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_tracks(&stdout, Provider::YouTube))
    }

    async fn run(&self, args: &[&str]) -> Result<String, SourceError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| SourceError::Unavailable(format!("Error al ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp error: {}", stderr.trim());
            return Err(SourceError::Unavailable(error_summary(&stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn is_playlist(url: &str) -> bool {
    url.contains("list=") || url.contains("/sets/") || url.contains("/playlist")
}

/// Una línea JSON por entrada; las líneas que no parsean se ignoran.
fn parse_tracks(stdout: &str, provider: Provider) -> Vec<Track> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .filter_map(|info| info_to_track(info, provider))
        .collect()
}

fn info_to_track(info: YtDlpInfo, provider: Provider) -> Option<Track> {
    let url = match (info.webpage_url, info.url, info.id) {
        (Some(page), _, _) => page,
        (None, Some(url), _) if url.starts_with("http") => url,
        (None, _, Some(id)) if provider == Provider::YouTube => {
            format!("https://www.youtube.com/watch?v={id}")
        }
        _ => return None,
    };
    let title = info.title.unwrap_or_else(|| url.clone());

    let track = Track::new(url, title, provider);
    if info.is_live.unwrap_or(false) {
        return Some(track.live());
    }
    Some(match info.duration {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            track.with_duration(Duration::from_secs_f64(secs))
        }
        _ => track,
    })
}

/// First `ERROR:` line of yt-dlp's stderr, without the extractor prefix.
fn error_summary(stderr: &str) -> String {
    stderr
        .lines()
        .find_map(|line| line.trim().strip_prefix("ERROR:"))
        .map(|line| {
            let line = line.trim();
            // "[youtube] abc123: Video unavailable" -> "Video unavailable"
            match line.split_once("]") {
                Some((_, rest)) => rest
                    .split_once(": ")
                    .map_or(rest.trim(), |(_, msg)| msg.trim())
                    .to_string(),
                None => line.to_string(),
            }
        })
        .unwrap_or_else(|| "yt-dlp no pudo obtener la información".to_string())
}
