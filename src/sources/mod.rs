//! Track resolution and stream opening.
//!
//! [`SourceManager`] is the production implementation of both seams: it routes a user query to
//! the provider that understands it and, at play time, turns a [`Track`] into a songbird
//! [`Input`].

pub mod mixlr;
pub mod ytdlp;

use async_trait::async_trait;
use songbird::input::{Input, YoutubeDl};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::audio::track::{Provider, Track};

pub use mixlr::MixlrClient;
pub use ytdlp::YtDlpClient;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("No se encontraron resultados")]
    NotFound,

    #[error("Fuente no soportada: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Turns user input into tracks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves a URL (video, playlist, live stream) or a free-text query.
    async fn resolve(&self, input: &str) -> Result<Vec<Track>, SourceError>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SourceError>;
}

/// Opens the audio stream of a resolved track.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn open_stream(&self, track: &Track) -> Result<Input, SourceError>;
}

/// Detecta el proveedor de una URL. `None` para texto libre o dominios desconocidos.
pub fn detect_provider(input: &str) -> Option<Provider> {
    let url = Url::parse(input).ok()?;
    let host = url.host_str()?.trim_start_matches("www.");

    match host {
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtu.be" => {
            Some(Provider::YouTube)
        }
        "soundcloud.com" | "m.soundcloud.com" | "on.soundcloud.com" => Some(Provider::SoundCloud),
        "mixlr.com" | "api.mixlr.com" => Some(Provider::Mixlr),
        _ => None,
    }
}

pub struct SourceManager {
    ytdlp: YtDlpClient,
    mixlr: MixlrClient,
    http: reqwest::Client,
}

impl SourceManager {
    pub fn new(ytdlp_path: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            ytdlp: YtDlpClient::new(ytdlp_path),
            mixlr: MixlrClient::new(http.clone()),
            http,
        })
    }
}

#[async_trait]
impl TrackResolver for SourceManager {
    async fn resolve(&self, input: &str) -> Result<Vec<Track>, SourceError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SourceError::NotFound);
        }

        let tracks = match detect_provider(input) {
            Some(Provider::Mixlr) => self.mixlr.resolve(input).await?,
            Some(provider) => self.ytdlp.resolve(input, provider).await?,
            None if Url::parse(input).is_ok() => {
                return Err(SourceError::Unsupported(input.to_string()))
            }
            None => {
                debug!("🔍 Texto libre, buscando en YouTube: {}", input);
                self.ytdlp.search(input, 1).await?
            }
        };

        if tracks.is_empty() {
            return Err(SourceError::NotFound);
        }
        info!("✅ {} tracks resueltos para '{}'", tracks.len(), input);
        Ok(tracks)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SourceError> {
        let results = self.ytdlp.search(query, limit).await?;
        if results.is_empty() {
            return Err(SourceError::NotFound);
        }
        Ok(results)
    }
}

#[async_trait]
impl AudioSource for SourceManager {
    async fn open_stream(&self, track: &Track) -> Result<Input, SourceError> {
        match track.provider() {
            Provider::Mixlr => self.mixlr.open_stream(track.url()).await,
            // yt-dlp extrae la URL del stream cuando el driver crea el input
            Provider::YouTube | Provider::SoundCloud => Ok(Input::from(YoutubeDl::new(
                self.http.clone(),
                track.url().to_string(),
            ))),
        }
    }
}
