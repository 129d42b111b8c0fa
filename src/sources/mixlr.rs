use regex::Regex;
use serde_json::Value;
use songbird::input::{HttpRequest, Input};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::SourceError;
use crate::audio::track::{Provider, Track};

const FETCH_ATTEMPTS: u32 = 5;
const FETCH_BACKOFF: Duration = Duration::from_millis(100);

/// Mixlr live streams. A user page resolves to the embed API endpoint, which is polled for the
/// progressive stream URL when the track is about to play.
pub struct MixlrClient {
    http: reqwest::Client,
}

impl MixlrClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn resolve(&self, url: &str) -> Result<Vec<Track>, SourceError> {
        let parsed = Url::parse(url).map_err(|_| SourceError::Unsupported(url.to_string()))?;

        let api_url = if parsed.host_str() == Some("api.mixlr.com") {
            url.to_string()
        } else {
            let user = parsed
                .path_segments()
                .and_then(|mut segments| segments.find(|s| !s.is_empty()))
                .ok_or_else(|| SourceError::Unsupported(url.to_string()))?;

            let page = self
                .fetch_text(&format!("https://mixlr.com/{user}/"))
                .await
                .ok_or_else(|| SourceError::Unavailable("No se encontró el stream".to_string()))?;

            let user_id = extract_user_id(&page).ok_or(SourceError::NotFound)?;
            format!("https://api.mixlr.com/users/{user_id}?source=embed")
        };

        debug!("📻 Mixlr resuelto a {}", api_url);
        Ok(vec![Track::new(api_url, "Mixlr Stream", Provider::Mixlr).live()])
    }

    pub async fn open_stream(&self, api_url: &str) -> Result<Input, SourceError> {
        let body = self
            .fetch_text(api_url)
            .await
            .ok_or_else(|| SourceError::Unavailable("No se encontró el stream".to_string()))?;

        let metadata: Value = serde_json::from_str(&body)
            .map_err(|e| SourceError::Unavailable(format!("Respuesta de Mixlr inválida: {e}")))?;

        let stream_url = live_stream_url(&metadata).ok_or_else(|| {
            SourceError::Unavailable("El stream no está en vivo".to_string())
        })?;

        Ok(Input::from(HttpRequest::new(self.http.clone(), stream_url)))
    }

    /// GET with up to [`FETCH_ATTEMPTS`] tries, backing off `100ms * attempt`.
    async fn fetch_text(&self, url: &str) -> Option<String> {
        for attempt in 0..FETCH_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(FETCH_BACKOFF * attempt).await;
            }

            let response = self
                .http
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match response {
                Ok(response) => match response.text().await {
                    Ok(text) => return Some(text),
                    Err(e) => warn!("Mixlr intento {}: {}", attempt + 1, e),
                },
                Err(e) => warn!("Mixlr intento {}: {}", attempt + 1, e),
            }
        }
        None
    }
}

/// Numeric user id embedded in a Mixlr user page.
fn extract_user_id(page: &str) -> Option<String> {
    let re = Regex::new(r#"\{"id":(\d+),"#).ok()?;
    re.captures(page).map(|c| c[1].to_string())
}

fn live_stream_url(metadata: &Value) -> Option<String> {
    let live = metadata["is_live"].as_bool().unwrap_or(false)
        || metadata["data"]["attributes"]["live"]
            .as_bool()
            .unwrap_or(false);
    if !live {
        return None;
    }

    metadata["current_broadcast"]["streams"]["progressive"]["url"]
        .as_str()
        .or_else(|| metadata["included"][0]["attributes"]["progressive_stream_url"].as_str())
        .map(str::to_string)
}
