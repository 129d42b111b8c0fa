use std::{fmt, time::Duration};

/// Proveedor del que se resolvió un track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    YouTube,
    SoundCloud,
    Mixlr,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::YouTube => "YouTube",
            Provider::SoundCloud => "SoundCloud",
            Provider::Mixlr => "Mixlr",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a playable item.
///
/// Produced by a [`TrackResolver`](crate::sources::TrackResolver) and never mutated
/// afterwards; the queue, the history buffer and the player only move clones of it around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    url: String,
    title: String,
    duration_secs: u64,
    provider: Provider,
    live: bool,
}

impl Track {
    pub fn new(url: impl Into<String>, title: impl Into<String>, provider: Provider) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            duration_secs: 0,
            provider,
            live: false,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_secs = duration.as_secs();
        self
    }

    pub fn live(mut self) -> Self {
        self.live = true;
        self.duration_secs = 0;
        self
    }

    // Getters
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
    pub fn provider(&self) -> Provider {
        self.provider
    }
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Etiqueta corta para mensajes: `[HH:MM:SS]` o el indicador de directo.
    pub fn length_label(&self) -> String {
        if self.live {
            "LIVE 🔴".to_string()
        } else {
            format_duration(self.duration())
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `[{}]`", self.title, self.length_label())
    }
}

/// Formats a duration as `HH:MM:SS`, the format used in every queue listing.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
