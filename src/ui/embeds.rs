use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{notice::Notice, track::Track};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// Crea un embed para mostrar la canción actual
pub fn now_playing_embed(track: &Track) -> CreateEmbed {
    let duration = if track.is_live() {
        "🔴 En vivo".to_string()
    } else {
        track.length_label()
    };

    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Duración", duration, true)
        .field("🔗 Fuente", track.provider().as_str(), true)
        .url(track.url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn notice_embed(notice: &Notice) -> CreateEmbed {
    match notice {
        Notice::NowPlaying(track) => now_playing_embed(track),
        Notice::TrackUnavailable { track, reason } => error_embed(
            "No se pudo reproducir",
            &format!("**{}**\n{}", track.title(), reason),
        ),
        Notice::ChannelAbandoned => CreateEmbed::default()
            .title("⏸️ Reproducción pausada")
            .description("Todos salieron del canal de voz. Me iré en un minuto si nadie vuelve.")
            .color(colors::WARNING_ORANGE)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
    }
}

/// Crea un embed de error
pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
