use async_trait::async_trait;
use serenity::model::id::{ChannelId, MessageId};

use crate::audio::track::Track;

/// Mensajes asíncronos que el reproductor publica por su cuenta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NowPlaying(Track),
    TrackUnavailable { track: Track, reason: String },
    ChannelAbandoned,
}

/// Publishes player notices to a text channel.
///
/// `announce` returns the id of the posted message when the transport has one, so the player
/// can retract its "now playing" line once the track is over.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, channel: ChannelId, notice: &Notice) -> anyhow::Result<Option<MessageId>>;

    async fn retract(&self, channel: ChannelId, message: MessageId) -> anyhow::Result<()>;
}
