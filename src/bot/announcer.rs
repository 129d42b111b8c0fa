use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    audio::notice::{Announcer, Notice},
    ui::embeds,
};

/// Publica los avisos del reproductor como embeds en el canal de texto del guild.
pub struct DiscordAnnouncer {
    http: Arc<Http>,
}

impl DiscordAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Announcer for DiscordAnnouncer {
    async fn announce(&self, channel: ChannelId, notice: &Notice) -> anyhow::Result<Option<MessageId>> {
        let message = channel
            .send_message(&*self.http, CreateMessage::new().embed(embeds::notice_embed(notice)))
            .await?;
        Ok(Some(message.id))
    }

    async fn retract(&self, channel: ChannelId, message: MessageId) -> anyhow::Result<()> {
        channel.delete_message(&*self.http, message).await?;
        debug!("🧹 Mensaje {} eliminado de {}", message, channel);
        Ok(())
    }
}
