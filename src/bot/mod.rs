//! # Bot Module
//!
//! Discord glue: turns gateway events into registry calls.
//!
//! - `message` parses prefix commands and runs them through [`handlers::CommandHandler`]
//! - `voice_state_update` feeds membership changes to the guild's player
//! - [`announcer::DiscordAnnouncer`] posts the player's notices back to Discord

use serenity::{
    all::{ActivityData, Context, EventHandler, Message, ReactionType, Ready, VoiceState},
    async_trait,
    builder::CreateMessage,
    model::id::GuildId,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;

use crate::{
    audio::{
        registry::{GuildContext, PlayerRegistry},
        router::{VoiceMember, VoiceStateChange},
    },
    bot::{
        commands::Command,
        handlers::{CommandError, CommandHandler},
    },
    config::Config,
    sources::TrackResolver,
    ui::embeds,
};

/// Event handler registered with the serenity client.
pub struct JukeboxBot {
    config: Arc<Config>,
    registry: Arc<PlayerRegistry>,
    commands: CommandHandler,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<PlayerRegistry>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        let commands = CommandHandler::new(registry.clone(), resolver, config.search_results);
        Self {
            config,
            registry,
            commands,
        }
    }

    async fn run_command(&self, ctx: &Context, msg: &Message, guild_id: GuildId, command: Command) {
        let Some(guild) = guild_context(ctx, guild_id, msg) else {
            warn!("⚠️ Guild {} no está en caché", guild_id);
            return;
        };

        let name = command.name();
        let listing_title = match command {
            Command::Queue(_) => Some("📋 Cola"),
            Command::Search(_) => Some("🔍 Búsqueda"),
            _ => None,
        };
        debug!("📨 Comando '{}' de {} en guild {}", name, msg.author.name, guild_id);

        match self.commands.execute(&guild, command).await {
            Ok(reply) => {
                react(ctx, msg, '👍').await;
                if let Some(text) = reply {
                    let sent = match listing_title {
                        Some(title) => msg
                            .channel_id
                            .send_message(
                                &ctx.http,
                                CreateMessage::new().embed(embeds::info_embed(title, &text)),
                            )
                            .await
                            .map(|_| ()),
                        None => msg.channel_id.say(&ctx.http, text).await.map(|_| ()),
                    };
                    if let Err(e) = sent {
                        error!("Error al responder a '{}': {:?}", name, e);
                    }
                }
            }
            Err(e) => {
                react(ctx, msg, '🛑').await;
                report(ctx, msg, name, &e).await;
            }
        }
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        ctx.set_activity(Some(ActivityData::listening(format!(
            "{}play",
            self.config.command_prefix
        ))));
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = commands::parse(&msg.content, &self.config.command_prefix) else {
            return;
        };

        self.run_command(&ctx, &msg, guild_id, command).await;
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let change = VoiceStateChange {
            member: VoiceMember {
                user_id: new.user_id,
                display_name: new
                    .member
                    .as_ref()
                    .map(|m| m.display_name().to_string())
                    .unwrap_or_else(|| new.user_id.to_string()),
            },
            old_channel: old.and_then(|state| state.channel_id),
            new_channel: new.channel_id,
        };

        if change.old_channel == change.new_channel {
            // Mute, deafen, stream...
            return;
        }
        self.registry.on_voice_state_change(guild_id, change).await;
    }
}

/// Snapshot of what the cache knows about the invoking member's guild.
fn guild_context(ctx: &Context, guild_id: GuildId, msg: &Message) -> Option<GuildContext> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    let voice_channel = guild
        .voice_states
        .get(&msg.author.id)
        .and_then(|state| state.channel_id);

    let channel_members = voice_channel
        .map(|channel| {
            guild
                .voice_states
                .values()
                .filter(|state| state.channel_id == Some(channel))
                .map(|state| VoiceMember {
                    user_id: state.user_id,
                    display_name: guild
                        .members
                        .get(&state.user_id)
                        .map(|m| m.display_name().to_string())
                        .unwrap_or_else(|| state.user_id.to_string()),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(GuildContext {
        guild_id,
        requester: msg.author.id,
        text_channel: msg.channel_id,
        voice_channel,
        channel_members,
    })
}

async fn react(ctx: &Context, msg: &Message, emoji: char) {
    if let Err(e) = msg.react(&ctx.http, ReactionType::from(emoji)).await {
        debug!("No se pudo reaccionar al mensaje {}: {:?}", msg.id, e);
    }
}

async fn report(ctx: &Context, msg: &Message, command: &str, error: &CommandError) {
    warn!("⚠️ '{}' falló en canal {}: {}", command, msg.channel_id, error);

    let embed = embeds::error_embed(&format!("Error en {command}"), &error.to_string());
    if let Err(e) = msg
        .channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await
    {
        error!("Error al enviar mensaje de error: {:?}", e);
    }
}
