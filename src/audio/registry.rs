use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::audio::{
    error::{PlayerError, PlayerResult},
    player::{GuildPlayer, PlayerDeps},
    router::{VoiceMember, VoiceStateChange},
};

type PlayerSlot = Arc<OnceCell<Arc<GuildPlayer>>>;

/// Lo que el comando sabe del guild en el momento de invocarse.
#[derive(Debug, Clone)]
pub struct GuildContext {
    pub guild_id: GuildId,
    pub requester: UserId,
    pub text_channel: ChannelId,
    /// Voice channel the requester is in, if any.
    pub voice_channel: Option<ChannelId>,
    pub channel_members: Vec<VoiceMember>,
}

/// At most one live [`GuildPlayer`] per guild.
///
/// Creation goes through a per-guild [`OnceCell`]: concurrent callers for the same guild all
/// await the single in-flight connect. A player removes its own slot when it tears down,
/// matching on its session number so a newer player in the same guild is never evicted.
pub struct PlayerRegistry {
    players: Arc<DashMap<GuildId, PlayerSlot>>,
    deps: PlayerDeps,
    next_session: AtomicU64,
}

impl PlayerRegistry {
    pub fn new(deps: PlayerDeps) -> Self {
        Self {
            players: Arc::new(DashMap::new()),
            deps,
            next_session: AtomicU64::new(1),
        }
    }

    pub async fn get_or_create(&self, ctx: &GuildContext) -> PlayerResult<Arc<GuildPlayer>> {
        loop {
            let slot = self
                .players
                .entry(ctx.guild_id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            match slot.get_or_try_init(|| self.create(ctx)).await {
                Ok(player) if !player.is_closed() => return Ok(player.clone()),
                Ok(player) => {
                    // El anterior todavía suelta la conexión de voz
                    debug!("⏳ Esperando el cierre del reproductor anterior en guild {}", ctx.guild_id);
                    player.released().await;
                    self.forget(ctx.guild_id, &slot);
                }
                Err(e) => {
                    self.forget(ctx.guild_id, &slot);
                    return Err(e);
                }
            }
        }
    }

    async fn create(&self, ctx: &GuildContext) -> PlayerResult<Arc<GuildPlayer>> {
        let voice_channel = ctx.voice_channel.ok_or(PlayerError::NoVoiceChannel)?;
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);

        let players = Arc::downgrade(&self.players);
        let on_closed = Box::new(move |guild_id: GuildId, session: u64| {
            if let Some(players) = players.upgrade() {
                players.remove_if(&guild_id, |_, slot| {
                    slot.get().map_or(false, |p| p.session() == session)
                });
            }
        });

        GuildPlayer::start(&self.deps, session, ctx, voice_channel, on_closed).await
    }

    /// Drops `slot` if it is still the one registered for `guild_id` and holds no live player.
    fn forget(&self, guild_id: GuildId, slot: &PlayerSlot) {
        self.players.remove_if(&guild_id, |_, current| {
            Arc::ptr_eq(current, slot) && current.get().map_or(true, |p| p.is_closed())
        });
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players
            .get(&guild_id)
            .and_then(|slot| slot.get().cloned())
            .filter(|player| !player.is_closed())
    }

    /// Tears down the guild's player, if any. Idempotent.
    ///
    /// The slot is evicted by the player itself once its connection is released, so a
    /// concurrent `get_or_create` never connects while the old call is still up.
    pub async fn remove(&self, guild_id: GuildId) {
        let player = self
            .players
            .get(&guild_id)
            .and_then(|slot| slot.get().cloned());

        if let Some(player) = player {
            player.teardown("removed from registry").await;
        }
    }

    /// Queue listing for a guild that may have no player.
    pub async fn describe_queue(
        &self,
        guild_id: GuildId,
        limit: Option<usize>,
    ) -> PlayerResult<String> {
        self.get(guild_id)
            .ok_or(PlayerError::QueueEmpty)?
            .describe_queue(limit)
            .await
    }

    /// Routes a voice state change to the guild's player, if it has one.
    pub async fn on_voice_state_change(&self, guild_id: GuildId, change: VoiceStateChange) {
        if let Some(player) = self.get(guild_id) {
            player.on_voice_state_change(&change).await;
        } else {
            debug!("Cambio de voz en guild {} sin reproductor", guild_id);
        }
    }

    pub fn active_players(&self) -> usize {
        self.players
            .iter()
            .filter(|slot| slot.get().map_or(false, |p| !p.is_closed()))
            .count()
    }

    /// Tears every player down. Used on shutdown.
    pub async fn shutdown(&self) {
        let players: Vec<Arc<GuildPlayer>> = self
            .players
            .iter()
            .filter_map(|slot| slot.get().cloned())
            .collect();

        info!("🛑 Cerrando {} reproductores", players.len());
        for player in players {
            player.teardown("shutdown").await;
        }
        self.players.clear();
    }
}
