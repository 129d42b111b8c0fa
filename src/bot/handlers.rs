use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::{
        error::PlayerError,
        player::GuildPlayer,
        registry::{GuildContext, PlayerRegistry},
        track::Track,
    },
    bot::commands::{Command, PlayArg},
    sources::{SourceError, TrackResolver},
    ui::messages,
};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Player(#[from] PlayerError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Uso: {0}")]
    Usage(&'static str),
}

/// Resultados de `search` pendientes de selección.
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub query: String,
    pub results: Vec<Track>,
    pub user_id: UserId,
}

/// Executes parsed commands against the player registry.
///
/// Returns the text to reply with, if any. Failures come back as [`CommandError`] and are
/// rendered by the caller.
pub struct CommandHandler {
    registry: Arc<PlayerRegistry>,
    resolver: Arc<dyn TrackResolver>,
    searches: DashMap<GuildId, SearchSession>,
    search_limit: usize,
}

impl CommandHandler {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        resolver: Arc<dyn TrackResolver>,
        search_limit: usize,
    ) -> Self {
        Self {
            registry,
            resolver,
            searches: DashMap::new(),
            search_limit,
        }
    }

    pub async fn execute(
        &self,
        ctx: &GuildContext,
        command: Command,
    ) -> Result<Option<String>, CommandError> {
        match command {
            Command::Play(PlayArg::Resume) | Command::Resume => {
                self.player(ctx)?.resume().await?;
                Ok(Some("▶️ Reproducción reanudada".to_string()))
            }
            Command::Play(PlayArg::Pick(n)) => self.pick(ctx, n).await,
            Command::Play(PlayArg::Query(query)) => {
                let tracks = self.resolver.resolve(&query).await?;
                self.enqueue(ctx, tracks).await
            }
            Command::Search(query) => self.search(ctx, query).await,
            Command::Pause => {
                self.player(ctx)?.pause().await?;
                Ok(Some("⏸️ Reproducción pausada".to_string()))
            }
            Command::Stop => {
                self.player(ctx)?.stop().await?;
                Ok(Some("⏹️ Reproducción detenida".to_string()))
            }
            Command::Clear => {
                let cleared = self.player(ctx)?.clear().await?;
                Ok(Some(format!("🗑️ {cleared} canciones eliminadas de la cola")))
            }
            Command::Shuffle => {
                self.player(ctx)?.shuffle().await?;
                Ok(Some("🔀 Cola mezclada".to_string()))
            }
            Command::Skip => {
                self.player(ctx)?.skip().await?;
                Ok(None)
            }
            Command::Previous => {
                self.player(ctx)?.previous_track().await?;
                Ok(None)
            }
            Command::Queue(limit) => {
                let listing = self.registry.describe_queue(ctx.guild_id, limit).await?;
                Ok(Some(listing))
            }
            Command::NowPlaying => {
                let track = self.player(ctx)?.now_playing().await?;
                Ok(Some(format!("🎵 {track}\n{}", track.url())))
            }
            Command::Leave => {
                self.searches.remove(&ctx.guild_id);
                self.registry.remove(ctx.guild_id).await;
                Ok(None)
            }
            Command::Ping => Ok(Some("🏓 Pong!".to_string())),
        }
    }

    fn player(&self, ctx: &GuildContext) -> Result<Arc<GuildPlayer>, PlayerError> {
        self.registry
            .get(ctx.guild_id)
            .ok_or(PlayerError::NotPlaying)
    }

    async fn enqueue(
        &self,
        ctx: &GuildContext,
        tracks: Vec<Track>,
    ) -> Result<Option<String>, CommandError> {
        let player = self.registry.get_or_create(ctx).await?;
        let reply = messages::tracks_added(&tracks);
        player.enqueue(tracks, ctx.text_channel).await?;
        Ok(Some(reply))
    }

    /// `play N`: a result of the requester's own pending search if there is one, otherwise
    /// queue position `N` (`#1` being the current track).
    async fn pick(&self, ctx: &GuildContext, n: usize) -> Result<Option<String>, CommandError> {
        let own_search = self
            .searches
            .remove_if(&ctx.guild_id, |_, session| session.user_id == ctx.requester);
        if let Some((_, session)) = own_search {
            let track = n
                .checked_sub(1)
                .and_then(|i| session.results.get(i))
                .cloned()
                .ok_or(PlayerError::InvalidIndex(n))?;
            debug!("🔍 Resultado #{} de '{}' elegido", n, session.query);
            return self.enqueue(ctx, vec![track]).await;
        }

        let index = n.checked_sub(1).ok_or(PlayerError::InvalidIndex(n))?;
        self.registry
            .get(ctx.guild_id)
            .ok_or(PlayerError::QueueEmpty)?
            .reorder_to_front(index)
            .await
            .map_err(|e| match e {
                PlayerError::InvalidIndex(_) => PlayerError::InvalidIndex(n),
                other => other,
            })?;
        Ok(None)
    }

    async fn search(&self, ctx: &GuildContext, query: String) -> Result<Option<String>, CommandError> {
        if query.is_empty() {
            return Err(CommandError::Usage("search <texto>"));
        }

        let results = self.resolver.search(&query, self.search_limit).await?;
        info!("🔍 {} resultados para '{}'", results.len(), query);
        let listing = messages::search_results(&results);

        self.searches.insert(
            ctx.guild_id,
            SearchSession {
                query,
                results,
                user_id: ctx.requester,
            },
        );
        Ok(Some(listing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            engine::EngineStatus,
            player::PlayerSettings,
            testing::{
                context, deps, settle, source_from, test_input, track, FakeGateway,
                RecordingAnnouncer, GUILD_ID, VOICE_ID,
            },
        },
        sources::MockTrackResolver,
    };
    use pretty_assertions::assert_eq;

    struct Fixture {
        handler: CommandHandler,
        registry: Arc<PlayerRegistry>,
        ctx: GuildContext,
    }

    fn fixture(resolver: MockTrackResolver) -> Fixture {
        let registry = Arc::new(PlayerRegistry::new(deps(
            Arc::new(FakeGateway::default()),
            source_from(|_| Ok(test_input())),
            Arc::new(RecordingAnnouncer::default()),
            PlayerSettings::default(),
        )));
        Fixture {
            handler: CommandHandler::new(registry.clone(), Arc::new(resolver), 5),
            registry,
            ctx: context(GUILD_ID, Some(VOICE_ID), &[10]),
        }
    }

    fn resolving(tracks: Vec<Track>) -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(move |_| Ok(tracks.clone()));
        resolver
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_query_creates_player_and_enqueues() {
        let f = fixture(resolving(vec![track("A", 180)]));

        let reply = f
            .handler
            .execute(&f.ctx, Command::Play(PlayArg::Query("a".to_string())))
            .await
            .unwrap();
        settle().await;

        assert_eq!(
            reply.as_deref(),
            Some("➕ Agregado a la cola: A `[00:03:00]`")
        );
        let player = f.registry.get(f.ctx.guild_id).unwrap();
        assert_eq!(player.snapshot().await.status, EngineStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_without_voice_channel_fails() {
        let f = fixture(resolving(vec![track("A", 180)]));
        let ctx = context(GUILD_ID, None, &[10]);

        let err = f
            .handler
            .execute(&ctx, Command::Play(PlayArg::Query("a".to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Player(PlayerError::NoVoiceChannel)));
        assert!(f.registry.get(ctx.guild_id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_query_creates_no_player() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Err(SourceError::NotFound));
        let f = fixture(resolver);

        let err = f
            .handler
            .execute(&f.ctx, Command::Play(PlayArg::Query("zzz".to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Source(SourceError::NotFound)));
        assert!(f.registry.get(f.ctx.guild_id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_then_pick() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_search()
            .withf(|query, limit| query == "lofi" && *limit == 5)
            .times(1)
            .returning(|_, _| Ok(vec![track("R1", 100), track("R2", 200)]));
        let f = fixture(resolver);

        let listing = f
            .handler
            .execute(&f.ctx, Command::Search("lofi".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert!(listing.contains("**#2** R2"));

        f.handler
            .execute(&f.ctx, Command::Play(PlayArg::Pick(2)))
            .await
            .unwrap();
        settle().await;

        let player = f.registry.get(f.ctx.guild_id).unwrap();
        assert_eq!(player.now_playing().await.unwrap(), track("R2", 200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_the_searcher_picks_results() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_search()
            .returning(|_, _| Ok(vec![track("R1", 100)]));
        let f = fixture(resolver);
        f.handler
            .execute(&f.ctx, Command::Search("lofi".to_string()))
            .await
            .unwrap();

        // Otro usuario: el número es una posición de la cola, que no existe
        let other = context(GUILD_ID, Some(VOICE_ID), &[11]);
        let err = f
            .handler
            .execute(&other, Command::Play(PlayArg::Pick(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Player(PlayerError::QueueEmpty)));

        f.handler
            .execute(&f.ctx, Command::Play(PlayArg::Pick(1)))
            .await
            .unwrap();
        settle().await;

        let player = f.registry.get(f.ctx.guild_id).unwrap();
        assert_eq!(player.now_playing().await.unwrap(), track("R1", 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pick_without_search_reorders_queue() {
        let f = fixture(resolving(vec![track("A", 1), track("B", 1), track("C", 1)]));
        f.handler
            .execute(&f.ctx, Command::Play(PlayArg::Query("list".to_string())))
            .await
            .unwrap();
        settle().await;

        // #1 es la actual, #3 es C
        f.handler
            .execute(&f.ctx, Command::Play(PlayArg::Pick(3)))
            .await
            .unwrap();
        settle().await;

        let snap = f.registry.get(f.ctx.guild_id).unwrap().snapshot().await;
        assert_eq!(snap.current, Some(track("C", 1)));
        assert_eq!(snap.queue, vec![track("B", 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pick_out_of_range_reports_user_number() {
        let f = fixture(resolving(vec![track("A", 1)]));
        f.handler
            .execute(&f.ctx, Command::Play(PlayArg::Query("a".to_string())))
            .await
            .unwrap();
        settle().await;

        let err = f
            .handler
            .execute(&f.ctx, Command::Play(PlayArg::Pick(7)))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Player(PlayerError::InvalidIndex(7))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_controls_without_player() {
        let f = fixture(MockTrackResolver::new());

        for command in [Command::Skip, Command::Pause, Command::Stop, Command::NowPlaying] {
            let err = f.handler.execute(&f.ctx, command).await.unwrap_err();
            assert!(matches!(err, CommandError::Player(PlayerError::NotPlaying)));
        }

        let err = f
            .handler
            .execute(&f.ctx, Command::Queue(None))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Player(PlayerError::QueueEmpty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_removes_player() {
        let f = fixture(resolving(vec![track("A", 1)]));
        f.handler
            .execute(&f.ctx, Command::Play(PlayArg::Query("a".to_string())))
            .await
            .unwrap();

        f.handler.execute(&f.ctx, Command::Leave).await.unwrap();

        assert!(f.registry.get(f.ctx.guild_id).is_none());
        assert_eq!(f.registry.active_players(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_search_is_usage_error() {
        let f = fixture(MockTrackResolver::new());
        let err = f
            .handler
            .execute(&f.ctx, Command::Search(String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Usage(_)));
    }
}
