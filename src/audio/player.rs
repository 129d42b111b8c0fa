use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    audio::{
        engine::{EngineError, EngineEvent, EngineEvents, EngineStatus, PlaybackEngine, VoiceGateway},
        error::{PlayerError, PlayerResult},
        notice::{Announcer, Notice},
        queue::{History, TrackQueue},
        registry::GuildContext,
        router::{self, Effect, VoiceStateChange},
        timer::{LeaveTimer, TimerFired, TimerKind},
        track::Track,
    },
    sources::AudioSource,
    ui::messages,
};

/// Tunables shared by every guild player.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub max_queue_size: usize,
    pub max_history_size: usize,
    pub idle_timeout: Duration,
    pub abandon_timeout: Duration,
    pub max_replay_retries: u8,
    pub retry_backoff: Duration,
    pub queue_preview_len: usize,
    pub queue_message_budget: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_history_size: 50,
            idle_timeout: Duration::from_secs(600),
            abandon_timeout: Duration::from_secs(60),
            max_replay_retries: 5,
            retry_backoff: Duration::from_millis(100),
            queue_preview_len: 5,
            queue_message_budget: 3500,
        }
    }
}

impl PlayerSettings {
    fn timeout_for(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::QueueDrained => self.idle_timeout,
            TimerKind::ChannelAbandoned => self.abandon_timeout,
        }
    }
}

/// Everything a player needs from the outside, shared by all guilds.
#[derive(Clone)]
pub struct PlayerDeps {
    pub gateway: Arc<dyn VoiceGateway>,
    pub sources: Arc<dyn AudioSource>,
    pub announcer: Arc<dyn Announcer>,
    pub settings: PlayerSettings,
    pub bot_user_id: UserId,
}

/// Called once when a player finishes its teardown, with its guild and session.
pub(crate) type OnClosed = Box<dyn FnOnce(GuildId, u64) + Send>;

#[derive(Debug)]
pub(crate) struct PlayerMessages {
    pub(crate) announce_channel: ChannelId,
    pub(crate) now_playing: Option<MessageId>,
}

/// Mutable state of a guild player. Only touched with the player's lock held.
#[derive(Debug)]
pub(crate) struct PlayerState {
    pub(crate) queue: TrackQueue,
    pub(crate) history: History,
    pub(crate) current: Option<Track>,
    /// Last status reported by the engine.
    pub(crate) status: EngineStatus,
    /// Members of the bound voice channel, the bot included.
    pub(crate) roster: HashMap<UserId, String>,
    pub(crate) timer: LeaveTimer,
    pub(crate) retry_count: u8,
    /// Ticket of the load in flight, if any.
    pub(crate) loading: Option<u64>,
    pub(crate) load_seq: u64,
    pub(crate) closed: bool,
    pub(crate) messages: PlayerMessages,
}

impl PlayerState {
    pub(crate) fn new(
        settings: &PlayerSettings,
        timer_tx: mpsc::UnboundedSender<TimerFired>,
        announce_channel: ChannelId,
    ) -> Self {
        Self {
            queue: TrackQueue::new(settings.max_queue_size),
            history: History::new(settings.max_history_size),
            current: None,
            status: EngineStatus::Idle,
            roster: HashMap::new(),
            timer: LeaveTimer::new(timer_tx),
            retry_count: 0,
            loading: None,
            load_seq: 0,
            closed: false,
            messages: PlayerMessages {
                announce_channel,
                now_playing: None,
            },
        }
    }

    /// Nadie más que el bot en el canal de voz.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.roster.len() <= 1
    }
}

/// Read-only view of a player, for status commands and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub history_len: usize,
    pub status: EngineStatus,
    pub armed_timer: Option<TimerKind>,
    pub retry_count: u8,
    pub roster_size: usize,
    pub closed: bool,
}

impl From<EngineError> for PlayerError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::NothingLoaded => PlayerError::NotPlaying,
            EngineError::Backend(_) => PlayerError::InvalidState,
        }
    }
}

/// Reproductor de un guild: cola, historial, conexión de voz y temporizador de salida.
pub struct GuildPlayer {
    guild_id: GuildId,
    session: u64,
    voice_channel: ChannelId,
    bot_user_id: UserId,
    settings: PlayerSettings,
    engine: Arc<dyn PlaybackEngine>,
    sources: Arc<dyn AudioSource>,
    announcer: Arc<dyn Announcer>,
    state: Mutex<PlayerState>,
    shutdown: CancellationToken,
    on_closed: SyncMutex<Option<OnClosed>>,
    /// Flips to `true` once teardown has released the connection and left the registry.
    released: watch::Sender<bool>,
}

impl GuildPlayer {
    /// Connects to `voice_channel` and starts the player's event router.
    pub(crate) async fn start(
        deps: &PlayerDeps,
        session: u64,
        ctx: &GuildContext,
        voice_channel: ChannelId,
        on_closed: OnClosed,
    ) -> PlayerResult<Arc<Self>> {
        let (events, engine_rx) = EngineEvents::channel();
        let engine = deps
            .gateway
            .connect(ctx.guild_id, voice_channel, events)
            .await?;

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let mut state = PlayerState::new(&deps.settings, timer_tx, ctx.text_channel);
        for member in &ctx.channel_members {
            state
                .roster
                .insert(member.user_id, member.display_name.clone());
        }
        state
            .roster
            .entry(deps.bot_user_id)
            .or_insert_with(|| "bot".to_string());

        let player = Arc::new(Self {
            guild_id: ctx.guild_id,
            session,
            voice_channel,
            bot_user_id: deps.bot_user_id,
            settings: deps.settings.clone(),
            engine,
            sources: deps.sources.clone(),
            announcer: deps.announcer.clone(),
            state: Mutex::new(state),
            shutdown: CancellationToken::new(),
            on_closed: SyncMutex::new(Some(on_closed)),
            released: watch::channel(false).0,
        });

        tokio::spawn(
            router::run(
                Arc::downgrade(&player),
                engine_rx,
                timer_rx,
                player.shutdown.clone(),
            )
            .instrument(info_span!("player", guild_id = %ctx.guild_id, session)),
        );

        info!(
            "🔊 Reproductor creado en guild {} (canal {}, sesión {})",
            ctx.guild_id, voice_channel, session
        );
        Ok(player)
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits until a teardown started by anyone has fully completed.
    pub async fn released(&self) {
        let mut rx = self.released.subscribe();
        let _ = rx.wait_for(|released| *released).await;
    }

    /// Appends tracks and starts playback if the engine is idle.
    ///
    /// `from_channel` becomes the channel where this player posts its notices.
    pub async fn enqueue(&self, tracks: Vec<Track>, from_channel: ChannelId) -> PlayerResult<usize> {
        let (added, start) = {
            let mut state = self.state.lock().await;
            ensure_open(&state)?;
            let added = state.queue.enqueue(tracks)?;
            state.messages.announce_channel = from_channel;
            state.timer.disarm();
            let start = state.status == EngineStatus::Idle && state.loading.is_none();
            (added, start)
        };

        info!("➕ {} canciones agregadas en guild {}", added, self.guild_id);
        if start {
            self.play_next().await;
        }
        Ok(added)
    }

    /// Loads the head of the queue into the engine.
    ///
    /// Tracks whose stream cannot be opened are announced and dropped; the loop moves on to the
    /// next one. Does nothing while another load is in flight or the engine is busy.
    pub async fn play_next(&self) {
        let mut failures = 0usize;

        loop {
            let (track, ticket) = {
                let mut state = self.state.lock().await;
                if state.closed || state.loading.is_some() || state.status.is_active() {
                    return;
                }
                let Some(track) = state.queue.pop_front() else {
                    if failures > 0 && state.timer.armed().is_none() {
                        state
                            .timer
                            .arm(TimerKind::QueueDrained, self.settings.idle_timeout);
                    }
                    return;
                };
                state.load_seq += 1;
                let ticket = state.load_seq;
                state.loading = Some(ticket);
                (track, ticket)
            };

            debug!("🎵 Preparando: {}", track.title());
            let opened = self.sources.open_stream(&track).await;

            let mut state = self.state.lock().await;
            if state.closed || state.loading != Some(ticket) {
                debug!("⏭️ Carga de '{}' descartada", track.title());
                return;
            }
            state.loading = None;

            let failure = match opened {
                Ok(stream) => match self.engine.play(stream).await {
                    Ok(()) => {
                        info!("▶️ Reproduciendo en guild {}: {}", self.guild_id, track.title());
                        state.current = Some(track);
                        state.status = EngineStatus::Buffering;
                        return;
                    }
                    Err(e) => e.to_string(),
                },
                Err(e) => e.to_string(),
            };
            drop(state);

            warn!("❌ No se pudo cargar '{}': {}", track.title(), failure);
            failures += 1;
            self.announce(Notice::TrackUnavailable {
                track,
                reason: failure,
            })
            .await;
        }
    }

    pub async fn skip(&self) -> PlayerResult<()> {
        {
            let state = self.state.lock().await;
            ensure_open(&state)?;
            if state.status != EngineStatus::Playing {
                return Err(PlayerError::NotPlaying);
            }
        }
        self.engine.stop()?;
        Ok(())
    }

    /// Clears the queue and stops the current track.
    pub async fn stop(&self) -> PlayerResult<()> {
        {
            let mut state = self.state.lock().await;
            ensure_open(&state)?;
            if state.status != EngineStatus::Playing {
                return Err(PlayerError::NotPlaying);
            }
            let cleared = state.queue.clear();
            debug!("⏹️ Stop: {} canciones descartadas", cleared);
        }
        self.engine.stop()?;
        Ok(())
    }

    /// Empties the queue. The current track keeps playing.
    pub async fn clear(&self) -> PlayerResult<usize> {
        let mut state = self.state.lock().await;
        ensure_open(&state)?;
        if state.queue.is_empty() {
            return Err(PlayerError::QueueEmpty);
        }
        Ok(state.queue.clear())
    }

    pub async fn shuffle(&self) -> PlayerResult<()> {
        let mut state = self.state.lock().await;
        ensure_open(&state)?;
        if state.queue.is_empty() {
            return Err(PlayerError::QueueEmpty);
        }
        state.queue.shuffle();
        Ok(())
    }

    /// Plays queue entry `index` (1-based) next, interrupting the current track.
    ///
    /// Index 0 replays the current track.
    pub async fn reorder_to_front(&self, index: usize) -> PlayerResult<()> {
        let active = {
            let mut state = self.state.lock().await;
            ensure_open(&state)?;
            if index > state.queue.len() {
                return Err(PlayerError::InvalidIndex(index));
            }
            if index == 0 {
                let current = state
                    .current
                    .clone()
                    .ok_or(PlayerError::InvalidIndex(0))?;
                state.queue.push_front(current);
            } else {
                state.queue.move_to_front(index - 1);
            }
            state.status.is_active()
        };
        self.restart(active).await
    }

    /// Pushes the most recently played track back to the head of the queue and plays it.
    pub async fn previous_track(&self) -> PlayerResult<()> {
        let active = {
            let mut state = self.state.lock().await;
            ensure_open(&state)?;
            let previous = state
                .history
                .pop_latest()
                .ok_or(PlayerError::HistoryEmpty)?;
            debug!("⏮️ Volviendo a: {}", previous.title());
            state.queue.push_front(previous);
            state.status.is_active()
        };
        self.restart(active).await
    }

    async fn restart(&self, active: bool) -> PlayerResult<()> {
        if active {
            // El evento Idle carga la cabeza de la cola
            self.engine.stop()?;
        } else {
            self.play_next().await;
        }
        Ok(())
    }

    pub async fn pause(&self) -> PlayerResult<()> {
        {
            let state = self.state.lock().await;
            ensure_open(&state)?;
            if state.status != EngineStatus::Playing {
                return Err(PlayerError::InvalidState);
            }
        }
        self.engine.pause()?;
        Ok(())
    }

    pub async fn resume(&self) -> PlayerResult<()> {
        {
            let mut state = self.state.lock().await;
            ensure_open(&state)?;
            if !state.status.is_paused() {
                return Err(PlayerError::InvalidState);
            }
            state.timer.disarm();
        }
        self.engine.unpause()?;
        Ok(())
    }

    /// Renders the current track and the next `limit` entries (the configured preview when
    /// `None`).
    pub async fn describe_queue(&self, limit: Option<usize>) -> PlayerResult<String> {
        let state = self.state.lock().await;
        if state.current.is_none() && state.queue.is_empty() {
            return Err(PlayerError::QueueEmpty);
        }
        Ok(messages::render_queue(
            state.current.as_ref(),
            state.queue.iter(),
            limit.unwrap_or(self.settings.queue_preview_len),
            self.settings.queue_message_budget,
        ))
    }

    pub async fn now_playing(&self) -> PlayerResult<Track> {
        self.state
            .lock()
            .await
            .current
            .clone()
            .ok_or(PlayerError::NotPlaying)
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let state = self.state.lock().await;
        PlayerSnapshot {
            current: state.current.clone(),
            queue: state.queue.to_vec(),
            history_len: state.history.len(),
            status: state.status,
            armed_timer: state.timer.armed(),
            retry_count: state.retry_count,
            roster_size: state.roster.len(),
            closed: state.closed,
        }
    }

    pub async fn leave(&self) {
        self.teardown("leave command").await;
    }

    /// Releases everything the player holds. Idempotent: a second caller waits for the first
    /// teardown to finish.
    pub async fn teardown(&self, reason: &str) {
        let now_playing = {
            let mut state = self.state.lock().await;
            if state.closed {
                drop(state);
                self.released().await;
                return;
            }
            state.closed = true;
            state.timer.disarm();
            state.queue.clear();
            state.loading = None;
            let channel = state.messages.announce_channel;
            state.messages.now_playing.take().map(|id| (channel, id))
        };

        self.shutdown.cancel();
        self.engine.disconnect().await;

        if let Some((channel, message)) = now_playing {
            if let Err(e) = self.announcer.retract(channel, message).await {
                debug!("No se pudo borrar el mensaje: {}", e);
            }
        }

        let on_closed = self.on_closed.lock().take();
        if let Some(on_closed) = on_closed {
            on_closed(self.guild_id, self.session);
        }
        self.released.send_replace(true);

        info!(
            "👋 Reproductor de guild {} cerrado (sesión {}): {}",
            self.guild_id, self.session, reason
        );
    }

    pub async fn on_voice_state_change(&self, change: &VoiceStateChange) {
        let effects = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            router::on_voice_state(&mut state, self.bot_user_id, self.voice_channel, change)
        };
        self.apply(effects).await;
    }

    pub(crate) async fn handle_engine_event(&self, event: EngineEvent) {
        let effects = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            router::on_engine_event(&mut state, &self.settings, event)
        };
        self.apply(effects).await;
    }

    pub(crate) async fn handle_timer(&self, fired: TimerFired) {
        let claimed = {
            let mut state = self.state.lock().await;
            !state.closed && state.timer.claim(fired)
        };
        if !claimed {
            debug!("⏲️ Evento de temporizador obsoleto ignorado");
            return;
        }

        let reason = match fired.kind {
            TimerKind::QueueDrained => "queue drained",
            TimerKind::ChannelAbandoned => "channel abandoned",
        };
        self.teardown(reason).await;
    }

    async fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PlayNext => self.play_next().await,
                Effect::Arm(kind) => {
                    let mut state = self.state.lock().await;
                    if !state.closed {
                        state.timer.arm(kind, self.settings.timeout_for(kind));
                    }
                }
                Effect::Disarm => {
                    self.state.lock().await.timer.disarm();
                }
                Effect::Announce(notice) => self.announce(notice).await,
                Effect::RetractNowPlaying => self.retract_now_playing().await,
                Effect::RetryAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    self.play_next().await;
                }
                Effect::Pause => {
                    if let Err(e) = self.engine.pause() {
                        warn!("No se pudo pausar: {}", e);
                    }
                }
                Effect::Resume => {
                    if let Err(e) = self.engine.unpause() {
                        warn!("No se pudo reanudar: {}", e);
                    }
                }
                Effect::Teardown(reason) => self.teardown(reason).await,
            }
        }
    }

    async fn announce(&self, notice: Notice) {
        let channel = self.state.lock().await.messages.announce_channel;

        match self.announcer.announce(channel, &notice).await {
            Ok(Some(message)) if matches!(notice, Notice::NowPlaying(_)) => {
                let stale = {
                    let mut state = self.state.lock().await;
                    state.messages.now_playing.replace(message)
                };
                if let Some(stale) = stale {
                    let _ = self.announcer.retract(channel, stale).await;
                }
            }
            Ok(_) => {}
            Err(e) => warn!("No se pudo enviar el aviso: {}", e),
        }
    }

    async fn retract_now_playing(&self) {
        let target = {
            let mut state = self.state.lock().await;
            let channel = state.messages.announce_channel;
            state.messages.now_playing.take().map(|id| (channel, id))
        };
        if let Some((channel, message)) = target {
            if let Err(e) = self.announcer.retract(channel, message).await {
                debug!("No se pudo borrar el mensaje: {}", e);
            }
        }
    }
}

fn ensure_open(state: &PlayerState) -> PlayerResult<()> {
    if state.closed {
        Err(PlayerError::Closed)
    } else {
        Ok(())
    }
}
