//! In-memory engine, gateway and announcer used by the player and registry tests.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use songbird::input::Input;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Semaphore;

use crate::{
    audio::{
        engine::{
            EngineError, EngineEvent, EngineEvents, EngineStatus, PlaybackEngine, VoiceGateway,
        },
        error::PlayerError,
        notice::{Announcer, Notice},
        player::{GuildPlayer, PlayerDeps, PlayerSettings},
        registry::GuildContext,
        router::{VoiceMember, VoiceStateChange},
        track::{Provider, Track},
    },
    sources::{AudioSource, MockAudioSource, SourceError},
};

pub(crate) const BOT_ID: u64 = 1;
pub(crate) const GUILD_ID: u64 = 100;
pub(crate) const VOICE_ID: u64 = 500;
pub(crate) const TEXT_ID: u64 = 900;

pub(crate) fn track(title: &str, secs: u64) -> Track {
    Track::new(format!("https://youtu.be/{title}"), title, Provider::YouTube)
        .with_duration(Duration::from_secs(secs))
}

pub(crate) fn member(id: u64) -> VoiceMember {
    VoiceMember {
        user_id: UserId::new(id),
        display_name: format!("user{id}"),
    }
}

pub(crate) fn test_input() -> Input {
    Input::from(songbird::input::File::new("silence.mp3"))
}

/// Lets spawned tasks drain their channels (time is paused in these tests).
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

pub(crate) fn context(guild: u64, voice: Option<u64>, members: &[u64]) -> GuildContext {
    GuildContext {
        guild_id: GuildId::new(guild),
        requester: UserId::new(members.first().copied().unwrap_or(10)),
        text_channel: ChannelId::new(TEXT_ID),
        voice_channel: voice.map(ChannelId::new),
        channel_members: members.iter().copied().map(member).collect(),
    }
}

pub(crate) fn source_from<F>(open: F) -> Arc<dyn AudioSource>
where
    F: Fn(&Track) -> Result<Input, SourceError> + Send + Sync + 'static,
{
    let mut source = MockAudioSource::new();
    source.expect_open_stream().returning(move |track| open(track));
    Arc::new(source)
}

pub(crate) fn deps(
    gateway: Arc<FakeGateway>,
    sources: Arc<dyn AudioSource>,
    announcer: Arc<RecordingAnnouncer>,
    settings: PlayerSettings,
) -> PlayerDeps {
    PlayerDeps {
        gateway,
        sources,
        announcer,
        settings,
        bot_user_id: UserId::new(BOT_ID),
    }
}

/// Audio source whose `open_stream` blocks until [`GatedSource::release`] lets a call through.
pub(crate) struct GatedSource {
    gate: Semaphore,
    opens: AtomicUsize,
}

impl GatedSource {
    pub(crate) fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            opens: AtomicUsize::new(0),
        }
    }

    pub(crate) fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Calls to `open_stream` so far, finished or not.
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSource for GatedSource {
    async fn open_stream(&self, _track: &Track) -> Result<Input, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?
            .forget();
        Ok(test_input())
    }
}

pub(crate) struct FakeEngine {
    events: EngineEvents,
    status: SyncMutex<EngineStatus>,
    autoplay: AtomicBool,
    plays: AtomicUsize,
    disconnected: AtomicBool,
    disconnect_delay: Duration,
}

impl FakeEngine {
    fn new(events: EngineEvents, disconnect_delay: Duration) -> Self {
        Self {
            events,
            status: SyncMutex::new(EngineStatus::Idle),
            autoplay: AtomicBool::new(true),
            plays: AtomicUsize::new(0),
            disconnected: AtomicBool::new(false),
            disconnect_delay,
        }
    }

    fn set(&self, status: EngineStatus) {
        *self.status.lock() = status;
        self.events.emit(EngineEvent::Status(status));
    }

    /// With autoplay off, `play` stops at `Buffering`.
    pub(crate) fn set_autoplay(&self, on: bool) {
        self.autoplay.store(on, Ordering::SeqCst);
    }

    pub(crate) fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// The current track reached its end.
    pub(crate) fn finish(&self) {
        self.set(EngineStatus::Idle);
    }

    pub(crate) fn fail(&self, reason: &str) {
        *self.status.lock() = EngineStatus::Idle;
        self.events.emit(EngineEvent::Error(reason.to_string()));
    }

    pub(crate) fn drop_connection(&self) {
        self.events.emit(EngineEvent::Disconnected);
    }
}

#[async_trait]
impl PlaybackEngine for FakeEngine {
    async fn play(&self, _stream: Input) -> Result<(), EngineError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.set(EngineStatus::Buffering);
        if self.autoplay.load(Ordering::SeqCst) {
            self.set(EngineStatus::Playing);
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        if self.status() != EngineStatus::Playing {
            return Err(EngineError::NothingLoaded);
        }
        self.set(EngineStatus::Paused);
        Ok(())
    }

    fn unpause(&self) -> Result<(), EngineError> {
        if !self.status().is_paused() {
            return Err(EngineError::NothingLoaded);
        }
        self.set(EngineStatus::Playing);
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        if !self.status().is_active() {
            return Err(EngineError::NothingLoaded);
        }
        self.set(EngineStatus::Idle);
        Ok(())
    }

    fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    async fn disconnect(&self) {
        if !self.disconnect_delay.is_zero() {
            tokio::time::sleep(self.disconnect_delay).await;
        }
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeGateway {
    engines: SyncMutex<Vec<Arc<FakeEngine>>>,
    connects: AtomicUsize,
    delay: Duration,
    disconnect_delay: Duration,
    failure: Option<String>,
}

impl FakeGateway {
    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Engines take `delay` to release their voice connection.
    pub(crate) fn slow_disconnect(delay: Duration) -> Self {
        Self {
            disconnect_delay: delay,
            ..Self::default()
        }
    }

    pub(crate) fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn engine(&self, index: usize) -> Arc<FakeEngine> {
        self.engines.lock()[index].clone()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
        events: EngineEvents,
    ) -> Result<Arc<dyn PlaybackEngine>, PlayerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(PlayerError::Connect(reason.clone()));
        }

        let engine = Arc::new(FakeEngine::new(events, self.disconnect_delay));
        self.engines.lock().push(engine.clone());
        Ok(engine)
    }
}

#[derive(Default)]
pub(crate) struct RecordingAnnouncer {
    notices: SyncMutex<Vec<Notice>>,
    retracted: SyncMutex<Vec<MessageId>>,
    next_id: AtomicU64,
}

impl RecordingAnnouncer {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub(crate) fn retracted(&self) -> Vec<MessageId> {
        self.retracted.lock().clone()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn announce(
        &self,
        _channel: ChannelId,
        notice: &Notice,
    ) -> anyhow::Result<Option<MessageId>> {
        self.notices.lock().push(notice.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(MessageId::new(id)))
    }

    async fn retract(&self, _channel: ChannelId, message: MessageId) -> anyhow::Result<()> {
        self.retracted.lock().push(message);
        Ok(())
    }
}

/// A single player wired to fakes, with user 10 and the bot in the voice channel.
pub(crate) struct Harness {
    pub(crate) player: Arc<GuildPlayer>,
    pub(crate) gateway: Arc<FakeGateway>,
    pub(crate) announcer: Arc<RecordingAnnouncer>,
    pub(crate) text_channel: ChannelId,
    closed: Arc<SyncMutex<Vec<u64>>>,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        Self::build(PlayerSettings::default(), source_from(|_| Ok(test_input()))).await
    }

    pub(crate) async fn with_settings(settings: PlayerSettings) -> Self {
        Self::build(settings, source_from(|_| Ok(test_input()))).await
    }

    pub(crate) async fn with_source<F>(open: F) -> Self
    where
        F: Fn(&Track) -> Result<Input, SourceError> + Send + Sync + 'static,
    {
        Self::build(PlayerSettings::default(), source_from(open)).await
    }

    pub(crate) async fn with_audio_source(sources: Arc<dyn AudioSource>) -> Self {
        Self::build(PlayerSettings::default(), sources).await
    }

    async fn build(settings: PlayerSettings, sources: Arc<dyn AudioSource>) -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let announcer = Arc::new(RecordingAnnouncer::default());
        let deps = deps(gateway.clone(), sources, announcer.clone(), settings);

        let closed = Arc::new(SyncMutex::new(Vec::new()));
        let sink = closed.clone();
        let player = GuildPlayer::start(
            &deps,
            1,
            &context(GUILD_ID, Some(VOICE_ID), &[10]),
            ChannelId::new(VOICE_ID),
            Box::new(move |_, session| sink.lock().push(session)),
        )
        .await
        .unwrap();

        Self {
            player,
            gateway,
            announcer,
            text_channel: ChannelId::new(TEXT_ID),
            closed,
        }
    }

    pub(crate) fn engine(&self) -> Arc<FakeEngine> {
        self.gateway.engine(0)
    }

    pub(crate) fn closed_sessions(&self) -> Vec<u64> {
        self.closed.lock().clone()
    }

    pub(crate) fn leave_voice(&self, user: u64) -> VoiceStateChange {
        VoiceStateChange {
            member: member(user),
            old_channel: Some(ChannelId::new(VOICE_ID)),
            new_channel: None,
        }
    }

    pub(crate) fn join_voice(&self, user: u64) -> VoiceStateChange {
        VoiceStateChange {
            member: member(user),
            old_channel: None,
            new_channel: Some(ChannelId::new(VOICE_ID)),
        }
    }
}
