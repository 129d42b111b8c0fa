use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::Input,
    tracks::{PlayMode, TrackHandle},
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audio::{
    engine::{EngineError, EngineEvent, EngineEvents, EngineStatus, PlaybackEngine, VoiceGateway},
    error::PlayerError,
};

/// Opens voice connections through the songbird manager registered with serenity.
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: EngineEvents,
    ) -> Result<Arc<dyn PlaybackEngine>, PlayerError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::Connect(e.to_string()))?;

        {
            let mut handler = call.lock().await;
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier {
                    guild_id,
                    events: events.clone(),
                },
            );
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdEngine {
            guild_id,
            manager: self.manager.clone(),
            call,
            shared: Arc::new(Shared {
                events,
                current: SyncMutex::new(None),
                status: SyncMutex::new(EngineStatus::Idle),
            }),
        }))
    }
}

/// State shared between the engine and the track event handlers it registers.
struct Shared {
    events: EngineEvents,
    current: SyncMutex<Option<TrackHandle>>,
    status: SyncMutex<EngineStatus>,
}

impl Shared {
    fn is_current(&self, handle: &TrackHandle) -> bool {
        self.current
            .lock()
            .as_ref()
            .map_or(false, |current| current.uuid() == handle.uuid())
    }

    fn report(&self, status: EngineStatus) {
        *self.status.lock() = status;
        self.events.emit(EngineEvent::Status(status));
    }

    fn current(&self) -> Result<TrackHandle, EngineError> {
        self.current.lock().clone().ok_or(EngineError::NothingLoaded)
    }
}

/// One songbird [`Call`] driving one track at a time.
pub struct SongbirdEngine {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    shared: Arc<Shared>,
}

#[async_trait]
impl PlaybackEngine for SongbirdEngine {
    async fn play(&self, stream: Input) -> Result<(), EngineError> {
        // Sin track actual, el End del track detenido llega como obsoleto
        self.shared.current.lock().take();
        let handle = {
            let mut handler = self.call.lock().await;
            handler.stop();
            handler.play_input(stream)
        };
        *self.shared.current.lock() = Some(handle.clone());
        self.shared.report(EngineStatus::Buffering);

        for event in [
            TrackEvent::Playable,
            TrackEvent::Play,
            TrackEvent::Pause,
            TrackEvent::End,
            TrackEvent::Error,
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackNotifier {
                        event,
                        shared: self.shared.clone(),
                    },
                )
                .map_err(|e| EngineError::Backend(e.to_string()))?;
        }

        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.shared
            .current()?
            .pause()
            .map_err(|e| EngineError::Backend(e.to_string()))
    }

    fn unpause(&self) -> Result<(), EngineError> {
        self.shared
            .current()?
            .play()
            .map_err(|e| EngineError::Backend(e.to_string()))
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.shared
            .current()?
            .stop()
            .map_err(|e| EngineError::Backend(e.to_string()))
    }

    fn status(&self) -> EngineStatus {
        *self.shared.status.lock()
    }

    async fn disconnect(&self) {
        {
            let mut handler = self.call.lock().await;
            handler.remove_all_global_events();
            handler.stop();
        }
        self.shared.current.lock().take();

        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Llamada de guild {} ya cerrada: {}", self.guild_id, e);
        }
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
    }
}

/// Translates songbird track events of the current track into [`EngineEvent`]s.
struct TrackNotifier {
    event: TrackEvent,
    shared: Arc<Shared>,
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };

        for (state, handle) in *tracks {
            if !self.shared.is_current(handle) {
                continue;
            }

            match (self.event, &state.playing) {
                (TrackEvent::Error, PlayMode::Errored(e)) => {
                    warn!("❌ Error en el track: {:?}", e);
                    *self.shared.status.lock() = EngineStatus::Idle;
                    self.shared.current.lock().take();
                    self.shared.events.emit(EngineEvent::Error(format!("{e:?}")));
                }
                (TrackEvent::Playable | TrackEvent::Play, _) => {
                    self.shared.report(EngineStatus::Playing)
                }
                (TrackEvent::Pause, _) => self.shared.report(EngineStatus::Paused),
                (TrackEvent::End, _) => {
                    self.shared.current.lock().take();
                    self.shared.report(EngineStatus::Idle);
                }
                _ => {}
            }
        }

        None
    }
}

struct DisconnectNotifier {
    guild_id: GuildId,
    events: EngineEvents,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "🔌 Bot desconectado del canal de voz en guild {}: {:?}",
                self.guild_id, data.reason
            );
            self.events.emit(EngineEvent::Disconnected);
        }

        None
    }
}
