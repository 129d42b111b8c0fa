//! Seams between the guild player and the voice transport.
//!
//! The player never talks to songbird directly: it drives a [`PlaybackEngine`] obtained from a
//! [`VoiceGateway`] and listens to the [`EngineEvent`]s the engine pushes through
//! [`EngineEvents`]. The production implementation lives in
//! [`songbird_engine`](crate::audio::songbird_engine); tests use the fakes in `audio::testing`.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::Input;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use crate::audio::error::PlayerError;

/// Estado del motor de reproducción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    Buffering,
    Playing,
    Paused,
    AutoPaused,
}

impl EngineStatus {
    /// Whether a track is loaded in the engine (buffering, playing or paused).
    pub fn is_active(&self) -> bool {
        !matches!(self, EngineStatus::Idle)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, EngineStatus::Paused | EngineStatus::AutoPaused)
    }
}

/// Notifications emitted by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine moved to a new status.
    Status(EngineStatus),
    /// The current resource failed; the engine is idle afterwards.
    Error(String),
    /// The voice connection was lost.
    Disconnected,
}

/// Sender handed to the engine at connect time.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: EngineEvent) {
        trace!("📡 Evento de motor: {:?}", event);
        // El receptor desaparece tras el teardown; descartar es correcto
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no hay ningún track cargado")]
    NothingLoaded,
    #[error("error del motor de audio: {0}")]
    Backend(String),
}

/// Playback engine bound 1:1 to a voice connection.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Starts playing `stream`, replacing whatever was loaded.
    async fn play(&self, stream: Input) -> Result<(), EngineError>;

    fn pause(&self) -> Result<(), EngineError>;

    fn unpause(&self) -> Result<(), EngineError>;

    /// Stops the current resource; the engine reports `Idle` afterwards.
    fn stop(&self) -> Result<(), EngineError>;

    fn status(&self) -> EngineStatus;

    /// Detaches every listener and releases the voice connection.
    async fn disconnect(&self);
}

/// Opens voice connections. One call to [`VoiceGateway::connect`] yields one engine.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: EngineEvents,
    ) -> Result<Arc<dyn PlaybackEngine>, PlayerError>;
}
