//! Playback event router.
//!
//! Every reaction of a guild player to the outside world goes through one of the pure
//! transition functions below:
//!
//! - [`on_engine_event`] for engine status changes, errors and disconnects
//! - [`on_voice_state`] for members joining or leaving the bound voice channel
//!
//! They mutate the player's state in place (history, queue requeue, roster, retry counter)
//! and return the side effects as a list of [`Effect`]s. The player executes those effects
//! without holding its state lock, so none of the functions here ever awaits.
//!
//! [`run`] is the per-player task that feeds engine and timer events into the player.

use serenity::model::id::{ChannelId, UserId};
use std::{sync::Weak, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::audio::{
    engine::{EngineEvent, EngineStatus},
    notice::Notice,
    player::{GuildPlayer, PlayerSettings, PlayerState},
    timer::{TimerFired, TimerKind},
};

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    PlayNext,
    Arm(TimerKind),
    Disarm,
    Announce(Notice),
    RetractNowPlaying,
    /// Back off, then `PlayNext`.
    RetryAfter(Duration),
    Pause,
    Resume,
    Teardown(&'static str),
}

/// Miembro de un canal de voz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMember {
    pub user_id: UserId,
    pub display_name: String,
}

/// A member moved between voice channels (either side may be `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStateChange {
    pub member: VoiceMember,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}

pub(crate) fn on_engine_event(
    state: &mut PlayerState,
    settings: &PlayerSettings,
    event: EngineEvent,
) -> Vec<Effect> {
    match event {
        EngineEvent::Status(status) => on_status(state, status),
        EngineEvent::Error(reason) => on_error(state, settings, reason),
        EngineEvent::Disconnected => vec![Effect::Teardown("voice disconnected")],
    }
}

fn on_status(state: &mut PlayerState, new: EngineStatus) -> Vec<Effect> {
    let old = state.status;
    if old == new {
        return Vec::new();
    }
    state.status = new;

    match new {
        EngineStatus::Playing => {
            state.retry_count = 0;
            let mut effects = Vec::new();
            if !state.is_abandoned() {
                effects.push(Effect::Disarm);
            } else if state.timer.armed() == Some(TimerKind::ChannelAbandoned) {
                // El canal se vació mientras el track cargaba
                effects.push(Effect::Pause);
            }
            // Reanudar no es un nuevo "now playing"
            if !old.is_paused() {
                if let Some(track) = &state.current {
                    effects.push(Effect::Announce(Notice::NowPlaying(track.clone())));
                }
            }
            effects
        }
        EngineStatus::Idle => {
            let mut effects = vec![Effect::RetractNowPlaying];
            if let Some(finished) = state.current.take() {
                debug!("✅ Terminó: {}", finished.title());
                state.history.push(finished);
            }
            effects.extend(after_idle(state));
            effects
        }
        EngineStatus::Buffering | EngineStatus::Paused | EngineStatus::AutoPaused => Vec::new(),
    }
}

fn on_error(state: &mut PlayerState, settings: &PlayerSettings, reason: String) -> Vec<Effect> {
    state.status = EngineStatus::Idle;
    let mut effects = vec![Effect::RetractNowPlaying];

    let Some(track) = state.current.take() else {
        warn!("❌ Error del motor sin track cargado: {}", reason);
        effects.extend(after_idle(state));
        return effects;
    };

    if is_transient(&reason) && state.retry_count < settings.max_replay_retries {
        state.retry_count += 1;
        warn!(
            "🔄 Reintentando '{}' ({} de {}): {}",
            track.title(),
            state.retry_count,
            settings.max_replay_retries,
            reason
        );
        state.queue.push_front(track);
        effects.push(Effect::RetryAfter(
            settings.retry_backoff * u32::from(state.retry_count),
        ));
        return effects;
    }

    // Terminal para este track: no pasa al historial
    error!("❌ Error reproduciendo '{}': {}", track.title(), reason);
    state.retry_count = 0;
    effects.push(Effect::Announce(Notice::TrackUnavailable { track, reason }));
    effects.extend(after_idle(state));
    effects
}

fn after_idle(state: &PlayerState) -> Option<Effect> {
    if !state.queue.is_empty() {
        return Some(Effect::PlayNext);
    }
    // El temporizador de abandono, más corto, tiene prioridad
    if state.timer.armed() == Some(TimerKind::ChannelAbandoned) {
        return None;
    }
    Some(Effect::Arm(TimerKind::QueueDrained))
}

/// Upstream rejections worth replaying (expired or throttled stream URLs).
pub(crate) fn is_transient(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    reason.contains("403") || reason.contains("forbidden") || reason.contains("access denied")
}

pub(crate) fn on_voice_state(
    state: &mut PlayerState,
    bot_user_id: UserId,
    bound_channel: ChannelId,
    change: &VoiceStateChange,
) -> Vec<Effect> {
    if change.old_channel == change.new_channel {
        return Vec::new();
    }

    let user_id = change.member.user_id;
    let mut effects = Vec::new();

    if change.old_channel == Some(bound_channel) && state.roster.remove(&user_id).is_some() {
        if user_id == bot_user_id {
            return vec![Effect::Teardown("bot left the voice channel")];
        }
        if state.roster.len() == 1 {
            debug!("🚪 Todos los miembros salieron del canal de voz");
            if state.status == EngineStatus::Playing {
                effects.push(Effect::Pause);
            }
            effects.push(Effect::Announce(Notice::ChannelAbandoned));
            effects.push(Effect::Arm(TimerKind::ChannelAbandoned));
        }
    }

    if change.new_channel == Some(bound_channel) {
        state
            .roster
            .insert(user_id, change.member.display_name.clone());

        if state.timer.armed() == Some(TimerKind::ChannelAbandoned) && !state.is_abandoned() {
            debug!("👋 Un miembro volvió al canal de voz");
            if state.status.is_paused() {
                effects.push(Effect::Disarm);
                effects.push(Effect::Resume);
            } else if state.status == EngineStatus::Idle && state.queue.is_empty() {
                effects.push(Effect::Arm(TimerKind::QueueDrained));
            } else {
                effects.push(Effect::Disarm);
            }
        }
    }

    effects
}

/// Feeds engine and timer events into the player until it is torn down.
///
/// Holds only a weak reference so the task never keeps a discarded player alive.
pub(crate) async fn run(
    player: Weak<GuildPlayer>,
    mut engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    mut timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(event) = engine_rx.recv() => {
                let Some(player) = player.upgrade() else { break };
                player.handle_engine_event(event).await;
            }
            Some(fired) = timer_rx.recv() => {
                let Some(player) = player.upgrade() else { break };
                player.handle_timer(fired).await;
            }
            else => break,
        }
    }
    debug!("🛑 Router de eventos detenido");
}
