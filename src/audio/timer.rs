use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

/// Las dos clases de temporizador de salida. Nunca hay más de uno armado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The queue drained and the engine went idle.
    QueueDrained,
    /// Everybody but the bot left the voice channel.
    ChannelAbandoned,
}

/// Delivered to the player's router when a timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub token: u64,
}

#[derive(Debug)]
struct ArmedTimer {
    kind: TimerKind,
    token: u64,
    task: JoinHandle<()>,
}

/// Single-slot cancellable timer.
///
/// Arming replaces (and aborts) whatever was armed before. Each arm gets a fresh token; a
/// [`TimerFired`] only counts if [`LeaveTimer::claim`] still recognizes its token, so an event
/// that raced with a disarm is ignored.
#[derive(Debug)]
pub struct LeaveTimer {
    armed: Option<ArmedTimer>,
    next_token: u64,
    tx: mpsc::UnboundedSender<TimerFired>,
}

impl LeaveTimer {
    pub fn new(tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            armed: None,
            next_token: 0,
            tx,
        }
    }

    pub fn arm(&mut self, kind: TimerKind, after: Duration) -> u64 {
        self.disarm();

        self.next_token += 1;
        let token = self.next_token;
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(TimerFired { kind, token });
        });

        debug!("⏲️ Temporizador {:?} armado ({:?})", kind, after);
        self.armed = Some(ArmedTimer { kind, token, task });
        token
    }

    /// Cancels the armed timer, if any, and returns its kind.
    pub fn disarm(&mut self) -> Option<TimerKind> {
        let armed = self.armed.take()?;
        armed.task.abort();
        debug!("⏲️ Temporizador {:?} desarmado", armed.kind);
        Some(armed.kind)
    }

    pub fn armed(&self) -> Option<TimerKind> {
        self.armed.as_ref().map(|a| a.kind)
    }

    /// Accepts a fired event if it belongs to the currently armed timer, clearing the slot.
    pub fn claim(&mut self, fired: TimerFired) -> bool {
        match &self.armed {
            Some(armed) if armed.token == fired.token && armed.kind == fired.kind => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for LeaveTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
