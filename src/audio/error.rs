use thiserror::Error;

/// Failures returned synchronously to the command layer.
///
/// Every variant except [`PlayerError::Connect`] is a precondition violation the user can
/// act on; none of them is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("Debes estar en un canal de voz")]
    NoVoiceChannel,

    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("La cola está vacía")]
    QueueEmpty,

    #[error("No estoy reproduciendo música")]
    NotPlaying,

    #[error("El reproductor no está en un estado válido para esa acción")]
    InvalidState,

    #[error("El número de canción '{0}' no es válido")]
    InvalidIndex(usize),

    #[error("No hay una canción anterior")]
    HistoryEmpty,

    #[error("No se pudo reproducir {title}: {reason}")]
    TrackUnavailable { title: String, reason: String },

    #[error("El reproductor se cerró")]
    Closed,

    #[error("Error al conectar al canal de voz: {0}")]
    Connect(String),
}

pub type PlayerResult<T> = Result<T, PlayerError>;
