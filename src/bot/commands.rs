/// Canal fijo de Mixlr detrás del atajo `bbpm`.
pub const BBPM_STREAM: &str = "https://api.mixlr.com/v3/channel_view/thebbpm";

/// Argumento de `play`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayArg {
    /// No argument: resume a paused player.
    Resume,
    /// A number: pick a pending search result or a queue position.
    Pick(usize),
    /// A URL or free text.
    Query(String),
}

/// Text commands understood by the bot, after prefix and alias resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(PlayArg),
    Search(String),
    Pause,
    Resume,
    Stop,
    Clear,
    Shuffle,
    Skip,
    Previous,
    Queue(Option<usize>),
    NowPlaying,
    Leave,
    Ping,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Search(_) => "search",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::Clear => "clear",
            Command::Shuffle => "shuffle",
            Command::Skip => "skip",
            Command::Previous => "previous",
            Command::Queue(_) => "queue",
            Command::NowPlaying => "nowplaying",
            Command::Leave => "leave",
            Command::Ping => "ping",
        }
    }
}

/// Parses `content` if it starts with `prefix` and names a known command.
pub fn parse(content: &str, prefix: &str) -> Option<Command> {
    let rest = content.trim().strip_prefix(prefix)?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "play" | "p" => Command::Play(play_arg(arg)),
        "search" | "ps" => Command::Search(arg.to_string()),
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "stop" | "st" => Command::Stop,
        "clear" | "c" => Command::Clear,
        "shuffle" | "sh" => Command::Shuffle,
        "skip" | "s" => Command::Skip,
        "previous" | "prev" => Command::Previous,
        "queue" | "q" => Command::Queue(arg.parse().ok()),
        "nowplaying" | "np" => Command::NowPlaying,
        "leave" | "l" => Command::Leave,
        "ping" => Command::Ping,
        "bbpm" => Command::Play(PlayArg::Query(BBPM_STREAM.to_string())),
        _ => return None,
    };
    Some(command)
}

fn play_arg(arg: &str) -> PlayArg {
    if arg.is_empty() {
        PlayArg::Resume
    } else if let Ok(n) = arg.parse() {
        PlayArg::Pick(n)
    } else {
        PlayArg::Query(arg.to_string())
    }
}
