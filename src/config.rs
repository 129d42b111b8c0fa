use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

use crate::audio::player::PlayerSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Cola e historial
    pub max_queue_size: usize,
    pub max_history_size: usize,

    // Temporizadores
    pub idle_timeout: Duration,
    pub abandon_timeout: Duration,

    // Reintentos
    pub max_replay_retries: u8,
    pub retry_backoff: Duration,

    // Mensajes
    pub queue_preview_len: usize,
    pub queue_message_budget: usize,
    pub search_results: usize,

    // Herramientas externas
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, applying defaults for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            command_prefix: var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            max_queue_size: parse_or(var("MAX_QUEUE_SIZE"), "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_history_size: parse_or(
                var("MAX_HISTORY_SIZE"),
                "MAX_HISTORY_SIZE",
                defaults.max_history_size,
            )?,

            idle_timeout: duration_or(var("IDLE_TIMEOUT"), "IDLE_TIMEOUT", defaults.idle_timeout)?,
            abandon_timeout: duration_or(
                var("ABANDON_TIMEOUT"),
                "ABANDON_TIMEOUT",
                defaults.abandon_timeout,
            )?,

            max_replay_retries: parse_or(
                var("MAX_REPLAY_RETRIES"),
                "MAX_REPLAY_RETRIES",
                defaults.max_replay_retries,
            )?,
            retry_backoff: duration_or(var("RETRY_BACKOFF"), "RETRY_BACKOFF", defaults.retry_backoff)?,

            queue_preview_len: parse_or(
                var("QUEUE_PREVIEW_LEN"),
                "QUEUE_PREVIEW_LEN",
                defaults.queue_preview_len,
            )?,
            queue_message_budget: parse_or(
                var("QUEUE_MESSAGE_BUDGET"),
                "QUEUE_MESSAGE_BUDGET",
                defaults.queue_message_budget,
            )?,
            search_results: parse_or(var("SEARCH_RESULTS"), "SEARCH_RESULTS", defaults.search_results)?,

            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.idle_timeout.is_zero() || self.abandon_timeout.is_zero() {
            anyhow::bail!("Leave timeouts must be greater than 0");
        }

        if self.search_results == 0 || self.search_results > 25 {
            anyhow::bail!(
                "Search results must be between 1 and 25, got: {}",
                self.search_results
            );
        }

        if self.queue_message_budget < 200 || self.queue_message_budget > 4000 {
            anyhow::bail!(
                "Queue message budget must fit in a Discord message (200-4000), got: {}",
                self.queue_message_budget
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging, without the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: '{}'\n  \
            Queue: {} max, {} history\n  \
            Timeouts: idle {}, abandon {}\n  \
            Retries: {} x {}\n  \
            yt-dlp: {}",
            self.command_prefix,
            self.max_queue_size,
            self.max_history_size,
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.abandon_timeout),
            self.max_replay_retries,
            humantime::format_duration(self.retry_backoff),
            self.ytdlp_path,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        let player = PlayerSettings::default();
        Self {
            discord_token: String::new(),
            command_prefix: "-".to_string(),
            max_queue_size: player.max_queue_size,
            max_history_size: player.max_history_size,
            idle_timeout: player.idle_timeout,
            abandon_timeout: player.abandon_timeout,
            max_replay_retries: player.max_replay_retries,
            retry_backoff: player.retry_backoff,
            queue_preview_len: player.queue_preview_len,
            queue_message_budget: player.queue_message_budget,
            search_results: 5,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            max_history_size: config.max_history_size,
            idle_timeout: config.idle_timeout,
            abandon_timeout: config.abandon_timeout,
            max_replay_retries: config.max_replay_retries,
            retry_backoff: config.retry_backoff,
            queue_preview_len: config.queue_preview_len,
            queue_message_budget: config.queue_message_budget,
        }
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} inválido: '{raw}'")),
        None => Ok(default),
    }
}

fn duration_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match value {
        Some(raw) => humantime::parse_duration(raw.trim())
            .with_context(|| format!("{key} inválido: '{raw}'")),
        None => Ok(default),
    }
}
