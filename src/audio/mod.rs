//! # Audio Module
//!
//! Per-guild playback: one [`player::GuildPlayer`] per guild, owned by the
//! [`registry::PlayerRegistry`].
//!
//! ## Architecture
//!
//! ### [`player`] - Guild Player
//! - Owns the queue, the history and the voice connection of one guild
//! - Applies the effects decided by the router, never while holding its state lock
//!
//! ### [`router`] - Event Router
//! - Pure transitions from engine, timer and voice events to [`router::Effect`]s
//! - One task per player that serializes those events
//!
//! ### [`engine`] - Playback Engine
//! - The seam between the player and the voice backend
//! - [`songbird_engine`] implements it on top of songbird

pub mod engine;
pub mod error;
pub mod notice;
pub mod player;
pub mod queue;
pub mod registry;
pub mod router;
pub mod songbird_engine;
pub mod timer;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;
