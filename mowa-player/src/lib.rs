//! mowa-player: client-side synchronized playback.
//!
//! Drives the avatar presentation clock: an idle "breathing" loop between
//! turns and audio-locked frame advance while a reply plays, with smooth
//! transitions between the two. Also provides the reconnecting WebSocket
//! client that feeds it.

pub mod client;
pub mod player;

pub use client::{AvatarClient, ReconnectPolicy};
pub use player::{FrameSink, PlayerMode, RenderedFrame, SyncPlayer};
