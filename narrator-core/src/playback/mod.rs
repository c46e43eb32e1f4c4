//! Playback control: the session state machine and the player that runs it.

pub mod machine;
mod player;

pub use machine::{
    Effect, EngineReadiness, Input, Notice, PlaybackState, PlaybackStatus, Transition, step,
};
pub use player::{PlaybackSnapshot, Player, PlayerHandle, PlayerOptions};
