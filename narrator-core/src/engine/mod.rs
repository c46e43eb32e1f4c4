//! Speech engine trait and types.
//!
//! An engine speaks one utterance at a time and reports progress
//! asynchronously through an [`EngineEvent`] channel handed to it at
//! initialization.

pub mod command;
pub mod mock;
pub mod timed;

pub use command::CommandEngine;
pub use mock::{EngineCall, MockEngine};
pub use timed::TimedEngine;

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

pub const MIN_SPEED: f32 = 0.1;
pub const MAX_SPEED: f32 = 3.0;
pub const MIN_PITCH: f32 = 0.1;
pub const MAX_PITCH: f32 = 2.0;

/// Speech rate and pitch multipliers (1.0 is the engine's normal voice).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechParams {
    /// Rate multiplier (0.1-3.0, default 1.0)
    pub speed: f32,
    /// Pitch multiplier (0.1-2.0, default 1.0)
    pub pitch: f32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
        }
    }
}

impl SpeechParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the speed, clamped to its range.
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = clamp_speed(speed);
        self
    }

    /// Set the pitch, clamped to its range.
    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = clamp_pitch(pitch);
        self
    }
}

pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

pub fn clamp_pitch(pitch: f32) -> f32 {
    if pitch.is_nan() {
        return 1.0;
    }
    pitch.clamp(MIN_PITCH, MAX_PITCH)
}

/// Identifies one utterance: the session generation it belongs to and the
/// segment it speaks. Callbacks carrying an outdated id are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceId {
    pub generation: u64,
    pub index: usize,
}

impl UtteranceId {
    pub fn new(generation: u64, index: usize) -> Self {
        Self { generation, index }
    }
}

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "utt-{}-{}", self.generation, self.index)
    }
}

/// Notifications from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Initialization finished; `false` means the engine is unusable
    Ready(bool),
    Started(UtteranceId),
    Done(UtteranceId),
    Error(UtteranceId),
}

/// Sending half of the engine event channel.
pub type EngineEvents = mpsc::UnboundedSender<EngineEvent>;

/// Speech engine trait - every synthesizer backend implements this.
///
/// All methods return immediately; outcomes arrive as [`EngineEvent`]s.
pub trait SpeechEngine: Send {
    /// Start initialization. Must eventually send exactly one `Ready` event.
    fn initialize(&mut self, events: EngineEvents);

    /// Speak `text`. With `flush_queue` any pending utterance is dropped first.
    fn speak(&mut self, text: &str, flush_queue: bool, id: UtteranceId);

    /// Abandon the current utterance. No `Done` is required for it.
    fn stop(&mut self);

    fn set_rate(&mut self, rate: f32);

    fn set_pitch(&mut self, pitch: f32);

    /// Engine name for display.
    fn name(&self) -> &'static str;
}

/// Supported engine types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// OS speech synthesizer run as a subprocess
    Command,
    /// Silent engine paced by estimated reading time
    Timed,
}

impl EngineKind {
    /// Parse engine kind from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "command" | "espeak" | "system" => Some(Self::Command),
            "timed" | "silent" => Some(Self::Timed),
            _ => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Timed => write!(f, "timed"),
        }
    }
}

/// Create a speech engine.
///
/// `program` names the synthesizer binary for [`EngineKind::Command`].
pub fn create_engine(kind: EngineKind, program: Option<&str>) -> Box<dyn SpeechEngine> {
    match kind {
        EngineKind::Command => Box::new(CommandEngine::new(
            program.unwrap_or(command::DEFAULT_PROGRAM),
        )),
        EngineKind::Timed => Box::new(TimedEngine::new()),
    }
}
