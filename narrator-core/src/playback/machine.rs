//! Playback state machine.
//!
//! [`step`] is a pure function from the current state and one input to the
//! next state plus the effects the caller must carry out. It never touches
//! the engine itself, so every transition can be tested without one.

use crate::engine::{EngineEvent, SpeechParams, UtteranceId, clamp_pitch, clamp_speed};
use crate::error::PlaybackError;
use crate::text::Segment;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
}

/// Whether the speech engine can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineReadiness {
    Pending,
    Ready,
    Failed,
}

/// Inputs accepted by the state machine.
#[derive(Debug, Clone)]
pub enum Input {
    /// Start speaking a new segment sequence at segment `start`
    Load {
        segments: Arc<[Segment]>,
        start: usize,
    },
    Pause,
    Resume,
    Stop,
    SeekTo(usize),
    SetSpeed(f32),
    SetPitch(f32),
    Engine(EngineEvent),
}

/// Messages for the UI side-channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// The engine failed to initialize; playback controls should be disabled
    EngineUnavailable,
    /// The engine reported an error mid-utterance
    PlaybackStopped,
    /// The last segment finished
    Finished,
    SeekRejected { index: usize, len: usize },
}

/// Work the caller must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Speak { text: String, id: UtteranceId },
    Halt,
    ApplyRate(f32),
    ApplyPitch(f32),
    Notify(Notice),
}

/// State of one playback session.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    engine: EngineReadiness,
    segments: Arc<[Segment]>,
    index: usize,
    status: PlaybackStatus,
    params: SpeechParams,
    generation: u64,
}

impl PlaybackState {
    pub fn new(params: SpeechParams) -> Self {
        Self {
            engine: EngineReadiness::Pending,
            segments: Arc::from(Vec::new()),
            index: 0,
            status: PlaybackStatus::Idle,
            params: SpeechParams::new()
                .with_speed(params.speed)
                .with_pitch(params.pitch),
            generation: 0,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn params(&self) -> SpeechParams {
        self.params
    }

    pub fn engine(&self) -> EngineReadiness {
        self.engine
    }

    pub fn is_ready(&self) -> bool {
        self.engine == EngineReadiness::Ready
    }

    pub fn segments(&self) -> &Arc<[Segment]> {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The segment being spoken or waiting to resume.
    pub fn active_segment(&self) -> Option<&Segment> {
        match self.status {
            PlaybackStatus::Idle => None,
            _ => self.segments.get(self.index),
        }
    }

    /// An id is current only if it belongs to the live utterance.
    fn is_current(&self, id: UtteranceId) -> bool {
        self.status == PlaybackStatus::Playing
            && id.generation == self.generation
            && id.index == self.index
    }

    /// Start a new utterance for the segment at the current index.
    fn utter(&mut self) -> Effect {
        self.generation += 1;
        Effect::Speak {
            text: self.segments[self.index].text.clone(),
            id: UtteranceId::new(self.generation, self.index),
        }
    }

    fn go_idle(&mut self) {
        self.status = PlaybackStatus::Idle;
        self.index = 0;
        self.generation += 1;
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(SpeechParams::default())
    }
}

/// Result of a successful step.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: PlaybackState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: &PlaybackState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }
}

/// Apply `input` to `state`.
///
/// On error the input is rejected and `state` remains the current state.
pub fn step(state: &PlaybackState, input: Input) -> Result<Transition, PlaybackError> {
    let mut next = state.clone();
    let mut effects = Vec::new();
    let gated = !matches!(
        input,
        Input::SetSpeed(_) | Input::SetPitch(_) | Input::Engine(_)
    );

    if gated && !state.is_ready() {
        return Err(PlaybackError::EngineNotInitialized);
    }

    match input {
        Input::SetSpeed(speed) => {
            next.params.speed = clamp_speed(speed);
            if next.is_ready() {
                effects.push(Effect::ApplyRate(next.params.speed));
            }
        }
        Input::SetPitch(pitch) => {
            next.params.pitch = clamp_pitch(pitch);
            if next.is_ready() {
                effects.push(Effect::ApplyPitch(next.params.pitch));
            }
        }
        Input::Load { segments, start } => {
            if segments.is_empty() {
                return Err(PlaybackError::EmptyInput);
            }
            if start >= segments.len() {
                return Err(PlaybackError::InvalidSeekTarget {
                    index: start,
                    len: segments.len(),
                });
            }
            if state.status == PlaybackStatus::Playing {
                effects.push(Effect::Halt);
            }
            next.segments = segments;
            next.index = start;
            next.status = PlaybackStatus::Playing;
            effects.push(Effect::ApplyRate(next.params.speed));
            effects.push(Effect::ApplyPitch(next.params.pitch));
            effects.push(next.utter());
        }
        Input::Pause => {
            if state.status != PlaybackStatus::Playing {
                return Ok(Transition::unchanged(state));
            }
            next.status = PlaybackStatus::Paused;
            next.generation += 1;
            effects.push(Effect::Halt);
        }
        Input::Resume => {
            if state.status != PlaybackStatus::Paused {
                return Ok(Transition::unchanged(state));
            }
            next.status = PlaybackStatus::Playing;
            effects.push(next.utter());
        }
        Input::Stop => {
            if state.status == PlaybackStatus::Playing {
                effects.push(Effect::Halt);
            }
            next.go_idle();
        }
        Input::SeekTo(index) => {
            let len = state.segments.len();
            if index >= len {
                return Err(PlaybackError::InvalidSeekTarget { index, len });
            }
            next.index = index;
            match state.status {
                PlaybackStatus::Playing => {
                    effects.push(Effect::Halt);
                    effects.push(next.utter());
                }
                // Cue the target so resume starts there
                PlaybackStatus::Idle => next.status = PlaybackStatus::Paused,
                PlaybackStatus::Paused => {}
            }
        }
        Input::Engine(event) => return Ok(on_engine_event(state, event)),
    }

    Ok(Transition { state: next, effects })
}

fn on_engine_event(state: &PlaybackState, event: EngineEvent) -> Transition {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match event {
        EngineEvent::Ready(true) => {
            next.engine = EngineReadiness::Ready;
            effects.push(Effect::ApplyRate(next.params.speed));
            effects.push(Effect::ApplyPitch(next.params.pitch));
        }
        EngineEvent::Ready(false) => {
            next.engine = EngineReadiness::Failed;
            effects.push(Effect::Notify(Notice::EngineUnavailable));
        }
        EngineEvent::Started(_) => return Transition::unchanged(state),
        EngineEvent::Done(id) => {
            if !state.is_current(id) {
                return Transition::unchanged(state);
            }
            if state.index + 1 < state.segments.len() {
                next.index += 1;
                effects.push(next.utter());
            } else {
                next.go_idle();
                effects.push(Effect::Notify(Notice::Finished));
            }
        }
        EngineEvent::Error(id) => {
            if !state.is_current(id) {
                return Transition::unchanged(state);
            }
            next.go_idle();
            effects.push(Effect::Notify(Notice::PlaybackStopped));
        }
    }

    Transition { state: next, effects }
}
