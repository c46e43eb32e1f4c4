//! Player: drives the state machine against a speech engine.
//!
//! One tokio task owns the engine, the segmenter and the session. UI commands
//! and engine callbacks arrive on channels and are applied strictly in
//! order on that task, so the session needs no locking.

use super::machine::{
    Effect, EngineReadiness, Input, Notice, PlaybackState, PlaybackStatus, step,
};
use crate::engine::{EngineEvent, SpeechEngine, SpeechParams};
use crate::error::{PlaybackError, Result};
use crate::highlight::{Span, locate};
use crate::text::{DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_SEGMENT_LEN, Segmenter};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Capacity of the notice channel; slow subscribers lose the oldest notices.
const NOTICE_CAPACITY: usize = 32;

/// Options for a new player.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    /// Maximum segment length in characters
    pub max_segment_len: usize,
    /// Number of segmented documents kept in memory
    pub cache_capacity: usize,
    /// Initial speed and pitch
    pub params: SpeechParams,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            max_segment_len: DEFAULT_MAX_SEGMENT_LEN,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            params: SpeechParams::default(),
        }
    }
}

/// What the UI needs to render the control surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    pub engine: EngineReadiness,
    pub index: usize,
    pub segment_count: usize,
    /// Text of the active segment
    pub segment: Option<String>,
    /// Where the active segment sits in the document
    pub highlight: Option<Span>,
    pub speed: f32,
    pub pitch: f32,
    /// When the current document started playing
    pub started_at: Option<DateTime<Utc>>,
}

enum Command {
    Speak { text: String, start: usize },
    Pause,
    Resume,
    Stop,
    SeekTo(usize),
    SetSpeed(f32),
    SetPitch(f32),
    Shutdown,
}

/// Handle for controlling a running player.
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<PlaybackSnapshot>,
    notices: broadcast::Sender<Notice>,
    task: JoinHandle<()>,
}

impl PlayerHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::PlayerClosed)
    }

    /// Replace the document and start reading it from the top.
    pub fn speak(&self, text: impl Into<String>) -> Result<()> {
        self.speak_from(text, 0)
    }

    /// Replace the document and start reading at segment `start`.
    ///
    /// A `start` past the last segment is rejected with a
    /// [`Notice::SeekRejected`] and the previous document stays loaded.
    pub fn speak_from(&self, text: impl Into<String>, start: usize) -> Result<()> {
        self.send(Command::Speak {
            text: text.into(),
            start,
        })
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn seek_to(&self, index: usize) -> Result<()> {
        self.send(Command::SeekTo(index))
    }

    pub fn set_speed(&self, speed: f32) -> Result<()> {
        self.send(Command::SetSpeed(speed))
    }

    pub fn set_pitch(&self, pitch: f32) -> Result<()> {
        self.send(Command::SetPitch(pitch))
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every state change.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Wait until the engine has finished initializing.
    pub async fn wait_ready(&self) -> EngineReadiness {
        let mut snapshot = self.snapshot.clone();
        match snapshot
            .wait_for(|s| s.engine != EngineReadiness::Pending)
            .await
        {
            Ok(s) => s.engine,
            Err(_) => EngineReadiness::Failed,
        }
    }

    /// Stop playback and wait for the player task to end.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Player task ended abnormally: {}", e);
        }
    }
}

pub struct Player {
    engine: Box<dyn SpeechEngine>,
    segmenter: Segmenter,
    state: PlaybackState,
    document: Arc<str>,
    /// Bumped on every accepted document, keys the highlight cache
    document_serial: u64,
    highlight: Option<((u64, usize), Option<Span>)>,
    started_at: Option<DateTime<Utc>>,
    snapshot: watch::Sender<PlaybackSnapshot>,
    notices: broadcast::Sender<Notice>,
}

impl Player {
    /// Start a player task on the current tokio runtime.
    pub fn spawn(mut engine: Box<dyn SpeechEngine>, options: PlayerOptions) -> PlayerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        let state = PlaybackState::new(options.params);
        let (snapshot_tx, snapshot_rx) = watch::channel(initial_snapshot(&state));

        info!("Initializing speech engine '{}'", engine.name());
        engine.initialize(event_tx);

        let player = Player {
            engine,
            segmenter: Segmenter::new(options.max_segment_len, options.cache_capacity),
            state,
            document: Arc::from(""),
            document_serial: 0,
            highlight: None,
            started_at: None,
            snapshot: snapshot_tx,
            notices: notice_tx.clone(),
        };

        let task = tokio::spawn(player.run(command_rx, event_rx));

        PlayerHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            notices: notice_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        if self.state.status() == PlaybackStatus::Playing {
            self.engine.stop();
        }
        debug!("Player stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Speak { text, start } => self.speak(text, start),
            Command::Pause => self.apply(Input::Pause),
            Command::Resume => self.apply(Input::Resume),
            Command::Stop => self.apply(Input::Stop),
            Command::SeekTo(index) => self.apply(Input::SeekTo(index)),
            Command::SetSpeed(speed) => self.apply(Input::SetSpeed(speed)),
            Command::SetPitch(pitch) => self.apply(Input::SetPitch(pitch)),
            Command::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Started(id) => debug!("Utterance {} started", id),
            EngineEvent::Done(id) => debug!("Utterance {} done", id),
            EngineEvent::Error(id) => debug!("Utterance {} failed", id),
            EngineEvent::Ready(ok) => debug!("Engine ready: {}", ok),
        }
        self.apply(Input::Engine(event));
    }

    fn speak(&mut self, text: String, start: usize) {
        let segments = self.segmenter.segment(&text);
        let count = segments.len();

        if self.try_apply(Input::Load { segments, start }) {
            info!("Reading new document: {} segments from segment {}", count, start);
            self.document = Arc::from(text);
            self.document_serial += 1;
            self.started_at = Some(Utc::now());
            self.publish();
        }
    }

    fn apply(&mut self, input: Input) {
        if self.try_apply(input) {
            self.publish();
        }
    }

    /// Run one transition and its effects. Returns false if the input was rejected.
    fn try_apply(&mut self, input: Input) -> bool {
        match step(&self.state, input) {
            Ok(transition) => {
                self.state = transition.state;
                for effect in transition.effects {
                    self.perform(effect);
                }
                true
            }
            Err(PlaybackError::InvalidSeekTarget { index, len }) => {
                warn!("Rejected seek to segment {} of {}", index, len);
                self.notify(Notice::SeekRejected { index, len });
                false
            }
            Err(e) => {
                debug!("Ignored input: {}", e);
                false
            }
        }
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Speak { text, id } => self.engine.speak(&text, true, id),
            Effect::Halt => self.engine.stop(),
            Effect::ApplyRate(rate) => self.engine.set_rate(rate),
            Effect::ApplyPitch(pitch) => self.engine.set_pitch(pitch),
            Effect::Notify(notice) => self.notify(notice),
        }
    }

    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::EngineUnavailable => warn!("Speech engine unavailable"),
            Notice::PlaybackStopped => warn!("Speech engine error, playback stopped"),
            Notice::Finished => info!("Finished reading document"),
            Notice::SeekRejected { .. } => {}
        }
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    /// Highlight for the active segment, recomputed only when it changes.
    fn current_highlight(&mut self) -> Option<Span> {
        let segment = self.state.active_segment()?;
        let key = (self.document_serial, segment.index);

        if let Some((cached_key, span)) = self.highlight {
            if cached_key == key {
                return span;
            }
        }

        let span = locate(&self.document, segment.as_str());
        if span.is_none() {
            debug!("Segment {} not found verbatim in document", segment.index);
        }
        self.highlight = Some((key, span));
        span
    }

    fn publish(&mut self) {
        let highlight = self.current_highlight();
        let params = self.state.params();
        let snapshot = PlaybackSnapshot {
            status: self.state.status(),
            engine: self.state.engine(),
            index: self.state.index(),
            segment_count: self.state.segment_count(),
            segment: self.state.active_segment().map(|s| s.text.clone()),
            highlight,
            speed: params.speed,
            pitch: params.pitch,
            started_at: self.started_at,
        };
        self.snapshot.send_replace(snapshot);
    }
}

fn initial_snapshot(state: &PlaybackState) -> PlaybackSnapshot {
    let params = state.params();
    PlaybackSnapshot {
        status: state.status(),
        engine: state.engine(),
        index: state.index(),
        segment_count: 0,
        segment: None,
        highlight: None,
        speed: params.speed,
        pitch: params.pitch,
        started_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    async fn wait_until<F>(handle: &PlayerHandle, predicate: F) -> PlaybackSnapshot
    where
        F: Fn(&PlaybackSnapshot) -> bool,
    {
        let mut rx = handle.subscribe();
        timeout(WAIT, rx.wait_for(|s| predicate(s)))
            .await
            .expect("timed out waiting for player state")
            .expect("player closed")
            .clone()
    }

    async fn next_notice(rx: &mut broadcast::Receiver<Notice>) -> Notice {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for notice")
            .expect("notice channel closed")
    }

    fn spawn(engine: &MockEngine) -> PlayerHandle {
        Player::spawn(Box::new(engine.clone()), PlayerOptions::default())
    }

    #[tokio::test]
    async fn test_reads_document_to_the_end() {
        let engine = MockEngine::ready().auto_complete();
        let handle = spawn(&engine);
        let mut notices = handle.notices();
        assert_eq!(handle.wait_ready().await, EngineReadiness::Ready);

        handle.speak("Hello world. This is a test.").unwrap();
        assert_eq!(next_notice(&mut notices).await, Notice::Finished);

        let snapshot = wait_until(&handle, |s| {
            s.status == PlaybackStatus::Idle && s.segment_count == 2
        })
        .await;
        assert_eq!(snapshot.index, 0);
        assert!(snapshot.started_at.is_some());
        assert_eq!(engine.spoken(), vec!["Hello world.", "This is a test."]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_snapshot_highlights_active_segment() {
        let engine = MockEngine::ready();
        let handle = spawn(&engine);
        handle.wait_ready().await;

        handle.speak("Hello world. This is a test.").unwrap();
        let snapshot = wait_until(&handle, |s| s.status == PlaybackStatus::Playing).await;
        assert_eq!(snapshot.segment.as_deref(), Some("Hello world."));
        assert_eq!(snapshot.highlight, Some(Span { start: 0, end: 12 }));

        assert!(engine.complete_current());
        let snapshot = wait_until(&handle, |s| s.index == 1).await;
        assert_eq!(snapshot.highlight, Some(Span { start: 13, end: 28 }));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_completion_after_stop_is_ignored() {
        let engine = MockEngine::ready();
        let handle = spawn(&engine);
        handle.wait_ready().await;

        handle.speak("One. Two. Three.").unwrap();
        wait_until(&handle, |s| s.status == PlaybackStatus::Playing).await;
        let stale = engine.last_utterance().unwrap();

        handle.stop().unwrap();
        wait_until(&handle, |s| s.status == PlaybackStatus::Idle).await;

        assert!(engine.emit(EngineEvent::Done(stale)));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Idle);
        assert_eq!(snapshot.index, 0);
        assert_eq!(engine.spoken().len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_resume_respeaks_segment() {
        let engine = MockEngine::ready();
        let handle = spawn(&engine);
        handle.wait_ready().await;

        handle.speak("First. Second.").unwrap();
        wait_until(&handle, |s| s.status == PlaybackStatus::Playing).await;
        handle.pause().unwrap();
        wait_until(&handle, |s| s.status == PlaybackStatus::Paused).await;
        assert_eq!(engine.stop_count(), 1);

        handle.resume().unwrap();
        wait_until(&handle, |s| s.status == PlaybackStatus::Playing).await;
        assert_eq!(engine.spoken(), vec!["First.", "First."]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_engine_makes_operations_noops() {
        let engine = MockEngine::failing_init();
        let handle = spawn(&engine);
        let mut notices = handle.notices();

        assert_eq!(handle.wait_ready().await, EngineReadiness::Failed);
        assert_eq!(next_notice(&mut notices).await, Notice::EngineUnavailable);

        handle.speak("Nothing will be said.").unwrap();
        handle.set_speed(2.0).unwrap();
        let snapshot = wait_until(&handle, |s| s.speed == 2.0).await;
        assert_eq!(snapshot.status, PlaybackStatus::Idle);
        assert_eq!(snapshot.segment_count, 0);
        assert!(engine.spoken().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_seek_reports_and_keeps_state() {
        let engine = MockEngine::ready();
        let handle = spawn(&engine);
        let mut notices = handle.notices();
        handle.wait_ready().await;

        handle.speak("One. Two.").unwrap();
        let before = wait_until(&handle, |s| s.status == PlaybackStatus::Playing).await;

        handle.seek_to(5).unwrap();
        assert_eq!(
            next_notice(&mut notices).await,
            Notice::SeekRejected { index: 5, len: 2 }
        );
        assert_eq!(handle.snapshot(), before);
        assert_eq!(engine.spoken().len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_speak_from_starts_mid_document() {
        let engine = MockEngine::ready();
        let handle = spawn(&engine);
        handle.wait_ready().await;

        handle.speak_from("One. Two. Three.", 1).unwrap();
        let snapshot = wait_until(&handle, |s| {
            s.status == PlaybackStatus::Playing && s.segment_count == 3
        })
        .await;

        assert_eq!(snapshot.index, 1);
        assert_eq!(snapshot.segment.as_deref(), Some("Two."));
        assert_eq!(engine.spoken(), vec!["Two.".to_string()]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_speak_from_past_end_is_reported() {
        let engine = MockEngine::ready();
        let handle = spawn(&engine);
        let mut notices = handle.notices();
        handle.wait_ready().await;

        handle.speak_from("One. Two.", 9).unwrap();
        assert_eq!(
            next_notice(&mut notices).await,
            Notice::SeekRejected { index: 9, len: 2 }
        );
        assert!(engine.spoken().is_empty());
        assert_eq!(handle.snapshot().segment_count, 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_engine_error_stops_playback() {
        let engine = MockEngine::ready().auto_complete().fail_segment(1);
        let handle = spawn(&engine);
        let mut notices = handle.notices();
        handle.wait_ready().await;

        handle.speak("One. Two. Three.").unwrap();
        assert_eq!(next_notice(&mut notices).await, Notice::PlaybackStopped);

        let snapshot = wait_until(&handle, |s| {
            s.status == PlaybackStatus::Idle && s.segment_count == 3
        })
        .await;
        assert_eq!(snapshot.index, 0);
        // No retry, and the third segment is never reached
        assert_eq!(engine.spoken(), vec!["One.", "Two."]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_speed_is_clamped_and_applied() {
        let engine = MockEngine::ready();
        let handle = spawn(&engine);
        handle.wait_ready().await;

        handle.set_speed(4.0).unwrap();
        let snapshot = wait_until(&handle, |s| s.speed == 3.0).await;
        assert_eq!(snapshot.speed, 3.0);

        handle.set_pitch(0.0).unwrap();
        wait_until(&handle, |s| s.pitch == 0.1).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_blank_text_keeps_previous_document() {
        let engine = MockEngine::ready();
        let handle = spawn(&engine);
        handle.wait_ready().await;

        handle.speak("Keep me.").unwrap();
        wait_until(&handle, |s| s.status == PlaybackStatus::Playing).await;
        handle.speak("   ").unwrap();
        handle.pause().unwrap();

        let snapshot = wait_until(&handle, |s| s.status == PlaybackStatus::Paused).await;
        assert_eq!(snapshot.segment.as_deref(), Some("Keep me."));
        assert_eq!(engine.spoken(), vec!["Keep me."]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_player_rejects_commands() {
        let engine = MockEngine::ready();
        let handle = spawn(&engine);
        handle.wait_ready().await;

        let commands = handle.commands.clone();
        let closed = PlayerHandle {
            commands,
            snapshot: handle.subscribe(),
            notices: handle.notices.clone(),
            task: tokio::spawn(async {}),
        };
        handle.shutdown().await;
        assert_eq!(closed.pause(), Err(PlaybackError::PlayerClosed));
    }
}
