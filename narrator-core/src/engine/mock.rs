//! Mock speech engine for testing
//!
//! Records every call and lets tests decide when utterances start, finish
//! or fail.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{EngineEvent, EngineEvents, SpeechEngine, UtteranceId};

/// A call received by the mock engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Initialize,
    Speak {
        text: String,
        flush_queue: bool,
        id: UtteranceId,
    },
    Stop,
    SetRate(f32),
    SetPitch(f32),
}

#[derive(Default)]
struct MockState {
    calls: Vec<EngineCall>,
    events: Option<EngineEvents>,
}

/// A mock engine. Clones share state, so a test can keep one clone and hand
/// another to the player.
#[derive(Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    init_ok: bool,
    auto_complete: bool,
    failing: Arc<HashSet<usize>>,
}

impl MockEngine {
    /// Engine that initializes successfully and waits for manual events
    pub fn ready() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            init_ok: true,
            auto_complete: false,
            failing: Arc::new(HashSet::new()),
        }
    }

    /// Engine whose initialization fails
    pub fn failing_init() -> Self {
        Self {
            init_ok: false,
            ..Self::ready()
        }
    }

    /// Report `Started` and `Done` as soon as each utterance is spoken
    pub fn auto_complete(mut self) -> Self {
        self.auto_complete = true;
        self
    }

    /// Report `Error` instead of `Done` for the segment at `index`
    pub fn fail_segment(mut self, index: usize) -> Self {
        Arc::make_mut(&mut self.failing).insert(index);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver an event as if the engine had produced it.
    ///
    /// Returns false if the engine was never initialized or the receiver is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        match &self.lock().events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    /// Complete the most recent utterance.
    pub fn complete_current(&self) -> bool {
        match self.last_utterance() {
            Some(id) => self.emit(EngineEvent::Done(id)),
            None => false,
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    /// Texts passed to `speak`, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Speak { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_utterance(&self) -> Option<UtteranceId> {
        self.lock().calls.iter().rev().find_map(|call| match call {
            EngineCall::Speak { id, .. } => Some(*id),
            _ => None,
        })
    }

    pub fn stop_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, EngineCall::Stop))
            .count()
    }
}

impl SpeechEngine for MockEngine {
    fn initialize(&mut self, events: EngineEvents) {
        let _ = events.send(EngineEvent::Ready(self.init_ok));
        let mut state = self.lock();
        state.calls.push(EngineCall::Initialize);
        state.events = Some(events);
    }

    fn speak(&mut self, text: &str, flush_queue: bool, id: UtteranceId) {
        let mut state = self.lock();
        state.calls.push(EngineCall::Speak {
            text: text.to_string(),
            flush_queue,
            id,
        });

        if !self.auto_complete {
            return;
        }
        if let Some(events) = &state.events {
            let _ = events.send(EngineEvent::Started(id));
            let outcome = if self.failing.contains(&id.index) {
                EngineEvent::Error(id)
            } else {
                EngineEvent::Done(id)
            };
            let _ = events.send(outcome);
        }
    }

    fn stop(&mut self) {
        self.lock().calls.push(EngineCall::Stop);
    }

    fn set_rate(&mut self, rate: f32) {
        self.lock().calls.push(EngineCall::SetRate(rate));
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.lock().calls.push(EngineCall::SetPitch(pitch));
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_records_calls_across_clones() {
        let observer = MockEngine::ready();
        let mut engine = observer.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.initialize(tx);
        engine.set_rate(1.5);
        engine.speak("Hello.", true, UtteranceId::new(1, 0));
        engine.stop();

        assert_eq!(rx.try_recv().unwrap(), EngineEvent::Ready(true));
        assert_eq!(observer.spoken(), vec!["Hello."]);
        assert_eq!(observer.last_utterance(), Some(UtteranceId::new(1, 0)));
        assert_eq!(observer.stop_count(), 1);
        assert_eq!(observer.calls()[1], EngineCall::SetRate(1.5));
    }

    #[test]
    fn test_auto_complete_and_failures() {
        let mut engine = MockEngine::ready().auto_complete().fail_segment(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.initialize(tx);
        let _ = rx.try_recv();

        let ok = UtteranceId::new(1, 0);
        engine.speak("One.", true, ok);
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::Started(ok));
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::Done(ok));

        let bad = UtteranceId::new(1, 1);
        engine.speak("Two.", true, bad);
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::Started(bad));
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::Error(bad));
    }

    #[test]
    fn test_failing_init_reports_not_ready() {
        let mut engine = MockEngine::failing_init();
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.initialize(tx);
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::Ready(false));
    }

    #[test]
    fn test_emit_before_initialize_fails() {
        let engine = MockEngine::ready();
        assert!(!engine.emit(EngineEvent::Ready(true)));
        assert!(!engine.complete_current());
    }
}
