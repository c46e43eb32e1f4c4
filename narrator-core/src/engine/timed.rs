//! Silent engine that paces utterances by estimated reading time.
//!
//! Useful for dry runs and for machines without a speech synthesizer: the
//! player behaves exactly as with real audio, segment by segment.

use super::{EngineEvent, EngineEvents, SpeechEngine, UtteranceId};
use log::{debug, warn};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Reading pace at rate 1.0.
pub const DEFAULT_WORDS_PER_MINUTE: f32 = 170.0;

pub struct TimedEngine {
    events: Option<EngineEvents>,
    words_per_minute: f32,
    rate: f32,
    current: Option<JoinHandle<()>>,
}

impl TimedEngine {
    pub fn new() -> Self {
        Self::with_pace(DEFAULT_WORDS_PER_MINUTE)
    }

    pub fn with_pace(words_per_minute: f32) -> Self {
        Self {
            events: None,
            words_per_minute: words_per_minute.max(1.0),
            rate: 1.0,
            current: None,
        }
    }

    fn cancel_current(&mut self) {
        if let Some(task) = self.current.take() {
            task.abort();
        }
    }
}

impl Default for TimedEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Time needed to read `text` aloud at `words_per_minute`.
pub fn estimate_duration(text: &str, words_per_minute: f32) -> Duration {
    let words = text.split_whitespace().count().max(1) as f32;
    Duration::from_secs_f32(words * 60.0 / words_per_minute.max(1.0))
}

impl SpeechEngine for TimedEngine {
    fn initialize(&mut self, events: EngineEvents) {
        let _ = events.send(EngineEvent::Ready(true));
        self.events = Some(events);
    }

    fn speak(&mut self, text: &str, flush_queue: bool, id: UtteranceId) {
        let Some(events) = self.events.clone() else {
            warn!("Timed engine asked to speak {} before initialization", id);
            return;
        };

        if !flush_queue && self.current.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Timed engine replaces the utterance in progress with {}", id);
        }
        self.cancel_current();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let _ = events.send(EngineEvent::Error(id));
            return;
        };

        let duration = estimate_duration(text, self.words_per_minute * self.rate);
        debug!("Timed engine: {} lasts {:?}", id, duration);

        self.current = Some(runtime.spawn(async move {
            let _ = events.send(EngineEvent::Started(id));
            tokio::time::sleep(duration).await;
            let _ = events.send(EngineEvent::Done(id));
        }));
    }

    fn stop(&mut self) {
        self.cancel_current();
    }

    fn set_rate(&mut self, rate: f32) {
        self.rate = rate.max(0.01);
    }

    fn set_pitch(&mut self, _pitch: f32) {}

    fn name(&self) -> &'static str {
        "timed"
    }
}

impl Drop for TimedEngine {
    fn drop(&mut self) {
        self.cancel_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_estimate_duration() {
        let d = estimate_duration("one two three four five six", 60.0);
        assert_eq!(d, Duration::from_secs(6));
        // Empty text still takes one word's time
        assert_eq!(estimate_duration("", 60.0), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_utterance_completes() {
        let mut engine = TimedEngine::with_pace(600.0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.initialize(tx);
        assert_eq!(rx.recv().await, Some(EngineEvent::Ready(true)));

        let id = UtteranceId::new(1, 0);
        engine.speak("A short line.", true, id);
        assert_eq!(rx.recv().await, Some(EngineEvent::Started(id)));
        assert_eq!(rx.recv().await, Some(EngineEvent::Done(id)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_suppresses_done() {
        let mut engine = TimedEngine::with_pace(60.0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.initialize(tx);
        let _ = rx.recv().await;

        let first = UtteranceId::new(1, 0);
        engine.speak("This takes a few seconds.", true, first);
        assert_eq!(rx.recv().await, Some(EngineEvent::Started(first)));
        engine.stop();

        let second = UtteranceId::new(2, 1);
        engine.speak("Next.", true, second);
        assert_eq!(rx.recv().await, Some(EngineEvent::Started(second)));
        assert_eq!(rx.recv().await, Some(EngineEvent::Done(second)));
    }
}
