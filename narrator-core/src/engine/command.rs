//! OS speech synthesizer engine.
//!
//! Runs an espeak-compatible program as a subprocess per utterance, feeding
//! the text on stdin. Stopping kills the child.

use super::{EngineEvent, EngineEvents, SpeechEngine, UtteranceId};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Synthesizer looked up in PATH when none is configured.
pub const DEFAULT_PROGRAM: &str = "espeak-ng";

/// Words per minute at rate 1.0 (espeak's default).
const BASE_WORDS_PER_MINUTE: f32 = 175.0;
const MIN_WORDS_PER_MINUTE: f32 = 80.0;
const MAX_WORDS_PER_MINUTE: f32 = 500.0;
/// espeak pitch scale is 0-99 with 50 as the normal voice.
const BASE_PITCH: f32 = 50.0;

/// Engine backed by a speech synthesizer binary.
pub struct CommandEngine {
    program: String,
    path: Option<PathBuf>,
    events: Option<EngineEvents>,
    rate: f32,
    pitch: f32,
    current: Option<JoinHandle<()>>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            path: None,
            events: None,
            rate: 1.0,
            pitch: 1.0,
            current: None,
        }
    }

    /// Arguments for the current rate and pitch; text is read from stdin.
    fn args(&self) -> Vec<String> {
        vec![
            "-s".to_string(),
            words_per_minute(self.rate).to_string(),
            "-p".to_string(),
            espeak_pitch(self.pitch).to_string(),
            "--stdin".to_string(),
        ]
    }

    fn cancel_current(&mut self) {
        if let Some(task) = self.current.take() {
            task.abort();
        }
    }
}

fn words_per_minute(rate: f32) -> u32 {
    (BASE_WORDS_PER_MINUTE * rate)
        .clamp(MIN_WORDS_PER_MINUTE, MAX_WORDS_PER_MINUTE)
        .round() as u32
}

fn espeak_pitch(pitch: f32) -> u32 {
    (BASE_PITCH * pitch).clamp(0.0, 99.0).round() as u32
}

/// Run the synthesizer to completion for one utterance.
async fn synthesize(path: &Path, args: &[String], text: &str) -> std::io::Result<()> {
    let mut child = Command::new(path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(std::io::Error::other(format!(
            "synthesizer exited with {}",
            status
        )));
    }
    Ok(())
}

impl SpeechEngine for CommandEngine {
    fn initialize(&mut self, events: EngineEvents) {
        let ready = match which::which(&self.program) {
            Ok(path) => {
                info!("Speech synthesizer: {}", path.display());
                self.path = Some(path);
                true
            }
            Err(e) => {
                warn!("Speech synthesizer '{}' not found: {}", self.program, e);
                false
            }
        };
        let _ = events.send(EngineEvent::Ready(ready));
        self.events = Some(events);
    }

    fn speak(&mut self, text: &str, flush_queue: bool, id: UtteranceId) {
        let (Some(events), Some(path)) = (self.events.clone(), self.path.clone()) else {
            warn!("Synthesizer asked to speak {} before it was ready", id);
            return;
        };

        if !flush_queue && self.current.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Synthesizer replaces the utterance in progress with {}", id);
        }
        self.cancel_current();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let _ = events.send(EngineEvent::Error(id));
            return;
        };

        let args = self.args();
        let text = text.to_string();
        self.current = Some(runtime.spawn(async move {
            let _ = events.send(EngineEvent::Started(id));
            let event = match synthesize(&path, &args, &text).await {
                Ok(()) => EngineEvent::Done(id),
                Err(e) => {
                    warn!("Utterance {} failed: {}", id, e);
                    EngineEvent::Error(id)
                }
            };
            let _ = events.send(event);
        }));
    }

    fn stop(&mut self) {
        self.cancel_current();
    }

    fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch;
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

impl Drop for CommandEngine {
    fn drop(&mut self) {
        self.cancel_current();
    }
}
