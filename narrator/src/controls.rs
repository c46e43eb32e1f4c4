//! Interactive playback controls read from stdin.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use narrator_core::playback::{Notice, PlaybackSnapshot, PlaybackStatus, PlayerHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

/// Step applied by the speed and pitch keys
const ADJUST_STEP: f32 = 0.1;

pub const HELP: &str = "Controls: p pause, r resume, s stop, n next, b back, g N go to segment, \
+/- speed, u/d pitch, q quit";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    Pause,
    Resume,
    Stop,
    Next,
    Back,
    Goto(usize),
    Faster,
    Slower,
    PitchUp,
    PitchDown,
    Help,
    Quit,
}

/// Parse one line of user input. Segment numbers are 1-based.
pub fn parse_control(line: &str) -> Option<Control> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    let argument = parts.next();

    let control = match (command, argument) {
        ("p", None) => Control::Pause,
        ("r", None) => Control::Resume,
        ("s", None) => Control::Stop,
        ("n", None) => Control::Next,
        ("b", None) => Control::Back,
        ("g", Some(n)) => {
            let n: usize = n.parse().ok()?;
            Control::Goto(n.checked_sub(1)?)
        }
        ("+", None) => Control::Faster,
        ("-", None) => Control::Slower,
        ("u", None) => Control::PitchUp,
        ("d", None) => Control::PitchDown,
        ("h" | "?", None) => Control::Help,
        ("q", None) => Control::Quit,
        _ => return None,
    };

    if parts.next().is_some() {
        return None;
    }
    Some(control)
}

/// Forward a control to the player. Returns false when the user asked to quit.
pub fn apply_control(player: &PlayerHandle, control: Control) -> Result<bool> {
    let current = player.snapshot();

    match control {
        Control::Pause => player.pause()?,
        Control::Resume => player.resume()?,
        Control::Stop => player.stop()?,
        Control::Next => player.seek_to(current.index + 1)?,
        Control::Back => player.seek_to(current.index.saturating_sub(1))?,
        Control::Goto(index) => player.seek_to(index)?,
        Control::Faster => player.set_speed(current.speed + ADJUST_STEP)?,
        Control::Slower => player.set_speed(current.speed - ADJUST_STEP)?,
        Control::PitchUp => player.set_pitch(current.pitch + ADJUST_STEP)?,
        Control::PitchDown => player.set_pitch(current.pitch - ADJUST_STEP)?,
        Control::Help => eprintln!("{}", HELP),
        Control::Quit => return Ok(false),
    }

    Ok(true)
}

/// How the interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    Stopped,
    EngineFailed,
    Quit,
}

/// Player receivers taken before the document is handed over, so no
/// notice sent while it starts is missed.
pub struct Listeners {
    snapshots: watch::Receiver<PlaybackSnapshot>,
    notices: broadcast::Receiver<Notice>,
}

impl Listeners {
    pub fn attach(player: &PlayerHandle) -> Self {
        Self {
            snapshots: player.subscribe(),
            notices: player.notices(),
        }
    }
}

/// Run the control loop until the document finishes or the user quits.
pub async fn run_interactive(player: &PlayerHandle, listeners: Listeners) -> Result<Outcome> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let Listeners {
        mut snapshots,
        mut notices,
    } = listeners;
    let mut stdin_open = true;

    let initial = player.snapshot();
    let pb = ProgressBar::new(initial.segment_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    eprintln!("{}", HELP);

    let mut last_shown: Option<(usize, usize)> = None;

    let outcome = loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_control(&line) {
                    Some(control) => {
                        if !apply_control(player, control)? {
                            break Outcome::Quit;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => pb.println(format!("Unknown command: {}", line.trim())),
                },
                Ok(None) => {
                    debug!("stdin closed; controls disabled");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break Outcome::Stopped;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                render(&pb, &snapshot, &mut last_shown);
            }
            notice = notices.recv() => match notice {
                Ok(Notice::Finished) => break Outcome::Finished,
                Ok(Notice::PlaybackStopped) => break Outcome::Stopped,
                Ok(Notice::EngineUnavailable) => break Outcome::EngineFailed,
                Ok(Notice::SeekRejected { index, len }) => {
                    pb.println(format!("No segment {} (document has {})", index + 1, len));
                }
                Err(RecvError::Lagged(skipped)) => debug!("Missed {} notices", skipped),
                Err(RecvError::Closed) => break Outcome::Stopped,
            },
        }
    };

    match outcome {
        Outcome::Finished => pb.finish_with_message("Finished"),
        _ => pb.abandon(),
    }

    Ok(outcome)
}

/// Update the progress bar and print each newly active segment once.
fn render(pb: &ProgressBar, snapshot: &PlaybackSnapshot, last_shown: &mut Option<(usize, usize)>) {
    pb.set_length(snapshot.segment_count as u64);
    pb.set_position(snapshot.index as u64);
    pb.set_message(format!(
        "{} speed {:.1} pitch {:.1}",
        status_label(snapshot.status),
        snapshot.speed,
        snapshot.pitch
    ));

    if snapshot.status != PlaybackStatus::Playing {
        return;
    }

    let key = (snapshot.index, snapshot.segment_count);
    if *last_shown == Some(key) {
        return;
    }
    *last_shown = Some(key);

    if let Some(segment) = &snapshot.segment {
        let location = match snapshot.highlight {
            Some(span) => format!("@{}..{}", span.start, span.end),
            None => "@?".to_string(),
        };
        pb.println(format!(
            "[{}/{} {}] {}",
            snapshot.index + 1,
            snapshot.segment_count,
            location,
            segment
        ));
    }
}

fn status_label(status: PlaybackStatus) -> &'static str {
    match status {
        PlaybackStatus::Idle => "stopped",
        PlaybackStatus::Playing => "playing",
        PlaybackStatus::Paused => "paused",
    }
}
