//! narrate - Read PDF and text documents aloud, one sentence at a time

mod config;
mod controls;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::NarratorConfig;
use controls::{Listeners, Outcome};
use narrator_core::engine::{EngineKind, SpeechParams, create_engine};
use narrator_core::extract::{DocumentLoader, extract_file};
use narrator_core::highlight::{SequentialLocator, Span};
use narrator_core::playback::{EngineReadiness, Player, PlayerOptions};
use narrator_core::text::{DEFAULT_CACHE_CAPACITY, Segment, split_segments};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "narrate")]
#[command(about = "Read PDF and text documents aloud with synchronized highlighting", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the PDF or text file
    file: Option<PathBuf>,

    /// Speech rate multiplier (0.1-3.0)
    #[arg(long)]
    speed: Option<f32>,

    /// Pitch multiplier (0.1-2.0)
    #[arg(long)]
    pitch: Option<f32>,

    /// Maximum characters per spoken segment
    #[arg(long)]
    max_segment: Option<usize>,

    /// Speech engine (command, timed)
    #[arg(long)]
    engine: Option<String>,

    /// Synthesizer binary for the command engine
    #[arg(long)]
    program: Option<String>,

    /// Segment number to start reading from
    #[arg(long)]
    from: Option<usize>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print how a document is split into spoken segments
    Segments {
        /// Path to the PDF or text file
        file: PathBuf,

        /// Maximum characters per segment
        #[arg(long)]
        max_segment: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default speed
    SetSpeed {
        /// Value (0.1-3.0)
        value: f32,
    },
    /// Set default pitch
    SetPitch {
        /// Value (0.1-2.0)
        value: f32,
    },
    /// Set maximum segment length
    SetMaxSegment {
        /// Characters per segment
        value: usize,
    },
    /// Set default speech engine
    SetEngine {
        /// Engine name (command, timed)
        name: String,
    },
    /// Set the synthesizer binary used by the command engine
    SetProgram {
        /// Binary name or path
        program: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    // Handle subcommands
    match &args.command {
        Some(Commands::Config { action }) => {
            return handle_config_command(action);
        }
        Some(Commands::Segments {
            file,
            max_segment,
            json,
        }) => {
            return print_segments(file, *max_segment, *json);
        }
        None => {}
    }

    let path = args
        .file
        .clone()
        .ok_or_else(|| anyhow::anyhow!("File path is required. Run 'narrate --help' for usage."))?;

    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }

    let config = NarratorConfig::load().context("Failed to load configuration")?;

    let engine_kind = match &args.engine {
        Some(name) => EngineKind::parse(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown engine: {}. Use command or timed.", name))?,
        None => config.engine,
    };
    let program = args.program.clone().or(config.program.clone());
    let params = SpeechParams::new()
        .with_speed(args.speed.unwrap_or(config.speed))
        .with_pitch(args.pitch.unwrap_or(config.pitch));
    let max_segment_len = args.max_segment.unwrap_or(config.max_segment_len);

    log::debug!(
        "File: {}, engine: {}, speed: {}, pitch: {}, max segment: {}",
        path.display(),
        engine_kind,
        params.speed,
        params.pitch,
        max_segment_len
    );

    eprintln!("Extracting text: {}", path.display());
    let loader = DocumentLoader::new();
    let document = loader
        .load(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    eprintln!("Words: ~{}", document.word_count());

    let segment_count = split_segments(&document.text, max_segment_len).len();
    let start = start_index(args.from, segment_count)?;

    let player = Player::spawn(
        create_engine(engine_kind, program.as_deref()),
        PlayerOptions {
            max_segment_len,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            params,
        },
    );

    if player.wait_ready().await != EngineReadiness::Ready {
        player.shutdown().await;
        anyhow::bail!(
            "Speech engine '{}' is unavailable. Install it or choose another with --engine.",
            engine_kind
        );
    }

    let listeners = Listeners::attach(&player);
    player.speak_from(document.text, start)?;

    let outcome = controls::run_interactive(&player, listeners).await?;
    player.shutdown().await;

    match outcome {
        Outcome::Finished => eprintln!("Done."),
        Outcome::Quit => {}
        Outcome::Stopped => anyhow::bail!("Playback stopped: the speech engine reported an error"),
        Outcome::EngineFailed => anyhow::bail!("Speech engine became unavailable"),
    }

    Ok(())
}

/// Convert a 1-based `--from` segment number into a start index.
fn start_index(from: Option<usize>, segment_count: usize) -> Result<usize> {
    match from {
        None => Ok(0),
        Some(n) if n >= 1 && n <= segment_count => Ok(n - 1),
        Some(n) => anyhow::bail!(
            "--from {} is out of range: the document has {} segments",
            n,
            segment_count
        ),
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

#[derive(Serialize)]
struct SegmentRow<'a> {
    #[serde(flatten)]
    segment: &'a Segment,
    span: Option<Span>,
}

fn print_segments(path: &Path, max_segment: Option<usize>, json: bool) -> Result<()> {
    let config = NarratorConfig::load().context("Failed to load configuration")?;
    let max_len = max_segment.unwrap_or(config.max_segment_len);

    let document =
        extract_file(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let segments = split_segments(&document.text, max_len);

    let mut locator = SequentialLocator::new(&document.text);
    let rows: Vec<SegmentRow> = segments
        .iter()
        .map(|segment| SegmentRow {
            segment,
            span: locator.next_span(&segment.text),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        let location = match row.span {
            Some(span) => format!("{}..{}", span.start, span.end),
            None => "-".to_string(),
        };
        println!("{:>5}  {:>12}  {}", row.segment.index + 1, location, row.segment.text);
    }
    eprintln!("Segments: {}", rows.len());

    Ok(())
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = NarratorConfig::load()?;
            println!("Configuration file: {:?}", NarratorConfig::config_path()?);
            println!();
            println!("speed = {}", config.speed);
            println!("pitch = {}", config.pitch);
            println!("max_segment_len = {}", config.max_segment_len);
            println!("engine = \"{}\"", config.engine);
            if let Some(program) = &config.program {
                println!("program = \"{}\"", program);
            } else {
                println!("program = (espeak-ng)");
            }
        }
        ConfigAction::SetSpeed { value } => {
            let mut config = NarratorConfig::load()?;
            config.speed = *value;
            config = config.clamped();
            config.save()?;
            println!("Default speed set to: {}", config.speed);
        }
        ConfigAction::SetPitch { value } => {
            let mut config = NarratorConfig::load()?;
            config.pitch = *value;
            config = config.clamped();
            config.save()?;
            println!("Default pitch set to: {}", config.pitch);
        }
        ConfigAction::SetMaxSegment { value } => {
            let mut config = NarratorConfig::load()?;
            config.max_segment_len = *value;
            config = config.clamped();
            config.save()?;
            println!("Maximum segment length set to: {}", config.max_segment_len);
        }
        ConfigAction::SetEngine { name } => {
            let kind = EngineKind::parse(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown engine: {}. Use command or timed.", name))?;
            let mut config = NarratorConfig::load()?;
            config.engine = kind;
            config.save()?;
            println!("Default engine set to: {}", kind);
        }
        ConfigAction::SetProgram { program } => {
            let mut config = NarratorConfig::load()?;
            config.program = Some(program.clone());
            config.save()?;
            println!("Synthesizer program set to: {}", program);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_index_defaults_to_first_segment() {
        assert_eq!(start_index(None, 5).unwrap(), 0);
        assert_eq!(start_index(None, 0).unwrap(), 0);
    }

    #[test]
    fn test_start_index_is_one_based() {
        assert_eq!(start_index(Some(1), 5).unwrap(), 0);
        assert_eq!(start_index(Some(5), 5).unwrap(), 4);
    }

    #[test]
    fn test_start_index_out_of_range() {
        assert!(start_index(Some(0), 5).is_err());
        let err = start_index(Some(6), 5).unwrap_err();
        assert!(err.to_string().contains("5 segments"));
    }
}
