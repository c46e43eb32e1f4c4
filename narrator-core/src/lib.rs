//! narrator-core: read documents aloud one sentence at a time.
//!
//! Text is split into speakable [`Segment`]s, spoken through a
//! [`SpeechEngine`] by a [`Player`], and each active segment is located in
//! the source document for highlighting.

pub mod engine;
pub mod error;
pub mod extract;
pub mod highlight;
pub mod playback;
pub mod text;

pub use engine::{EngineKind, SpeechEngine, SpeechParams, create_engine};
pub use error::{ExtractError, PlaybackError};
pub use extract::{Document, DocumentLoader};
pub use highlight::{SequentialLocator, Span, locate};
pub use playback::{Notice, PlaybackSnapshot, PlaybackStatus, Player, PlayerHandle, PlayerOptions};
pub use text::{Segment, Segmenter, split_segments};
