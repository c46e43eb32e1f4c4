//! narrate configuration management.

use anyhow::{Context, Result};
use narrator_core::engine::{EngineKind, clamp_pitch, clamp_speed};
use narrator_core::text::DEFAULT_MAX_SEGMENT_LEN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Shortest segment length the config accepts
pub const MIN_MAX_SEGMENT_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarratorConfig {
    /// Speech rate multiplier (0.1-3.0)
    #[serde(default = "default_one")]
    pub speed: f32,

    /// Pitch multiplier (0.1-2.0)
    #[serde(default = "default_one")]
    pub pitch: f32,

    /// Maximum characters per spoken segment
    #[serde(default = "default_max_segment_len")]
    pub max_segment_len: usize,

    /// Speech engine backend
    #[serde(default = "default_engine")]
    pub engine: EngineKind,

    /// Synthesizer binary for the command engine. None means espeak-ng.
    #[serde(default)]
    pub program: Option<String>,
}

fn default_one() -> f32 {
    1.0
}

fn default_max_segment_len() -> usize {
    DEFAULT_MAX_SEGMENT_LEN
}

fn default_engine() -> EngineKind {
    EngineKind::Command
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            speed: default_one(),
            pitch: default_one(),
            max_segment_len: default_max_segment_len(),
            engine: default_engine(),
            program: None,
        }
    }
}

impl NarratorConfig {
    /// Get the config file path: <config dir>/narrator/config.toml
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("Could not determine the config directory")?;
        Ok(dir.join("narrator").join("config.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: NarratorConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config.clamped())
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Bring every value into its supported range.
    pub fn clamped(mut self) -> Self {
        self.speed = clamp_speed(self.speed);
        self.pitch = clamp_pitch(self.pitch);
        self.max_segment_len = self.max_segment_len.max(MIN_MAX_SEGMENT_LEN);
        self
    }
}
