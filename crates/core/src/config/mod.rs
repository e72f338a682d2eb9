use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{record::RecordingSettings, Result};

/// Top-level configuration structure for the player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sequencer: SequencerConfig,
    pub recording: RecordingSettings,
    pub audio: AudioConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads a config file, returning defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|err| {
            tracing::warn!(?path, %err, "failed to load config, using defaults");
            Self::default()
        })
    }
}

/// Tunables of the state sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Change applied by one fx-level up/down command.
    pub fx_step: f32,
    /// The fx offset stays within `-fx_offset_bound..=fx_offset_bound`.
    pub fx_offset_bound: f32,
    pub speed_step: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    /// State time after which randomizer mode moves on.
    pub randomizer_interval_seconds: f64,
    /// Fixed RNG seed; random when absent.
    pub seed: Option<u64>,
    /// Build every State's graph at startup to report broken ones early.
    pub preload_all: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            fx_step: 0.05,
            fx_offset_bound: 1.0,
            speed_step: 0.1,
            min_speed: 0.1,
            max_speed: 4.0,
            randomizer_interval_seconds: 30.0,
            seed: None,
            preload_all: false,
        }
    }
}

/// Configuration of the spectrum helper that feeds `sound;` modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 1024,
        }
    }
}
