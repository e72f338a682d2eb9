//! Persistence of per-State fx levels.
//!
//! File layout:
//!
//! ```json
//! { "version": 1, "states": { "<state name>": { "<level>": 1.0 } } }
//! ```
//!
//! States are keyed by name so levels survive edits of the graph itself.
//! Loading is lenient: unknown States, non-numeric values and a missing file
//! are skipped rather than treated as errors.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{state::StateCollection, Result};

/// File name used inside the preferences directory.
pub const FX_LEVELS_FILE: &str = "fx_levels.json";

const FX_FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct FxLevelsFile {
    version: u32,
    states: BTreeMap<String, BTreeMap<String, f32>>,
}

/// Applies stored levels to `states`. Returns how many levels were applied.
pub fn fx_load(states: &mut StateCollection, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(?path, "no fx levels stored yet");
        return Ok(0);
    }

    let content = fs::read_to_string(path)?;
    let root: serde_json::Value = serde_json::from_str(&content)?;
    let Some(stored) = root.get("states").and_then(|states| states.as_object()) else {
        tracing::warn!(?path, "fx levels file has no `states` table");
        return Ok(0);
    };

    let mut applied = 0;
    for (state_name, levels) in stored {
        let Some(state) = states.by_name_mut(state_name) else {
            tracing::debug!(state = %state_name, "ignoring fx levels for unknown state");
            continue;
        };
        let Some(levels) = levels.as_object() else {
            tracing::warn!(state = %state_name, "fx levels entry is not a table");
            continue;
        };
        for (level, value) in levels {
            match value.as_f64() {
                Some(value) => {
                    state.set_fx_level(level, value as f32);
                    applied += 1;
                }
                None => tracing::warn!(state = %state_name, %level, "fx level is not a number"),
            }
        }
    }

    tracing::info!(?path, applied, "loaded fx levels");
    Ok(applied)
}

/// Writes the current levels of every State.
pub fn fx_save(states: &StateCollection, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = FxLevelsFile {
        version: FX_FILE_VERSION,
        states: states
            .iter()
            .map(|state| (state.name().to_string(), state.fx_levels().clone()))
            .collect(),
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    tracing::info!(?path, states = file.states.len(), "saved fx levels");
    Ok(())
}
