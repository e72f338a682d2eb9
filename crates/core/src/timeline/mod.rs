use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    pub time_seconds: f64,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    pub fn advance(&mut self, delta: f64) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }
}

/// A scripted point at which the sequencer reconsiders the active State.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub time: f64,
    /// State index to select. `None` means pick one at random.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<i64>,
}

impl Boundary {
    pub fn new(time: f64, preset: Option<i64>) -> Self {
        Self { time, preset }
    }
}

/// What the sequencer should do when a boundary is crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineCue {
    Preset(usize),
    Random,
}

#[derive(Debug, Default, Serialize)]
struct TimelineFile {
    boundaries: Vec<Boundary>,
}

/// Ordered list of boundaries, consumed one at a time.
#[derive(Debug, Default, Clone)]
pub struct Timeline {
    boundaries: Vec<Boundary>,
    next: usize,
}

impl Timeline {
    pub fn new(mut boundaries: Vec<Boundary>) -> Self {
        boundaries.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            boundaries,
            next: 0,
        }
    }

    /// Parses a timeline file record by record.
    ///
    /// Records without a numeric `time` are skipped. A `preset` that is not
    /// an integer (integral floats such as `1.0` are accepted) is dropped, so
    /// that boundary randomizes. Only invalid JSON fails the whole file.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let root: serde_json::Value = serde_json::from_str(json)?;
        let records: &[serde_json::Value] = match &root {
            serde_json::Value::Array(records) => records.as_slice(),
            other => match other.get("boundaries").and_then(|b| b.as_array()) {
                Some(records) => records.as_slice(),
                None => {
                    tracing::warn!("timeline has no `boundaries` list");
                    &[]
                }
            },
        };

        let boundaries = records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let Some(time) = record.get("time").and_then(|time| time.as_f64()) else {
                    tracing::warn!(index, "skipping timeline record without numeric time");
                    return None;
                };
                let preset = record.get("preset").and_then(|preset| {
                    let parsed = preset_index(preset);
                    if parsed.is_none() && !preset.is_null() {
                        tracing::warn!(index, %preset, "unusable preset, randomizing");
                    }
                    parsed
                });
                Some(Boundary::new(time, preset))
            })
            .collect();
        Ok(Self::new(boundaries))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Loads a timeline, falling back to an empty one on any failure.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|err| {
            tracing::warn!(?path, %err, "timeline unavailable, running without one");
            Self::default()
        })
    }

    /// Drops every preset index so each boundary randomizes.
    pub fn ignore_presets(mut self) -> Self {
        for boundary in &mut self.boundaries {
            boundary.preset = None;
        }
        self
    }

    pub fn to_json_string(&self) -> Result<String> {
        let file = TimelineFile {
            boundaries: self.boundaries.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn next_boundary(&self) -> Option<&Boundary> {
        self.boundaries.get(self.next)
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.boundaries.len()
    }

    /// Consumes at most one boundary that `time` has passed.
    pub fn poll(&mut self, time: f64) -> Option<TimelineCue> {
        let boundary = self.boundaries.get(self.next)?;
        if time <= boundary.time {
            return None;
        }
        let preset = boundary.preset;
        self.next += 1;
        Some(match preset {
            Some(preset) if preset >= 0 => TimelineCue::Preset(preset as usize),
            Some(preset) => {
                tracing::warn!(preset, "negative preset index, randomizing");
                TimelineCue::Random
            }
            None => TimelineCue::Random,
        })
    }

    pub fn rewind(&mut self) {
        self.next = 0;
    }
}

fn preset_index(value: &serde_json::Value) -> Option<i64> {
    if let Some(index) = value.as_i64() {
        return Some(index);
    }
    let float = value.as_f64()?;
    (float.fract() == 0.0 && float.abs() < i64::MAX as f64).then_some(float as i64)
}
