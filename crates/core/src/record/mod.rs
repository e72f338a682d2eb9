use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// When and where rendered frames should be captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Capture is disabled while this is unset.
    pub output_dir: Option<PathBuf>,
    /// Frames to skip before the first capture, letting visuals settle.
    pub frame_offset: u64,
    /// Capture every n-th frame.
    pub every: u64,
    pub prefix: String,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            frame_offset: 300,
            every: 1,
            prefix: "frame".to_string(),
        }
    }
}

/// A frame the graphics collaborator should write to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub frame: u64,
    pub path: PathBuf,
}

/// Decides capture cadence from the global frame counter.
///
/// Reading pixels back and encoding them is left to the host; this only
/// says which frames and under which file name.
#[derive(Debug, Default)]
pub struct Recorder {
    settings: RecordingSettings,
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self { settings }
    }

    pub fn is_recording(&self) -> bool {
        self.settings.output_dir.is_some()
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    pub fn request(&self, state: usize, frame: u64) -> Option<CaptureRequest> {
        let dir = self.settings.output_dir.as_ref()?;
        let every = self.settings.every.max(1);
        if frame <= self.settings.frame_offset || frame % every != 0 {
            return None;
        }
        Some(CaptureRequest {
            frame,
            path: dir.join(format!("{}-{state}-{frame}.bmp", self.settings.prefix)),
        })
    }
}
