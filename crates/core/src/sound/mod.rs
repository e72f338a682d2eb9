use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Number of octave bands reported per frame.
pub const OCTAVE_BANDS: usize = 8;

/// Audio features for one rendered frame, as supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// RMS level of the analysed block.
    pub amplitude: f32,
    /// Mean spectral magnitude per octave, lowest band first.
    pub octaves: [f32; OCTAVE_BANDS],
}

impl AudioFrame {
    pub fn silent() -> Self {
        Self::default()
    }
}

/// Turns blocks of PCM samples into [`AudioFrame`]s.
///
/// Capture is the host's job; this only does the FFT side so the player can
/// feed something meaningful into `sound;` modules.
pub struct SpectrumAnalyser {
    sample_rate: u32,
    planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl SpectrumAnalyser {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Analyses one block of mono samples.
    pub fn analyse(&mut self, samples: &[f32]) -> Result<AudioFrame> {
        if samples.len() < 2 {
            return Err(EngineError::msg(
                "analysis requires blocks with at least two samples",
            ));
        }

        let amplitude = compute_rms(samples);
        let len = samples.len();
        let fft = self.prepare_fft(len);

        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        // Band k covers bins [2^k, 2^(k+1)), the last band takes the rest.
        let mut octaves = [0.0; OCTAVE_BANDS];
        let bins = fft.spectrum.len();
        let norm = 2.0 / len as f32;
        for (band, slot) in octaves.iter_mut().enumerate() {
            let start = 1usize << band;
            let end = if band + 1 == OCTAVE_BANDS {
                bins
            } else {
                (1usize << (band + 1)).min(bins)
            };
            if start >= end {
                continue;
            }
            let sum: f32 = fft.spectrum[start..end].iter().map(|bin| bin.norm()).sum();
            *slot = sum * norm / (end - start) as f32;
        }

        Ok(AudioFrame { amplitude, octaves })
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map_or(true, |fft| fft.size != size) {
            self.fft = None;
        }

        let planner = &mut self.planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                plan,
            }
        })
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("sample_rate", &self.sample_rate)
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn silence_has_no_energy() {
        let mut analyser = SpectrumAnalyser::new(48_000);
        let frame = analyser.analyse(&vec![0.0; 1024]).unwrap();

        assert_eq!(frame, AudioFrame::silent());
    }

    #[test]
    fn sine_energy_lands_in_its_octave() {
        // 1024-point FFT at 1024 Hz gives 1 Hz bins; 40 Hz falls in band 5 (32..64).
        let mut analyser = SpectrumAnalyser::new(1024);
        let frame = analyser.analyse(&sine(40.0, 1024, 1024)).unwrap();

        assert!((frame.amplitude - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
        let loudest = frame
            .octaves
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(band, _)| band);
        assert_eq!(loudest, Some(5));
    }

    #[test]
    fn rejects_tiny_blocks() {
        let mut analyser = SpectrumAnalyser::new(48_000);
        assert!(analyser.analyse(&[0.5]).is_err());
    }
}
