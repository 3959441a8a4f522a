// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Stem loading and mixing.
//!
//! Stems are decoded once at song load into interleaved stereo `f32` at the
//! device sample rate. The audio thread then only sums slices.

use std::path::Path;

use super::AudioError;

/// One decoded stem
#[derive(Debug, Clone)]
pub struct Stem {
    name: String,
    gain: f32,
    /// Interleaved stereo samples
    samples: Vec<f32>,
}

impl Stem {
    /// Build a stem from interleaved stereo samples
    pub fn from_stereo(name: impl Into<String>, samples: Vec<f32>, gain: f32) -> Self {
        Self {
            name: name.into(),
            gain,
            samples,
        }
    }

    /// Decode a WAV file to stereo at the given sample rate.
    ///
    /// # Arguments
    /// * `path` - WAV file
    /// * `sample_rate` - Output device rate; the file is resampled if it differs
    /// * `gain` - Linear gain applied while mixing
    pub fn load(path: &Path, sample_rate: u32, gain: f32) -> Result<Self, AudioError> {
        let load_error = |reason: String| AudioError::StemLoad {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = hound::WavReader::open(path).map_err(|e| load_error(e.to_string()))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| load_error(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| load_error(e.to_string()))?
            }
        };

        let stereo = to_stereo(&interleaved, channels);
        let samples = if spec.sample_rate == sample_rate {
            stereo
        } else {
            resample_stereo(&stereo, spec.sample_rate, sample_rate)
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_stereo(name, samples, gain))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Length in frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Interleaved stereo from any channel count; mono is duplicated, extra
/// channels are dropped
fn to_stereo(interleaved: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        2 => interleaved.to_vec(),
        1 => interleaved.iter().flat_map(|s| [*s, *s]).collect(),
        _ => interleaved
            .chunks_exact(channels)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

/// Linear interpolation resampling of interleaved stereo
pub fn resample_stereo(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let frames = samples.len() / 2;
    if frames == 0 || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_frames = ((frames as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_frames * 2);

    for i in 0..out_frames {
        let pos = i as f64 * ratio;
        let index = pos as usize;
        let frac = (pos - index as f64) as f32;
        let next = (index + 1).min(frames - 1);
        for channel in 0..2 {
            let a = samples[index * 2 + channel];
            let b = samples[next * 2 + channel];
            out.push(a + (b - a) * frac);
        }
    }
    out
}

/// Stems of one song
#[derive(Debug, Clone, Default)]
pub struct Mix {
    stems: Vec<Stem>,
    frames: usize,
}

impl Mix {
    pub fn new(stems: Vec<Stem>) -> Self {
        let frames = stems.iter().map(Stem::frames).max().unwrap_or(0);
        Self { stems, frames }
    }

    pub fn stems(&self) -> &[Stem] {
        &self.stems
    }

    /// Length of the longest stem in frames
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Add the mix at `position` into an interleaved output buffer.
    ///
    /// Outputs with one channel get the mono sum, outputs with more than
    /// two channels get left/right on the first two.
    pub fn render(&self, position: usize, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for stem in &self.stems {
            let available = stem.frames().saturating_sub(position);
            if available == 0 {
                continue;
            }
            let frames = (out.len() / channels).min(available);
            let source = &stem.samples[position * 2..(position + frames) * 2];

            for (frame, input) in out
                .chunks_exact_mut(channels)
                .zip(source.chunks_exact(2))
            {
                let left = input[0] * stem.gain;
                let right = input[1] * stem.gain;
                if channels == 1 {
                    frame[0] += (left + right) * 0.5;
                } else {
                    frame[0] += left;
                    frame[1] += right;
                }
            }
        }
    }
}
