// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio engine for stagesync.
//!
//! This module provides:
//! - Stem decoding and mixing
//! - Audio output via cpal
//! - The audio callback that drives the tick clock

pub mod output;
pub mod playback;
pub mod stems;

pub use output::{AudioOutput, StreamParams};
pub use playback::{playback_channel, MixPlayer, PlaybackCommand, PlaybackControl};
pub use stems::{Mix, Stem};

use std::path::{Path, PathBuf};

use rtrb::Producer;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{AudioConfig, StemVolumes};
use crate::timing::{ClockEvent, ClockRunner};

/// Audio error types
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("Audio initialization failed: {0}")]
    InitFailed(String),
    #[error("Audio stream failed: {0}")]
    StreamFailed(String),
    #[error("No audio device available")]
    NoDevice,
    #[error("Audio device '{0}' not found")]
    DeviceNotFound(String),
    #[error("Failed to load stem {path:?}: {reason}")]
    StemLoad { path: PathBuf, reason: String },
    #[error("Audio command queue full")]
    QueueFull,
}

/// Everything the audio callback owns.
///
/// Stems are rendered first; the clock then advances by exactly the frames
/// that were played, so ticks never run ahead of or behind the audio.
pub struct Renderer {
    player: MixPlayer,
    clock: ClockRunner,
    events: Producer<ClockEvent>,
}

impl Renderer {
    pub fn new(player: MixPlayer, clock: ClockRunner, events: Producer<ClockEvent>) -> Self {
        Self {
            player,
            clock,
            events,
        }
    }

    /// Fill one output block and advance the clock
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        let advanced = self.player.process(data, channels);
        self.clock.process(advanced, &mut self.events);
    }

    pub fn clock(&self) -> &ClockRunner {
        &self.clock
    }
}

enum Backend {
    Device(AudioOutput),
    /// No device: the renderer is driven manually (tests, dry runs)
    Offline {
        renderer: Box<Renderer>,
        scratch: Vec<f32>,
    },
}

/// Stem playback engine
pub struct AudioEngine {
    backend: Backend,
    control: PlaybackControl,
    sample_rate: u32,
}

impl AudioEngine {
    /// Open the audio device and start the callback
    pub fn start(
        config: &AudioConfig,
        clock: ClockRunner,
        events: Producer<ClockEvent>,
    ) -> Result<Self, AudioError> {
        let (control, player) = playback_channel();
        let mut renderer = Renderer::new(player, clock, events);
        let output = AudioOutput::new(config, move |data, channels| {
            renderer.render(data, channels);
        })?;
        let sample_rate = output.sample_rate();
        Ok(Self {
            backend: Backend::Device(output),
            control,
            sample_rate,
        })
    }

    /// Engine without a device; audio advances only through `pump`
    pub fn offline(sample_rate: u32, clock: ClockRunner, events: Producer<ClockEvent>) -> Self {
        let (control, player) = playback_channel();
        Self {
            backend: Backend::Offline {
                renderer: Box::new(Renderer::new(player, clock, events)),
                scratch: Vec::new(),
            },
            control,
            sample_rate,
        }
    }

    /// Render `frames` stereo frames offline. No-op with a device attached.
    pub fn pump(&mut self, frames: usize) {
        if let Backend::Offline { renderer, scratch } = &mut self.backend {
            scratch.resize(frames * 2, 0.0);
            renderer.render(scratch, 2);
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.backend, Backend::Device(_))
    }

    pub fn device_name(&self) -> Option<&str> {
        match &self.backend {
            Backend::Device(output) => Some(output.device_name()),
            Backend::Offline { .. } => None,
        }
    }

    fn send(&mut self, command: PlaybackCommand) -> Result<(), AudioError> {
        self.control
            .commands
            .push(command)
            .map_err(|_| AudioError::QueueFull)
    }

    /// Decode the stems and hand them to the audio thread
    pub fn load(&mut self, paths: &[PathBuf], volumes: &StemVolumes) -> Result<(), AudioError> {
        let mix = load_mix(paths, volumes, self.sample_rate)?;
        info!(
            stems = mix.stems().len(),
            seconds = mix.frames() as f64 / self.sample_rate.max(1) as f64,
            "Audio loaded"
        );
        self.send(PlaybackCommand::Load(Box::new(mix)))
    }

    pub fn unload(&mut self) -> Result<(), AudioError> {
        self.send(PlaybackCommand::Unload)
    }

    pub fn play(&mut self) -> Result<(), AudioError> {
        self.send(PlaybackCommand::Play)
    }

    pub fn stop(&mut self) -> Result<(), AudioError> {
        self.send(PlaybackCommand::Stop)
    }

    /// Move playback to a position in milliseconds
    pub fn seek_ms(&mut self, position_ms: f64) -> Result<(), AudioError> {
        let frame = (position_ms.max(0.0) * self.sample_rate as f64 / 1000.0).round() as u64;
        debug!(position_ms, frame, "Audio seek");
        self.send(PlaybackCommand::Seek(frame))
    }

    /// Position of the audio thread in milliseconds
    pub fn position_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.control.atomics.position() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Length of the loaded mix in milliseconds
    pub fn length_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.control.atomics.length() as f64 * 1000.0 / self.sample_rate as f64
    }

    pub fn is_playing(&self) -> bool {
        self.control.atomics.is_playing()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Free mixes the audio thread has let go of
    pub fn collect_garbage(&mut self) {
        while let Ok(mix) = self.control.retired.pop() {
            drop(mix);
        }
    }
}

/// Decode every file into one mix at the device rate
pub fn load_mix(paths: &[PathBuf], volumes: &StemVolumes, sample_rate: u32) -> Result<Mix, AudioError> {
    let mut stems = Vec::with_capacity(paths.len());
    for path in paths {
        let gain = volumes.gain(&file_name(path));
        match Stem::load(path, sample_rate, gain) {
            Ok(stem) => stems.push(stem),
            Err(e) if paths.len() > 1 => warn!("Skipping stem: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(Mix::new(stems))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
