// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Video resynchronization.
//!
//! The video decoder runs on its own clock. Every few seconds the controller
//! compares the decoder position with the audio position and sets a playback
//! speed slightly above or below real time so the video catches up without
//! visible seeks. Inside the dead-band the speed is exactly 1.0 and checks
//! become rare.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::VideoDecoder;

/// Video resync tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoSyncConfig {
    /// Drift tolerated without any correction
    #[serde(default = "default_dead_band_ms")]
    pub dead_band_ms: f64,
    /// Largest drift the speed formula reacts to
    #[serde(default = "default_delay_cap_ms")]
    pub delay_cap_ms: f64,
    /// Divisor turning capped drift into a speed offset; larger is gentler
    #[serde(default = "default_speed_divisor")]
    pub speed_divisor: f64,
    /// Smallest speed offset that is applied
    #[serde(default = "default_min_speed_offset")]
    pub min_speed_offset: f64,
    /// Latency added by the decoder when its speed changes
    #[serde(default = "default_speed_change_delay_ms")]
    pub speed_change_delay_ms: f64,
    /// Time until the next check when in sync
    #[serde(default = "default_stable_check_interval_ms")]
    pub stable_check_interval_ms: f64,
    /// Time until the next check while correcting
    #[serde(default = "default_correction_check_interval_ms")]
    pub correction_check_interval_ms: f64,
    /// Speed never leaves 1.0 +/- this value
    #[serde(default = "default_max_speed_deviation")]
    pub max_speed_deviation: f64,
}

fn default_dead_band_ms() -> f64 {
    40.0
}
fn default_delay_cap_ms() -> f64 {
    100.0
}
fn default_speed_divisor() -> f64 {
    2800.0
}
fn default_min_speed_offset() -> f64 {
    0.01
}
fn default_speed_change_delay_ms() -> f64 {
    30.0
}
fn default_stable_check_interval_ms() -> f64 {
    20_000.0
}
fn default_correction_check_interval_ms() -> f64 {
    3_000.0
}
fn default_max_speed_deviation() -> f64 {
    0.1
}

impl Default for VideoSyncConfig {
    fn default() -> Self {
        Self {
            dead_band_ms: default_dead_band_ms(),
            delay_cap_ms: default_delay_cap_ms(),
            speed_divisor: default_speed_divisor(),
            min_speed_offset: default_min_speed_offset(),
            speed_change_delay_ms: default_speed_change_delay_ms(),
            stable_check_interval_ms: default_stable_check_interval_ms(),
            correction_check_interval_ms: default_correction_check_interval_ms(),
            max_speed_deviation: default_max_speed_deviation(),
        }
    }
}

impl VideoSyncConfig {
    /// Playback speed for a drift outside the dead-band.
    ///
    /// Positive drift (video ahead) slows the video down, negative drift
    /// speeds it up. Unusable tunables leave the video at real time.
    pub fn corrective_speed(&self, measured_delay_ms: f64) -> f64 {
        let cap = self.delay_cap_ms.abs();
        let deviation = self.max_speed_deviation.abs();
        if !(measured_delay_ms.is_finite() && cap.is_finite() && deviation.is_finite()) {
            return 1.0;
        }

        let capped = measured_delay_ms.max(-cap).min(cap) - self.speed_change_delay_ms;
        let mut speed = 1.0 - capped / self.speed_divisor;

        if (speed - 1.0).abs() < self.min_speed_offset {
            speed = if capped > 0.0 {
                1.0 - self.min_speed_offset
            } else {
                1.0 + self.min_speed_offset
            };
        }

        if !speed.is_finite() {
            return 1.0;
        }
        speed.max(1.0 - deviation).min(1.0 + deviation)
    }
}

/// Keeps a video decoder aligned with the audio position
pub struct VideoResyncController<D: VideoDecoder> {
    config: VideoSyncConfig,
    decoder: D,
    speed: f64,
    measured_delay_ms: f64,
    /// Audio position at which the next measurement is taken
    next_check_ms: f64,
    playing: bool,
}

impl<D: VideoDecoder> VideoResyncController<D> {
    pub fn new(decoder: D, config: VideoSyncConfig) -> Self {
        Self {
            config,
            decoder,
            speed: 1.0,
            measured_delay_ms: 0.0,
            next_check_ms: 0.0,
            playing: false,
        }
    }

    /// Open a clip.
    ///
    /// # Returns
    /// * `true` when the clip is ready
    /// * `false` if it could not be opened (logged, playback goes on without video)
    pub fn load_video(&mut self, path: &Path) -> bool {
        self.close_video();
        match self.decoder.load(path) {
            Ok(()) => {
                info!(path = %path.display(), "Video loaded");
                true
            }
            Err(e) => {
                warn!("Video not loaded: {}", e);
                false
            }
        }
    }

    /// Start playback at a song position; resets the sync state
    pub fn play_video(&mut self, start_time_ms: f64) {
        if !self.is_ready() {
            return;
        }
        self.decoder.seek_ms(start_time_ms.max(0.0));
        self.set_speed(1.0);
        self.decoder.play();
        self.measured_delay_ms = 0.0;
        self.next_check_ms = start_time_ms + self.config.correction_check_interval_ms;
        self.playing = true;
        debug!(start_time_ms, "Video playback started");
    }

    /// Pause playback, keeping the clip open
    pub fn stop_video(&mut self) {
        if self.decoder.is_loaded() {
            self.decoder.pause();
        }
        self.playing = false;
    }

    /// Measure drift and adjust speed when a check is due.
    ///
    /// # Arguments
    /// * `resync_enabled` - When false the speed is forced to 1.0
    /// * `audio_position_ms` - Authoritative song position
    ///
    /// # Returns
    /// The last measured delay (video minus audio) in milliseconds
    pub fn update(&mut self, resync_enabled: bool, audio_position_ms: f64) -> f64 {
        if !self.playing || !self.is_ready() {
            return self.measured_delay_ms;
        }
        if audio_position_ms < self.next_check_ms {
            return self.measured_delay_ms;
        }

        let video_position_ms = self.decoder.position() * self.decoder.duration_ms();
        self.measured_delay_ms = video_position_ms - audio_position_ms;

        if !resync_enabled {
            self.set_speed(1.0);
            return self.measured_delay_ms;
        }

        if self.measured_delay_ms.abs() <= self.config.dead_band_ms {
            self.set_speed(1.0);
            self.next_check_ms = audio_position_ms + self.config.stable_check_interval_ms;
        } else {
            let speed = self.config.corrective_speed(self.measured_delay_ms);
            self.set_speed(speed);
            self.next_check_ms = audio_position_ms + self.config.correction_check_interval_ms;
            debug!(
                delay_ms = self.measured_delay_ms,
                speed, "Video speed corrected"
            );
        }

        self.measured_delay_ms
    }

    pub fn close_video(&mut self) {
        if self.decoder.is_loaded() {
            self.decoder.close();
        }
        self.playing = false;
        self.speed = 1.0;
        self.measured_delay_ms = 0.0;
        self.next_check_ms = 0.0;
    }

    fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
        self.decoder.set_speed(speed);
    }

    /// Clip open and of known length
    fn is_ready(&self) -> bool {
        self.decoder.is_loaded() && self.decoder.duration_ms() > 0.0
    }

    pub fn is_loaded(&self) -> bool {
        self.decoder.is_loaded()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current playback speed
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Last measured delay, video minus audio
    pub fn measured_delay_ms(&self) -> f64 {
        self.measured_delay_ms
    }

    pub fn next_check_ms(&self) -> f64 {
        self.next_check_ms
    }

    pub fn config(&self) -> &VideoSyncConfig {
        &self.config
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }
}
