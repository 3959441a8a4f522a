// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Video playback abstraction layer.
//!
//! This module provides a trait over video decoders and the controller that
//! keeps a decoder's own playback clock converged with the audio position
//! by nudging its playback speed.

pub mod playhead;
pub mod resync;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use playhead::Playhead;
pub use resync::{VideoResyncController, VideoSyncConfig};

/// Video decoder errors
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video file not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported video file {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },
}

/// Trait for video decoder implementations.
///
/// The decoder runs its own playback clock; the resync controller only
/// reads its normalized position and adjusts its speed.
pub trait VideoDecoder {
    /// Open a clip.
    ///
    /// # Arguments
    /// * `path` - Path of the clip to open
    ///
    /// # Returns
    /// * `Ok(())` when the clip is ready to play
    /// * `Err` if the clip could not be opened
    fn load(&mut self, path: &Path) -> Result<(), VideoError>;

    /// Start or resume playback.
    fn play(&mut self);

    /// Pause playback, keeping the position.
    fn pause(&mut self);

    /// Move the playhead to an absolute position in milliseconds.
    fn seek_ms(&mut self, position_ms: f64);

    /// Playback position as a fraction of the clip duration (0.0 to 1.0).
    fn position(&self) -> f64;

    /// Clip duration in milliseconds, 0.0 when unknown.
    fn duration_ms(&self) -> f64;

    /// Set the playback speed (1.0 is real time).
    fn set_speed(&mut self, speed: f64);

    /// Release the clip.
    fn close(&mut self);

    /// True while a clip is open.
    fn is_loaded(&self) -> bool;

    /// Expected clip length, for decoders that cannot read it from the file.
    fn hint_duration_ms(&mut self, _duration_ms: f64) {}
}
