// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Free-running video playhead.
//!
//! Stands in for a decoder when the clip is rendered by an external player:
//! it keeps the clip's playback clock from the wall clock and the commanded
//! speed, so the resync loop can run and be observed without frames.

use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{VideoDecoder, VideoError};

/// Wall-clock driven playback position
#[derive(Debug)]
pub struct Playhead {
    path: Option<PathBuf>,
    duration_ms: f64,
    speed: f64,
    /// Position at the last rebase
    base_ms: f64,
    /// Set while playing
    started: Option<Instant>,
}

impl Playhead {
    pub fn new() -> Self {
        Self {
            path: None,
            duration_ms: 0.0,
            speed: 1.0,
            base_ms: 0.0,
            started: None,
        }
    }

    /// Clip length; the playhead has no container to read it from
    pub fn set_duration_ms(&mut self, duration_ms: f64) {
        self.duration_ms = duration_ms.max(0.0);
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn position_ms(&self) -> f64 {
        let elapsed = self
            .started
            .map(|started| started.elapsed().as_secs_f64() * 1000.0 * self.speed)
            .unwrap_or(0.0);
        (self.base_ms + elapsed).min(self.duration_ms)
    }

    /// Fold the running segment into the base position
    fn rebase(&mut self) {
        self.base_ms = self.position_ms();
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

impl Default for Playhead {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for Playhead {
    fn load(&mut self, path: &Path) -> Result<(), VideoError> {
        if !path.is_file() {
            return Err(VideoError::NotFound(path.to_path_buf()));
        }
        self.path = Some(path.to_path_buf());
        self.base_ms = 0.0;
        self.started = None;
        self.speed = 1.0;
        Ok(())
    }

    fn play(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.rebase();
        self.started = None;
    }

    fn seek_ms(&mut self, position_ms: f64) {
        self.base_ms = position_ms.clamp(0.0, self.duration_ms);
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    fn position(&self) -> f64 {
        if self.duration_ms > 0.0 {
            self.position_ms() / self.duration_ms
        } else {
            0.0
        }
    }

    fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    fn set_speed(&mut self, speed: f64) {
        self.rebase();
        self.speed = speed;
    }

    fn close(&mut self) {
        self.path = None;
        self.started = None;
        self.base_ms = 0.0;
    }

    fn is_loaded(&self) -> bool {
        self.path.is_some()
    }

    fn hint_duration_ms(&mut self, duration_ms: f64) {
        self.set_duration_ms(duration_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_rejected() {
        let mut playhead = Playhead::new();
        let result = playhead.load(Path::new("/nonexistent/clip.mp4"));
        assert!(matches!(result, Err(VideoError::NotFound(_))));
        assert!(!playhead.is_loaded());
    }

    #[test]
    fn test_seek_while_paused() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"").unwrap();

        let mut playhead = Playhead::new();
        playhead.set_duration_ms(10_000.0);
        playhead.load(&clip).unwrap();
        playhead.seek_ms(2_500.0);
        assert!((playhead.position() - 0.25).abs() < 1e-12);

        // Seeks are clamped to the clip
        playhead.seek_ms(20_000.0);
        assert_eq!(playhead.position(), 1.0);

        playhead.close();
        assert!(!playhead.is_loaded());
    }

    #[test]
    fn test_zero_duration_reports_zero() {
        let playhead = Playhead::new();
        assert_eq!(playhead.position(), 0.0);
        assert_eq!(playhead.duration_ms(), 0.0);
    }
}
