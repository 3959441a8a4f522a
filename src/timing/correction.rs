// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Drift correction decision for the tick clock.
//!
//! The clock counts audio frames, the audio player reports where playback
//! really is. The difference is converted to ticks and mapped through a
//! hysteresis table to a small adjustment (in samples) of the next tick
//! interval. Negative values shorten the interval so the clock catches up,
//! positive values lengthen it so the clock waits for the audio.

use serde::{Deserialize, Serialize};

use crate::song::SongTimeline;

/// Hysteresis bands of the correction table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionThresholds {
    /// Lateness (in ticks) from which the full step applies
    #[serde(default = "default_major_ticks")]
    pub major_ticks: f64,
    /// Lateness (in ticks) above which the half step applies
    #[serde(default = "default_minor_ticks")]
    pub minor_ticks: f64,
    /// Full step, in samples
    #[serde(default = "default_major_step")]
    pub major_step: i8,
    /// Half step, in samples
    #[serde(default = "default_minor_step")]
    pub minor_step: i8,
}

fn default_major_ticks() -> f64 {
    1.0
}
fn default_minor_ticks() -> f64 {
    0.5
}
fn default_major_step() -> i8 {
    2
}
fn default_minor_step() -> i8 {
    1
}

impl Default for CorrectionThresholds {
    fn default() -> Self {
        Self {
            major_ticks: default_major_ticks(),
            minor_ticks: default_minor_ticks(),
            major_step: default_major_step(),
            minor_step: default_minor_step(),
        }
    }
}

impl CorrectionThresholds {
    /// Map lateness in ticks to a tick interval adjustment in samples.
    ///
    /// | ticks late      | adjustment |
    /// |-----------------|------------|
    /// | >= 1.0          | -2         |
    /// | (0.5, 1.0)      | -1         |
    /// | [-0.5, 0.5]     | 0          |
    /// | (-1.0, -0.5)    | +1         |
    /// | <= -1.0         | +2         |
    pub fn correction_for(&self, ticks_late: f64) -> i8 {
        if !ticks_late.is_finite() {
            return 0;
        }
        if ticks_late >= self.major_ticks {
            -self.major_step
        } else if ticks_late > self.minor_ticks {
            -self.minor_step
        } else if ticks_late <= -self.major_ticks {
            self.major_step
        } else if ticks_late < -self.minor_ticks {
            self.minor_step
        } else {
            0
        }
    }
}

/// Outcome of one drift measurement
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CorrectionDecision {
    /// Position of the clock itself, in milliseconds
    pub clock_position_ms: f64,
    /// Measured audio position minus clock position
    pub delay_ms: f64,
    /// `delay_ms` expressed in ticks at the current tempo
    pub ticks_late: f64,
    /// Adjustment staged for the next tick boundary, in samples
    pub correction: i8,
}

/// Compare the clock position against a measured audio position
pub fn decide(
    timeline: &SongTimeline,
    tick_count: u64,
    part_index: usize,
    measured_position_ms: f64,
    thresholds: &CorrectionThresholds,
) -> CorrectionDecision {
    let clock_position_ms = timeline.position_ms_at_tick(tick_count);
    let delay_ms = measured_position_ms - clock_position_ms;
    let bpm = timeline.tempo_at(part_index);
    let ticks_late = delay_ms * bpm / 60_000.0 * timeline.ticks_per_beat() as f64;

    CorrectionDecision {
        clock_position_ms,
        delay_ms,
        ticks_late,
        correction: thresholds.correction_for(ticks_late),
    }
}
