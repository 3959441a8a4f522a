// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Sample-driven tick clock.
//!
//! The clock is advanced once per rendered audio frame. Every
//! `samples_per_tick` frames a tick fires: the tick counter moves, part
//! boundaries are checked and a clock pulse is emitted. The interval is a
//! whole number of samples, truncated from the tempo; the error this leaves
//! against the audio is taken out by the drift correction, which stretches
//! or shrinks single tick intervals by a couple of samples.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::correction::{self, CorrectionDecision, CorrectionThresholds};
use super::events::{ClockEvent, ClockSink};
use super::shared::ClockShared;
use crate::song::SongTimeline;

/// Pulses Per Quarter Note - MIDI standard is 24
pub const PPQN: u32 = 24;

/// Tick clock state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    /// Disabled, no position to resume from or already played
    Stopped,
    /// Song loaded (or part selected), not started yet
    Loaded,
    /// Enabled and counting
    Running,
}

/// Tick clock tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Ticks per beat
    #[serde(default = "default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    /// Audio sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Ticks counted before the first pulse goes out
    #[serde(default = "default_ignored_startup_ticks")]
    pub ignored_startup_ticks: u32,
    /// How many ticks before a part boundary the part change is signalled
    #[serde(default = "default_part_change_lookahead_ticks")]
    pub part_change_lookahead_ticks: u64,
    /// Drift correction table
    #[serde(default)]
    pub correction: CorrectionThresholds,
}

fn default_ticks_per_beat() -> u32 {
    PPQN
}
fn default_sample_rate() -> u32 {
    44100
}
fn default_ignored_startup_ticks() -> u32 {
    4
}
fn default_part_change_lookahead_ticks() -> u64 {
    24
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: default_ticks_per_beat(),
            sample_rate: default_sample_rate(),
            ignored_startup_ticks: default_ignored_startup_ticks(),
            part_change_lookahead_ticks: default_part_change_lookahead_ticks(),
            correction: CorrectionThresholds::default(),
        }
    }
}

/// Whole samples per tick for a tempo, fraction truncated.
///
/// A tempo that is not a positive number never ticks.
pub fn samples_per_tick(sample_rate: u32, bpm: f64, ticks_per_beat: u32) -> u64 {
    if !(bpm.is_finite() && bpm > 0.0) || ticks_per_beat == 0 {
        return u64::MAX;
    }
    ((sample_rate as f64 * 60.0 / bpm / ticks_per_beat as f64) as u64).max(1)
}

/// Tick clock driven by audio frames
#[derive(Debug)]
pub struct TickClock {
    config: ClockConfig,
    timeline: Option<Arc<SongTimeline>>,
    shared: Arc<ClockShared>,
    /// Total ticks since song start
    total_ticks: u64,
    /// Index of the part being played
    current_part: usize,
    samples_per_tick: u64,
    /// Frames counted since the last tick
    samples: u64,
    /// Adjustment of the running tick interval, in samples
    correction: i8,
    /// Pulses are held back until the tick count passes this value
    startup_threshold: u64,
    /// Tick the clock was last reset to
    reset_tick: u64,
    loop_end_reached: bool,
}

impl TickClock {
    /// Create a clock with no song loaded
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            timeline: None,
            shared: Arc::new(ClockShared::new()),
            total_ticks: 0,
            current_part: 0,
            samples_per_tick: samples_per_tick(config.sample_rate, 120.0, config.ticks_per_beat),
            samples: 0,
            correction: 0,
            startup_threshold: config.ignored_startup_ticks as u64,
            reset_tick: 0,
            loop_end_reached: false,
        }
    }

    /// Shared state for the control thread
    pub fn shared(&self) -> Arc<ClockShared> {
        Arc::clone(&self.shared)
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Load a new song and reset all counters to its first tick
    pub fn set_new_song(&mut self, timeline: Arc<SongTimeline>) {
        self.timeline = Some(timeline);
        self.total_ticks = 0;
        self.current_part = 0;
        self.startup_threshold = self.config.ignored_startup_ticks as u64;
        self.reset_counters();
    }

    /// Jump to the start of a part, from any state
    pub fn set_current_part(&mut self, index: usize) {
        let Some(timeline) = self.timeline.as_deref() else {
            return;
        };
        let index = index.min(timeline.last_index());
        self.current_part = index;
        self.total_ticks = timeline.parts()[index].start_tick;
        self.startup_threshold = self.total_ticks + self.config.ignored_startup_ticks as u64;
        self.reset_counters();
    }

    fn reset_counters(&mut self) {
        self.samples = 0;
        self.correction = 0;
        self.shared.take_staged_correction();
        self.loop_end_reached = false;
        self.reset_tick = self.total_ticks;
        self.recompute_samples_per_tick();
        self.publish();
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.config.sample_rate = sample_rate.max(1);
        self.recompute_samples_per_tick();
    }

    /// Number of ticks swallowed after start or a jump before pulses go out
    pub fn set_ignored_startup_ticks(&mut self, ticks: u32) {
        self.config.ignored_startup_ticks = ticks;
    }

    pub fn set_enabled(&self, enabled: bool) {
        info!(enabled, "Clock enabled status changed");
        self.shared.set_enabled(enabled);
    }

    pub fn set_loop_mode(&self, enabled: bool) {
        self.shared.set_loop_mode(enabled);
    }

    fn recompute_samples_per_tick(&mut self) {
        let bpm = self
            .timeline
            .as_deref()
            .map(|timeline| timeline.tempo_at(self.current_part))
            .unwrap_or(120.0);
        self.samples_per_tick =
            samples_per_tick(self.config.sample_rate, bpm, self.config.ticks_per_beat);
    }

    fn publish(&self) {
        self.shared.publish(
            self.total_ticks,
            self.current_part,
            self.loop_end_reached,
            self.correction,
        );
    }

    /// Advance by a block of frames
    pub fn process<S: ClockSink + ?Sized>(&mut self, frames: usize, sink: &mut S) {
        if !self.shared.enabled() || self.timeline.is_none() {
            return;
        }
        for _ in 0..frames {
            self.advance(sink);
        }
        self.shared.publish_sub_tick(self.samples as f64);
    }

    /// Advance by one frame
    pub fn advance<S: ClockSink + ?Sized>(&mut self, sink: &mut S) {
        if !self.shared.enabled() || self.timeline.is_none() {
            return;
        }

        self.samples += 1;
        let interval = self
            .samples_per_tick
            .saturating_add_signed(self.correction as i64)
            .max(1);
        if self.samples < interval {
            return;
        }

        self.samples = 0;
        self.correction = self.shared.take_staged_correction();
        self.total_ticks += 1;

        self.check_part_transition(sink);

        if self.total_ticks > self.startup_threshold {
            sink.on_clock_event(ClockEvent::Pulse);
        }

        self.publish();
    }

    fn check_part_transition<S: ClockSink + ?Sized>(&mut self, sink: &mut S) {
        let Some(timeline) = self.timeline.as_deref() else {
            return;
        };
        let last = timeline.last_index();

        while self.current_part < last {
            let next = self.current_part + 1;
            let boundary = timeline.parts()[next].start_tick;
            if self.total_ticks + self.config.part_change_lookahead_ticks < boundary {
                break;
            }

            if next == last && self.shared.loop_mode() {
                if !self.loop_end_reached {
                    self.loop_end_reached = true;
                    sink.on_clock_event(ClockEvent::LoopEndReached {
                        part_index: self.current_part,
                    });
                }
                break;
            }

            self.current_part = next;
            self.samples_per_tick = samples_per_tick(
                self.config.sample_rate,
                timeline.tempo_at(next),
                self.config.ticks_per_beat,
            );
            sink.on_clock_event(ClockEvent::PartChanged { part_index: next });
        }
    }

    /// Measure drift against the audio position and stage a correction
    /// for the next tick boundary
    pub fn correct_ticks_to_playback_position(
        &self,
        measured_position_ms: f64,
    ) -> Option<CorrectionDecision> {
        let timeline = self.timeline.as_deref()?;
        let since_tick_ms = self.samples as f64 * 1000.0 / self.config.sample_rate.max(1) as f64;
        let decision = correction::decide(
            timeline,
            self.total_ticks,
            self.current_part,
            measured_position_ms - since_tick_ms,
            &self.config.correction,
        );
        self.shared.stage_correction(decision.correction);
        Some(decision)
    }

    /// Current state in the clock life cycle
    pub fn state(&self) -> ClockState {
        match &self.timeline {
            Some(_) if self.shared.enabled() => ClockState::Running,
            Some(_) if self.total_ticks == self.reset_tick && self.samples == 0 => {
                ClockState::Loaded
            }
            _ => ClockState::Stopped,
        }
    }

    pub fn timeline(&self) -> Option<&Arc<SongTimeline>> {
        self.timeline.as_ref()
    }

    /// Total ticks since song start
    pub fn tick_count(&self) -> u64 {
        self.total_ticks
    }

    /// Whole beats since song start
    pub fn beat_count(&self) -> u64 {
        self.total_ticks / self.config.ticks_per_beat.max(1) as u64
    }

    pub fn current_part_index(&self) -> usize {
        self.current_part
    }

    /// Nominal tick interval of the current part, in samples
    pub fn samples_per_tick(&self) -> u64 {
        self.samples_per_tick
    }

    /// Adjustment applied to the running tick interval
    pub fn active_correction(&self) -> i8 {
        self.correction
    }

    /// Adjustment waiting for the next tick boundary
    pub fn staged_correction(&self) -> i8 {
        self.shared.staged_correction()
    }

    /// Song position of the clock in milliseconds
    pub fn playback_position_ms(&self) -> f64 {
        self.timeline
            .as_deref()
            .map(|timeline| timeline.position_ms_at_tick(self.total_ticks))
            .unwrap_or(0.0)
    }

    /// True while enabled and sitting on the end sentinel
    pub fn is_song_ended(&self) -> bool {
        match self.timeline.as_deref() {
            Some(timeline) => self.shared.enabled() && self.current_part == timeline.last_index(),
            None => false,
        }
    }

    pub fn loop_end_reached(&self) -> bool {
        self.loop_end_reached
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled()
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(ClockConfig::default())
    }
}
