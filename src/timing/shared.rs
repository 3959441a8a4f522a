// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Handoff between the control thread and the tick clock on the audio thread.
//!
//! Each field has a single writer:
//! - the control side writes `enabled`, `loop_mode` and the staged correction
//! - the audio side consumes the staged correction and publishes tick count,
//!   part index and the loop flag
//!
//! Resets that touch several fields at once (new song, part jump) go through
//! a lock-free command ring drained at the start of every audio block.

use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, warn};

use super::clock::{ClockConfig, TickClock};
use super::correction::{self, CorrectionDecision, CorrectionThresholds};
use super::events::ClockSink;
use crate::song::SongTimeline;

/// Capacity of the control to audio command ring
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Clock state shared between threads
#[derive(Debug, Default)]
pub struct ClockShared {
    enabled: AtomicBool,
    loop_mode: AtomicBool,
    staged_correction: AtomicI8,
    active_correction: AtomicI8,
    tick_count: AtomicU64,
    part_index: AtomicUsize,
    loop_end_reached: AtomicBool,
    /// Frames counted since the last tick, as f64 bits
    sub_tick_samples: AtomicU64,
}

impl ClockShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn loop_mode(&self) -> bool {
        self.loop_mode.load(Ordering::Relaxed)
    }

    pub fn set_loop_mode(&self, enabled: bool) {
        self.loop_mode.store(enabled, Ordering::Relaxed);
    }

    /// Stage an interval adjustment for the next tick boundary
    pub fn stage_correction(&self, correction: i8) {
        self.staged_correction.store(correction, Ordering::Relaxed);
    }

    /// Staged adjustment not yet consumed
    pub fn staged_correction(&self) -> i8 {
        self.staged_correction.load(Ordering::Relaxed)
    }

    /// Consume the staged adjustment (audio side)
    pub(crate) fn take_staged_correction(&self) -> i8 {
        self.staged_correction.swap(0, Ordering::Relaxed)
    }

    /// Adjustment applied to the tick interval currently running
    pub fn active_correction(&self) -> i8 {
        self.active_correction.load(Ordering::Relaxed)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    pub fn part_index(&self) -> usize {
        self.part_index.load(Ordering::Relaxed)
    }

    pub fn loop_end_reached(&self) -> bool {
        self.loop_end_reached.load(Ordering::Relaxed)
    }

    /// Frames elapsed since the last tick, as of the end of the last audio block
    pub fn sub_tick_samples(&self) -> f64 {
        f64::from_bits(self.sub_tick_samples.load(Ordering::Relaxed))
    }

    pub(crate) fn publish_sub_tick(&self, samples: f64) {
        self.sub_tick_samples
            .store(samples.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn publish(
        &self,
        tick_count: u64,
        part_index: usize,
        loop_end_reached: bool,
        active_correction: i8,
    ) {
        self.tick_count.store(tick_count, Ordering::Relaxed);
        self.part_index.store(part_index, Ordering::Relaxed);
        self.loop_end_reached
            .store(loop_end_reached, Ordering::Relaxed);
        self.active_correction
            .store(active_correction, Ordering::Relaxed);
        self.publish_sub_tick(0.0);
    }
}

/// Multi-field changes applied by the audio thread
#[derive(Debug, Clone)]
pub enum ClockCommand {
    NewSong(Arc<SongTimeline>),
    JumpToPart(usize),
    SetSampleRate(u32),
    SetIgnoredStartupTicks(u32),
}

/// Create a connected control handle and audio-side runner
pub fn clock_channel(config: ClockConfig) -> (ClockHandle, ClockRunner) {
    let (producer, consumer) = RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    let thresholds = config.correction;
    let clock = TickClock::new(config);
    let handle = ClockHandle {
        shared: clock.shared(),
        commands: producer,
        timeline: None,
        retired: Vec::new(),
        thresholds,
        sample_rate: config.sample_rate.max(1),
    };
    let runner = ClockRunner {
        clock,
        commands: consumer,
    };
    (handle, runner)
}

/// Audio-thread owner of the tick clock
pub struct ClockRunner {
    clock: TickClock,
    commands: Consumer<ClockCommand>,
}

impl ClockRunner {
    /// Apply pending commands, then advance the clock by `frames` frames
    pub fn process<S: ClockSink + ?Sized>(&mut self, frames: usize, sink: &mut S) {
        while let Ok(command) = self.commands.pop() {
            match command {
                ClockCommand::NewSong(timeline) => self.clock.set_new_song(timeline),
                ClockCommand::JumpToPart(index) => self.clock.set_current_part(index),
                ClockCommand::SetSampleRate(rate) => self.clock.set_sample_rate(rate),
                ClockCommand::SetIgnoredStartupTicks(ticks) => {
                    self.clock.set_ignored_startup_ticks(ticks)
                }
            }
        }
        self.clock.process(frames, sink);
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }
}

/// Control-thread view of the tick clock
pub struct ClockHandle {
    shared: Arc<ClockShared>,
    commands: Producer<ClockCommand>,
    timeline: Option<Arc<SongTimeline>>,
    // Replaced songs, held until the audio thread has let go of them
    retired: Vec<Arc<SongTimeline>>,
    thresholds: CorrectionThresholds,
    sample_rate: u32,
}

impl ClockHandle {
    fn send(&mut self, command: ClockCommand) -> bool {
        match self.commands.push(command) {
            Ok(()) => true,
            Err(_) => {
                warn!("Clock command queue full, command dropped");
                false
            }
        }
    }

    /// Load a new song; the clock restarts at tick 0 of part 0
    pub fn set_new_song(&mut self, timeline: Arc<SongTimeline>) {
        info!(
            song = timeline.name(),
            parts = timeline.len(),
            "Clock loaded new song"
        );
        self.shared.stage_correction(0);
        self.shared.publish(0, 0, false, 0);
        if let Some(previous) = self.timeline.replace(Arc::clone(&timeline)) {
            self.retired.push(previous);
        }
        self.send(ClockCommand::NewSong(timeline));
        self.release_retired();
    }

    /// Drop replaced songs nothing else holds any more, so they are freed
    /// on this thread. Call regularly from the control loop.
    pub fn release_retired(&mut self) {
        self.retired.retain(|timeline| Arc::strong_count(timeline) > 1);
    }

    /// Replaced songs still waiting to be released
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Jump to the start of a part
    pub fn set_current_part(&mut self, index: usize) {
        if let Some(timeline) = &self.timeline {
            let index = index.min(timeline.last_index());
            let tick = timeline.parts()[index].start_tick;
            debug!(part = index, tick, "Clock jumped to part");
            self.shared.stage_correction(0);
            self.shared.publish(tick, index, false, 0);
            self.send(ClockCommand::JumpToPart(index));
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.send(ClockCommand::SetSampleRate(sample_rate));
    }

    pub fn set_ignored_startup_ticks(&mut self, ticks: u32) {
        self.send(ClockCommand::SetIgnoredStartupTicks(ticks));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.set_enabled(enabled);
    }

    pub fn set_loop_mode(&self, enabled: bool) {
        self.shared.set_loop_mode(enabled);
    }

    /// Measure drift against the audio position and stage a correction.
    ///
    /// The audio position is taken back to the moment of the last tick using
    /// the frames the clock has counted since, so the measurement does not
    /// depend on where between two ticks it is made.
    pub fn correct_ticks_to_playback_position(
        &self,
        measured_position_ms: f64,
    ) -> Option<CorrectionDecision> {
        let timeline = self.timeline.as_ref()?;
        let since_tick_ms = self.shared.sub_tick_samples() * 1000.0 / self.sample_rate as f64;
        let decision = correction::decide(
            timeline,
            self.shared.tick_count(),
            self.shared.part_index(),
            measured_position_ms - since_tick_ms,
            &self.thresholds,
        );
        self.shared.stage_correction(decision.correction);
        debug!(
            delay_ms = decision.delay_ms,
            ticks_late = decision.ticks_late,
            correction = decision.correction,
            "Clock drift measured"
        );
        Some(decision)
    }

    pub fn timeline(&self) -> Option<&Arc<SongTimeline>> {
        self.timeline.as_ref()
    }

    pub fn shared(&self) -> Arc<ClockShared> {
        Arc::clone(&self.shared)
    }

    pub fn tick_count(&self) -> u64 {
        self.shared.tick_count()
    }

    pub fn beat_count(&self) -> u64 {
        let ticks_per_beat = self
            .timeline
            .as_ref()
            .map(|timeline| timeline.ticks_per_beat())
            .unwrap_or(super::PPQN);
        self.shared.tick_count() / ticks_per_beat as u64
    }

    pub fn current_part_index(&self) -> usize {
        self.shared.part_index()
    }

    pub fn playback_position_ms(&self) -> f64 {
        self.timeline
            .as_ref()
            .map(|timeline| timeline.position_ms_at_tick(self.shared.tick_count()))
            .unwrap_or(0.0)
    }

    /// Song position including the frames counted since the last tick
    pub fn precise_position_ms(&self) -> f64 {
        self.playback_position_ms()
            + self.shared.sub_tick_samples() * 1000.0 / self.sample_rate as f64
    }

    pub fn is_song_ended(&self) -> bool {
        match &self.timeline {
            Some(timeline) => {
                self.shared.enabled() && self.shared.part_index() == timeline.last_index()
            }
            None => false,
        }
    }

    pub fn loop_end_reached(&self) -> bool {
        self.shared.loop_end_reached()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled()
    }

    pub fn loop_mode(&self) -> bool {
        self.shared.loop_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::SongPart;
    use crate::timing::events::ClockEvent;

    // 1000 samples per tick at 120 BPM
    fn config() -> ClockConfig {
        ClockConfig {
            sample_rate: 48000,
            ..ClockConfig::default()
        }
    }

    fn timeline() -> Arc<SongTimeline> {
        let parts = vec![
            SongPart::new("Intro", 0, 120.0),
            SongPart::new("Verse", 96, 120.0),
            SongPart::sentinel(240, 120.0),
        ];
        Arc::new(SongTimeline::new("song", parts, 24, &[]).unwrap())
    }

    #[test]
    fn test_replaced_songs_are_released_on_control_side() {
        let (mut handle, mut runner) = clock_channel(config());
        let mut events: Vec<ClockEvent> = Vec::new();

        let first = timeline();
        let first_ref = Arc::downgrade(&first);
        handle.set_new_song(first);
        runner.process(0, &mut events);

        // Two loads before the audio side catches up
        let second = timeline();
        let second_ref = Arc::downgrade(&second);
        handle.set_new_song(second);
        handle.set_new_song(timeline());
        assert_eq!(handle.retired_count(), 2);

        // Still held by the runner and the command ring
        handle.release_retired();
        assert_eq!(handle.retired_count(), 2);

        // The runner lets go of both without freeing either
        runner.process(0, &mut events);
        assert_eq!(first_ref.strong_count(), 1);
        assert_eq!(second_ref.strong_count(), 1);

        handle.release_retired();
        assert_eq!(handle.retired_count(), 0);
        assert!(first_ref.upgrade().is_none());
        assert!(second_ref.upgrade().is_none());
    }

    #[test]
    fn test_commands_reach_audio_side() {
        let (mut handle, mut runner) = clock_channel(config());
        handle.set_new_song(timeline());
        handle.set_current_part(1);

        let mut events: Vec<ClockEvent> = Vec::new();
        runner.process(0, &mut events);

        assert_eq!(runner.clock().current_part_index(), 1);
        assert_eq!(runner.clock().tick_count(), 96);
        assert_eq!(handle.current_part_index(), 1);
        assert_eq!(handle.tick_count(), 96);
    }

    #[test]
    fn test_enable_is_seen_by_runner() {
        let (mut handle, mut runner) = clock_channel(config());
        handle.set_new_song(timeline());
        handle.set_enabled(true);

        let mut events: Vec<ClockEvent> = Vec::new();
        runner.process(1000 * 10, &mut events);
        assert_eq!(handle.tick_count(), 10);

        handle.set_enabled(false);
        runner.process(1000 * 10, &mut events);
        assert_eq!(handle.tick_count(), 10);
    }

    #[test]
    fn test_staged_correction_is_consumed_once() {
        let (mut handle, mut runner) = clock_channel(config());
        handle.set_new_song(timeline());
        handle.set_enabled(true);

        let mut events: Vec<ClockEvent> = Vec::new();
        runner.process(1000, &mut events);
        assert_eq!(handle.tick_count(), 1);

        // Audio is ~1.44 ticks ahead of the clock: shorten the next interval
        let decision = handle
            .correct_ticks_to_playback_position(handle.playback_position_ms() + 30.0)
            .unwrap();
        assert_eq!(decision.correction, -2);
        assert_eq!(handle.shared().staged_correction(), -2);

        // The tick in progress still runs at 1000; the following one at 998
        runner.process(1000, &mut events);
        assert_eq!(handle.tick_count(), 2);
        assert_eq!(handle.shared().staged_correction(), 0);
        assert_eq!(handle.shared().active_correction(), -2);
        runner.process(998, &mut events);
        assert_eq!(handle.tick_count(), 3);
        assert_eq!(handle.shared().active_correction(), 0);
    }

    #[test]
    fn test_correction_accounts_for_frames_since_tick() {
        let (mut handle, mut runner) = clock_channel(config());
        handle.set_new_song(timeline());
        handle.set_enabled(true);

        let mut events: Vec<ClockEvent> = Vec::new();
        runner.process(4800, &mut events);
        assert_eq!(handle.tick_count(), 4);
        assert_eq!(handle.shared().sub_tick_samples(), 800.0);

        // Audio at 100ms is exactly where the clock is, 800 frames past tick 4
        let decision = handle.correct_ticks_to_playback_position(100.0).unwrap();
        assert!(decision.delay_ms.abs() < 1e-9);
        assert_eq!(decision.correction, 0);
    }

    #[test]
    fn test_new_song_is_visible_before_audio_runs() {
        let (mut handle, _runner) = clock_channel(config());
        handle.set_new_song(timeline());
        handle.set_current_part(2);
        handle.set_enabled(true);
        assert!(handle.is_song_ended());

        handle.set_new_song(timeline());
        assert_eq!(handle.current_part_index(), 0);
        assert!(!handle.is_song_ended());
    }

    #[test]
    fn test_correction_without_song_is_noop() {
        let (handle, _runner) = clock_channel(config());
        assert!(handle.correct_ticks_to_playback_position(1000.0).is_none());
        assert!(!handle.is_song_ended());
    }
}
