// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Integration tests for stagesync
//!
//! These tests verify that multiple components work together correctly,
//! using only the public API of the crate and no audio or MIDI hardware.

use std::path::Path;
use std::sync::{Arc, Mutex};

use stagesync::config::{Settings, StructureFile};
use stagesync::midi::{messages, MidiOutput, OutputPort, Transport, TransportCommand};
use stagesync::song::SongTimeline;
use stagesync::timing::{clock_channel, ClockConfig, ClockEvent, ClockHandle, ClockRunner};
use stagesync::ui::TransportState;
use stagesync::video::{VideoDecoder, VideoError, VideoResyncController, VideoSyncConfig};

const SETTINGS: &str = r#"
songs_root_dir: /srv/songs
audio:
  sample_rate: 48000
midi_outputs:
  - id: synth
    port: "Digitakt"
    channel: 10
    send_ticks: true
    exit_program: F16
    patch_format: bank
    follow_song_program: true
"#;

const STRUCTURE: &str = r#"
name: "Night Drive"
parts:
  - name: Intro
    beat: 0
    bpm: 120
    program: A01
    patches:
      synth: A03
  - name: Verse
    beat: 4
    bpm: 120
    program: A02
  - name: End
    beat: 8
"#;

/// MIDI output recording every message into a shared log
#[derive(Clone, Default)]
struct RecordingOutput {
    log: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingOutput {
    fn messages(&self) -> Vec<Vec<u8>> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, message: &[u8]) -> usize {
        self.messages().iter().filter(|m| m.as_slice() == message).count()
    }
}

impl MidiOutput for RecordingOutput {
    fn send(&mut self, message: &[u8]) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(message.to_vec());
        Ok(())
    }
}

/// Video decoder whose position is set by the test
#[derive(Default)]
struct ScriptedDecoder {
    loaded: bool,
    position_ms: f64,
    speed: f64,
}

impl VideoDecoder for ScriptedDecoder {
    fn load(&mut self, _path: &Path) -> Result<(), VideoError> {
        self.loaded = true;
        Ok(())
    }
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn seek_ms(&mut self, position_ms: f64) {
        self.position_ms = position_ms;
    }
    fn position(&self) -> f64 {
        self.position_ms / self.duration_ms()
    }
    fn duration_ms(&self) -> f64 {
        10_000.0
    }
    fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }
    fn close(&mut self) {
        self.loaded = false;
    }
    fn is_loaded(&self) -> bool {
        self.loaded
    }
}

fn settings() -> Settings {
    let settings = Settings::from_yaml(SETTINGS).unwrap();
    settings.validate().unwrap();
    settings
}

fn timeline(settings: &Settings) -> Arc<SongTimeline> {
    let structure = StructureFile::from_yaml(STRUCTURE).unwrap();
    Arc::new(
        structure
            .to_timeline("night-drive", 24, &settings.output_profiles())
            .unwrap(),
    )
}

fn clock(settings: &Settings) -> (ClockHandle, ClockRunner) {
    let config = ClockConfig {
        sample_rate: settings.audio.sample_rate,
        ..settings.clock
    };
    clock_channel(config)
}

/// Advance the clock in audio-sized blocks, collecting its events
fn run_frames(runner: &mut ClockRunner, frames: usize) -> Vec<ClockEvent> {
    let mut events = Vec::new();
    let mut remaining = frames;
    while remaining > 0 {
        let block = remaining.min(512);
        runner.process(block, &mut events);
        remaining -= block;
    }
    events
}

#[test]
fn test_structure_to_midi_transport() {
    let settings = settings();
    let timeline = timeline(&settings);
    let (mut handle, mut runner) = clock(&settings);

    let device = RecordingOutput::default();
    let config = &settings.midi_outputs[0];
    let port = OutputPort::new(
        config.id.clone(),
        config.channel_index(),
        config.send_ticks,
        config.exit_program_number(),
        Some(Box::new(device.clone())),
    );
    let mut transport = Transport::new(vec![port]);

    transport.handle_command(TransportCommand::SetTimeline(Arc::clone(&timeline)));
    transport.handle_command(TransportCommand::SendPatches(0));
    assert_eq!(device.messages(), vec![vec![0xC9, 2]]);

    handle.set_new_song(Arc::clone(&timeline));
    handle.set_enabled(true);
    transport.handle_command(TransportCommand::Start);

    // 1000 samples per tick at 48 kHz and 120 BPM; the part change to the
    // verse at tick 96 is signalled one beat early
    for event in run_frames(&mut runner, 72_000) {
        transport.handle_event(event);
    }
    assert_eq!(handle.tick_count(), 72);
    assert_eq!(handle.current_part_index(), 1);
    assert_eq!(transport.pulses_sent(), 68);
    assert_eq!(device.count(&[messages::TIMING_CLOCK]), 69);
    assert_eq!(device.count(&[0xC9, 1]), 1);

    // The end marker sends no program change
    for event in run_frames(&mut runner, 96_000) {
        transport.handle_event(event);
    }
    assert_eq!(handle.tick_count(), 168);
    assert!(handle.is_song_ended());
    assert_eq!(device.messages().iter().filter(|m| m[0] == 0xC9).count(), 2);

    assert!(!transport.handle_command(TransportCommand::Shutdown));
    let messages = device.messages();
    assert_eq!(messages[messages.len() - 2], vec![messages::STOP]);
    assert_eq!(messages[messages.len() - 1], vec![0xC9, 95]);
}

#[test]
fn test_drift_correction_adjusts_next_tick() {
    let settings = settings();
    let (mut handle, mut runner) = clock(&settings);
    handle.set_new_song(timeline(&settings));
    handle.set_enabled(true);

    run_frames(&mut runner, 72_000);
    let in_sync = handle.correct_ticks_to_playback_position(1500.0).unwrap();
    assert!(in_sync.delay_ms.abs() < 1e-9);
    assert_eq!(in_sync.correction, 0);

    // Audio 30 ms ahead is more than one tick: shorten ticks by 2 samples
    let ahead = handle.correct_ticks_to_playback_position(1530.0).unwrap();
    assert!((ahead.ticks_late - 1.44).abs() < 1e-9);
    assert_eq!(ahead.correction, -2);
    assert_eq!(handle.shared().staged_correction(), -2);

    // Staged at the next tick boundary, used once for the following tick
    run_frames(&mut runner, 1000);
    assert_eq!(handle.tick_count(), 73);
    assert_eq!(handle.shared().staged_correction(), 0);
    assert_eq!(handle.shared().active_correction(), -2);
    run_frames(&mut runner, 998);
    assert_eq!(handle.tick_count(), 74);
    assert_eq!(handle.shared().active_correction(), 0);
}

#[test]
fn test_jump_and_loop_mode() {
    let settings = settings();
    let (mut handle, mut runner) = clock(&settings);
    handle.set_new_song(timeline(&settings));
    handle.set_current_part(1);
    handle.set_loop_mode(true);
    handle.set_enabled(true);

    let events = run_frames(&mut runner, 72_000);
    assert_eq!(handle.tick_count(), 168);
    assert_eq!(handle.current_part_index(), 1);
    assert!(handle.loop_end_reached());
    assert!(!handle.is_song_ended());
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ClockEvent::LoopEndReached { part_index: 1 }))
            .count(),
        1
    );
}

#[test]
fn test_video_follows_audio() {
    let settings = settings();
    let mut video = VideoResyncController::new(ScriptedDecoder::default(), settings.video);
    assert!(video.load_video(Path::new("clip.mov")));
    video.play_video(0.0);
    assert_eq!(video.next_check_ms(), 3000.0);

    // Not due yet
    video.decoder_mut().position_ms = 2900.0;
    video.update(true, 2000.0);
    assert_eq!(video.speed(), 1.0);

    // Video 100 ms ahead: slow down
    video.decoder_mut().position_ms = 3100.0;
    let delay = video.update(true, 3000.0);
    assert!((delay - 100.0).abs() < 1e-6);
    assert!((video.speed() - 0.975).abs() < 1e-9);
    assert!((video.decoder().speed - 0.975).abs() < 1e-9);
    assert_eq!(video.next_check_ms(), 6000.0);

    // Back within the dead-band
    video.decoder_mut().position_ms = 6010.0;
    video.update(true, 6000.0);
    assert_eq!(video.speed(), 1.0);
    assert_eq!(video.next_check_ms(), 26_000.0);
}

#[test]
fn test_video_resync_disabled_forces_real_time() {
    let mut video = VideoResyncController::new(ScriptedDecoder::default(), VideoSyncConfig::default());
    video.load_video(Path::new("clip.mov"));
    video.play_video(0.0);
    video.decoder_mut().position_ms = 3500.0;
    let delay = video.update(false, 3000.0);
    assert!((delay - 500.0).abs() < 1e-6);
    assert_eq!(video.speed(), 1.0);
}

#[test]
fn test_transport_display_follows_clock() {
    let settings = settings();
    let timeline = timeline(&settings);
    let (mut handle, mut runner) = clock(&settings);
    handle.set_new_song(Arc::clone(&timeline));
    handle.set_enabled(true);
    run_frames(&mut runner, 120_000);

    let state = TransportState::from_timeline(
        &timeline,
        handle.tick_count(),
        handle.current_part_index(),
        true,
    );
    assert_eq!(state.song, "Night Drive");
    assert_eq!(state.part_name, "Verse");
    assert_eq!(state.part_count, 2);
    assert!((state.position_ms - 2500.0).abs() < 1e-6);
    assert!((state.progress() - 120.0 / 192.0).abs() < 1e-9);
}
