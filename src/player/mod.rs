// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Playback orchestration.
//!
//! The `Player` owns the audio engine, the clock handle, the MIDI dispatcher
//! and the video resync controller. It loads songs from the setlist, starts
//! and stops all of them together, and once per UI frame feeds the audio
//! position into both correction loops.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rtrb::RingBuffer;
use tracing::{error, info, warn};

use crate::audio::AudioEngine;
use crate::config::{Settings, Setlist, SongPaths, StemVolumes, StructureFile};
use crate::midi::{MidiDispatcher, MidiOutput, MidirOutput, OutputPort, Transport};
use crate::song::SongTimeline;
use crate::timing::{clock_channel, ClockEvent, ClockHandle, CorrectionDecision};
use crate::video::{Playhead, VideoDecoder, VideoResyncController};

/// Capacity of the clock event ring
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Correction runs while the beat count is a multiple of this
const CORRECTION_BEAT_INTERVAL: u64 = 4;

/// Coarse player state for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Nothing loaded, or the last load failed
    NoSong,
    /// Song loaded, transport stopped
    Ready,
    Playing,
}

/// Values shown in the sync diagnostics panel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SyncDiagnostics {
    /// Last clock drift measurement
    pub clock: Option<CorrectionDecision>,
    pub staged_correction: i8,
    pub active_correction: i8,
    pub audio_position_ms: f64,
    pub video_loaded: bool,
    pub video_delay_ms: f64,
    pub video_speed: f64,
}

/// Song currently loaded
struct LoadedSong {
    paths: SongPaths,
    timeline: Arc<SongTimeline>,
    has_video: bool,
}

/// Playback orchestrator
pub struct Player<D: VideoDecoder = Playhead> {
    settings: Settings,
    setlist: Setlist,
    song_index: usize,
    song: Option<LoadedSong>,
    clock: ClockHandle,
    audio: AudioEngine,
    midi: MidiDispatcher,
    video: VideoResyncController<D>,
    playing: bool,
    auto_play_next: bool,
    video_resync: bool,
    last_correction: Option<CorrectionDecision>,
    status: Option<String>,
}

impl Player<Playhead> {
    /// Open the devices named in the settings.
    ///
    /// A missing audio device or MIDI port is logged; the player then runs
    /// without it.
    pub fn open(settings: Settings) -> Result<Self> {
        let setlist = match Setlist::load(&settings.setlist_path(), &settings.songs_root_dir) {
            Ok(setlist) => setlist,
            Err(e) => {
                error!("No setlist: {:#}", e);
                Setlist::default()
            }
        };
        info!(songs = setlist.len(), "Setlist loaded");

        let outputs = open_outputs(&settings);

        let (clock, runner) = clock_channel(settings.clock);
        let (events_tx, events_rx) = RingBuffer::<ClockEvent>::new(EVENT_QUEUE_CAPACITY);
        let (mut clock, audio, events_rx) =
            match AudioEngine::start(&settings.audio, runner, events_tx) {
                Ok(audio) => (clock, audio, events_rx),
                Err(e) => {
                    error!("Audio output unavailable, running without sound: {}", e);
                    let (clock, runner) = clock_channel(settings.clock);
                    let (events_tx, events_rx) = RingBuffer::new(EVENT_QUEUE_CAPACITY);
                    let audio = AudioEngine::offline(settings.audio.sample_rate, runner, events_tx);
                    (clock, audio, events_rx)
                }
            };
        clock.set_sample_rate(audio.sample_rate());

        let midi = MidiDispatcher::spawn(Transport::new(outputs), events_rx)?;
        let video = Playhead::new();
        Ok(Self::from_parts(settings, setlist, clock, audio, midi, video))
    }
}

/// Open every configured MIDI output; failures leave the port closed
fn open_outputs(settings: &Settings) -> Vec<OutputPort> {
    settings
        .midi_outputs
        .iter()
        .map(|config| {
            let output: Option<Box<dyn MidiOutput>> = match MidirOutput::open(&config.port) {
                Ok(output) => {
                    info!(id = %config.id, port = output.name(), "MIDI output opened");
                    Some(Box::new(output))
                }
                Err(e) => {
                    warn!("MIDI output '{}' unavailable: {:#}", config.id, e);
                    None
                }
            };
            OutputPort::new(
                config.id.clone(),
                config.channel_index(),
                config.send_ticks,
                config.exit_program_number(),
                output,
            )
        })
        .collect()
}

impl<D: VideoDecoder> Player<D> {
    /// Assemble a player from already opened parts
    pub fn from_parts(
        settings: Settings,
        setlist: Setlist,
        clock: ClockHandle,
        audio: AudioEngine,
        midi: MidiDispatcher,
        decoder: D,
    ) -> Self {
        let video = VideoResyncController::new(decoder, settings.video);
        Self {
            auto_play_next: settings.auto_play_next,
            video_resync: settings.video_resync,
            settings,
            setlist,
            song_index: 0,
            song: None,
            clock,
            audio,
            midi,
            video,
            playing: false,
            last_correction: None,
            status: None,
        }
    }

    /// Load the song at the current setlist index
    pub fn load_song(&mut self) -> Result<()> {
        self.stop_playback();
        self.video.close_video();
        self.song = None;
        self.last_correction = None;

        let result = self.load_current();
        match &result {
            Ok(()) => self.status = None,
            Err(e) => {
                error!("Song not loaded: {:#}", e);
                self.status = Some(format!("{:#}", e));
            }
        }
        result
    }

    fn load_current(&mut self) -> Result<()> {
        let name = self
            .setlist
            .get(self.song_index)
            .ok_or_else(|| anyhow!("Setlist has no song {}", self.song_index + 1))?
            .to_string();
        let paths = SongPaths::new(&self.settings.songs_root_dir, name.as_str());

        let structure = StructureFile::load(paths.structure())?;
        let timeline = Arc::new(structure.to_timeline(
            &name,
            self.settings.clock.ticks_per_beat,
            &self.settings.output_profiles(),
        )?);

        match paths.audio_files(self.settings.stem_mode) {
            Ok(files) => {
                let volumes = StemVolumes::load_or_default(paths.volumes());
                self.audio
                    .load(&files, &volumes)
                    .with_context(|| format!("Failed to load audio for '{}'", name))?;
            }
            Err(e) => {
                warn!("Playing '{}' without audio: {:#}", name, e);
                self.audio.unload()?;
            }
        }

        let clip = paths.video_clip();
        let has_video = clip.is_file() && self.video.load_video(&clip);
        if has_video {
            let length_ms = timeline.part_start_ms(timeline.last_index());
            self.video.decoder_mut().hint_duration_ms(length_ms);
        }

        self.clock.set_new_song(Arc::clone(&timeline));
        self.midi.stop();
        self.midi.set_timeline(Arc::clone(&timeline));
        self.midi.send_patches(0);

        info!(song = %name, parts = timeline.len(), video = has_video, "Song loaded");
        self.song = Some(LoadedSong {
            paths,
            timeline,
            has_video,
        });
        Ok(())
    }

    /// Select a setlist entry and load it
    pub fn load_song_at(&mut self, index: usize) -> Result<()> {
        if index >= self.setlist.len() {
            return Ok(());
        }
        self.song_index = index;
        self.load_song()
    }

    /// Start audio, clock, MIDI and video at the start of the current part
    pub fn start_playback(&mut self) {
        if self.playing {
            return;
        }
        let Some(song) = &self.song else {
            warn!("No song loaded, cannot start");
            return;
        };
        let timeline = Arc::clone(&song.timeline);
        let has_video = song.has_video;

        let mut part = self.clock.current_part_index();
        if part >= timeline.last_index() {
            part = 0;
        }
        let start_ms = timeline.part_start_ms(part);

        self.clock.set_current_part(part);
        self.midi.start();
        if has_video {
            self.video
                .play_video(start_ms + self.settings.video_start_delay_ms);
        }
        if let Err(e) = self.audio.seek_ms(start_ms).and_then(|_| self.audio.play()) {
            warn!("Audio did not start: {}", e);
        }
        self.clock.set_enabled(true);
        self.playing = true;
        info!(part, start_ms, "Playback started");
    }

    /// Stop everything; positions stay where they are
    pub fn stop_playback(&mut self) {
        self.clock.set_enabled(false);
        if !self.playing {
            return;
        }
        self.midi.stop();
        if let Err(e) = self.audio.stop() {
            warn!("Audio did not stop: {}", e);
        }
        self.video.stop_video();
        self.playing = false;
        info!("Playback stopped");
    }

    /// Stop and load the current song again
    pub fn reload(&mut self) -> Result<()> {
        self.stop_playback();
        self.load_song()
    }

    /// Move to the next real part, restarting playback if it was running
    pub fn jump_to_next_part(&mut self) {
        let Some(song) = &self.song else {
            return;
        };
        let next = self.clock.current_part_index() + 1;
        if next >= song.timeline.last_index() {
            return;
        }

        let was_playing = self.playing;
        self.stop_playback();
        self.clock.set_current_part(next);
        self.midi.send_patches(next);
        if was_playing {
            self.start_playback();
        }
    }

    /// Stop and load the previous song
    pub fn previous_song(&mut self) -> Result<()> {
        self.stop_playback();
        if self.song_index == 0 {
            return Ok(());
        }
        self.song_index -= 1;
        self.load_song()
    }

    /// Stop and load the next song
    pub fn next_song(&mut self) -> Result<()> {
        self.stop_playback();
        if self.song_index + 1 >= self.setlist.len() {
            return Ok(());
        }
        self.song_index += 1;
        self.load_song()
    }

    /// Stop, load the next song and start it
    pub fn play_next_song(&mut self) -> Result<()> {
        self.stop_playback();
        if self.song_index + 1 >= self.setlist.len() {
            return Ok(());
        }
        self.song_index += 1;
        self.load_song()?;
        self.start_playback();
        Ok(())
    }

    /// Load a setlist entry and start it
    pub fn play_song_at(&mut self, index: usize) -> Result<()> {
        if index >= self.setlist.len() {
            return Ok(());
        }
        self.load_song_at(index)?;
        self.start_playback();
        Ok(())
    }

    /// Per-frame work: song end, loop end, drift correction and video resync
    pub fn update(&mut self) {
        self.audio.collect_garbage();
        self.clock.release_retired();
        if !self.playing {
            return;
        }

        if self.clock.is_song_ended() {
            info!("Song ended");
            self.stop_playback();
            if self.auto_play_next {
                if let Err(e) = self.play_next_song() {
                    warn!("Auto-play failed: {:#}", e);
                }
            }
            return;
        }

        if self.clock.loop_end_reached() {
            // Replay the last real part
            self.stop_playback();
            self.start_playback();
            return;
        }

        if self.clock.beat_count() % CORRECTION_BEAT_INTERVAL == 0 {
            let audio_ms = self.audio.position_ms();
            if let Some(decision) = self.clock.correct_ticks_to_playback_position(audio_ms) {
                self.last_correction = Some(decision);
            }
        }

        let song_ms = self.clock.precise_position_ms();
        self.video.update(self.video_resync, song_ms);
    }

    /// Render audio when no device is attached
    pub fn pump_audio(&mut self, frames: usize) {
        self.audio.pump(frames);
    }

    pub fn toggle_auto_play(&mut self) -> bool {
        self.auto_play_next = !self.auto_play_next;
        info!(enabled = self.auto_play_next, "Auto-play toggled");
        self.auto_play_next
    }

    pub fn toggle_video_resync(&mut self) -> bool {
        self.video_resync = !self.video_resync;
        info!(enabled = self.video_resync, "Video resync toggled");
        self.video_resync
    }

    pub fn toggle_loop(&mut self) -> bool {
        let enabled = !self.clock.loop_mode();
        self.clock.set_loop_mode(enabled);
        info!(enabled, "Loop mode toggled");
        enabled
    }

    pub fn state(&self) -> PlayerState {
        match (&self.song, self.playing) {
            (None, _) => PlayerState::NoSong,
            (Some(_), false) => PlayerState::Ready,
            (Some(_), true) => PlayerState::Playing,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn auto_play_next(&self) -> bool {
        self.auto_play_next
    }

    pub fn video_resync(&self) -> bool {
        self.video_resync
    }

    pub fn loop_mode(&self) -> bool {
        self.clock.loop_mode()
    }

    pub fn setlist(&self) -> &Setlist {
        &self.setlist
    }

    pub fn song_index(&self) -> usize {
        self.song_index
    }

    pub fn song_name(&self) -> Option<&str> {
        self.song.as_ref().map(|song| song.timeline.name())
    }

    pub fn song_dir(&self) -> Option<&SongPaths> {
        self.song.as_ref().map(|song| &song.paths)
    }

    pub fn timeline(&self) -> Option<&Arc<SongTimeline>> {
        self.song.as_ref().map(|song| &song.timeline)
    }

    pub fn clock(&self) -> &ClockHandle {
        &self.clock
    }

    pub fn audio(&self) -> &AudioEngine {
        &self.audio
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Last load error, for the status bar
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn diagnostics(&self) -> SyncDiagnostics {
        let shared = self.clock.shared();
        SyncDiagnostics {
            clock: self.last_correction,
            staged_correction: shared.staged_correction(),
            active_correction: shared.active_correction(),
            audio_position_ms: self.audio.position_ms(),
            video_loaded: self.video.is_loaded(),
            video_delay_ms: self.video.measured_delay_ms(),
            video_speed: self.video.speed(),
        }
    }

    /// Stop the devices and send exit programs
    pub fn shutdown(&mut self) {
        self.stop_playback();
        self.video.close_video();
        self.midi.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::messages;
    use crate::midi::mock::MockMidiOutput;
    use crate::timing::ClockConfig;
    use crate::video::mock::MockDecoder;
    use std::fs;
    use std::path::Path;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    // 48kHz at 120 BPM: 1000 frames per tick, parts at ticks 0, 96, end 192
    const STRUCTURE: &str = r#"
parts:
  - name: Intro
    beat: 0
    bpm: 120
    program: A01
  - name: Verse
    beat: 4
    bpm: 120
    program: A02
  - name: End
    beat: 8
"#;

    fn write_song(root: &Path, name: &str, with_clip: bool) {
        let export = root.join(name).join("export");
        fs::create_dir_all(export.join("audio")).unwrap();
        fs::write(export.join("structure.yaml"), STRUCTURE).unwrap();

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(export.join("audio/master.wav"), spec).unwrap();
        for _ in 0..48000 * 2 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        if with_clip {
            fs::create_dir_all(export.join("clip")).unwrap();
            fs::write(export.join("clip/clip.mp4"), b"").unwrap();
        }
    }

    fn settings(root: &Path) -> Settings {
        let yaml = format!(
            r#"
songs_root_dir: {}
audio:
  sample_rate: 48000
midi_outputs:
  - id: seq
    port: "0"
    send_ticks: true
    patch_format: bank
    follow_song_program: true
"#,
            root.display()
        );
        Settings::from_yaml(&yaml).unwrap()
    }

    fn player(songs: &[&str]) -> (Player<MockDecoder>, MockMidiOutput, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        for song in songs {
            write_song(dir.path(), song, true);
        }
        let settings = settings(dir.path());
        let setlist = Setlist::scan(dir.path()).unwrap();

        let config = ClockConfig {
            sample_rate: 48000,
            ..settings.clock
        };
        let (clock, runner) = clock_channel(config);
        let (tx, rx) = RingBuffer::new(EVENT_QUEUE_CAPACITY);
        let audio = AudioEngine::offline(48000, runner, tx);

        let output = MockMidiOutput::new();
        let port = OutputPort::new("seq", 9, true, Some(95), Some(Box::new(output.clone())));
        let midi = MidiDispatcher::spawn(Transport::new(vec![port]), rx).unwrap();

        let player = Player::from_parts(
            settings,
            setlist,
            clock,
            audio,
            midi,
            MockDecoder::with_duration(4000.0),
        );
        (player, output, dir)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_load_song_sends_first_patch() {
        let (mut player, output, _dir) = player(&["a"]);
        assert_eq!(player.state(), PlayerState::NoSong);

        player.load_song().unwrap();
        assert_eq!(player.state(), PlayerState::Ready);
        assert_eq!(player.song_name(), Some("a"));
        assert!(player.diagnostics().video_loaded);
        assert!(wait_for(|| output
            .get_messages()
            .contains(&vec![messages::PROGRAM_CHANGE | 9, 0])));
    }

    #[test]
    fn test_start_runs_clock_with_audio() {
        let (mut player, output, _dir) = player(&["a"]);
        player.load_song().unwrap();
        player.start_playback();
        assert_eq!(player.state(), PlayerState::Playing);
        assert!(wait_for(|| output
            .get_messages()
            .iter()
            .filter(|m| m[0] == messages::START)
            .count()
            == 2));

        player.pump_audio(10_000);
        assert_eq!(player.clock().tick_count(), 10);
        assert!((player.audio().position_ms() - 208.333).abs() < 0.01);

        // Rewind sequence, then start, then pulses after the startup ticks
        assert!(wait_for(|| output
            .get_messages()
            .iter()
            .filter(|m| m[0] == messages::TIMING_CLOCK)
            .count()
            == 1 + 6));
        let messages = output.get_messages();
        let start = messages
            .iter()
            .position(|m| m[0] == messages::START)
            .unwrap();
        assert_eq!(
            messages[start..start + 4],
            [
                vec![messages::START],
                vec![messages::TIMING_CLOCK],
                vec![messages::STOP],
                vec![messages::START]
            ]
        );
    }

    #[test]
    fn test_update_runs_correction_on_bar_boundaries() {
        let (mut player, _output, _dir) = player(&["a"]);
        player.load_song().unwrap();
        player.start_playback();

        player.pump_audio(4_800);
        player.update();
        let decision = player.diagnostics().clock.unwrap();
        assert_eq!(decision.correction, 0);
        assert!(decision.delay_ms.abs() < 1e-6);

        // Beat 5 is not a correction beat
        player.pump_audio(120_000);
        player.update();
        assert_eq!(player.clock().beat_count(), 5);
        assert_eq!(player.diagnostics().clock, Some(decision));
    }

    #[test]
    fn test_song_end_stops_playback() {
        let (mut player, _output, _dir) = player(&["a", "b"]);
        player.load_song().unwrap();
        player.start_playback();

        // The end marker is entered one lookahead beat before tick 192
        player.pump_audio(170_000);
        assert!(player.clock().is_song_ended());
        player.update();
        assert_eq!(player.state(), PlayerState::Ready);
        assert_eq!(player.song_index(), 0);
    }

    #[test]
    fn test_song_end_auto_plays_next() {
        let (mut player, _output, _dir) = player(&["a", "b"]);
        player.toggle_auto_play();
        player.load_song().unwrap();
        player.start_playback();

        player.pump_audio(170_000);
        player.update();
        assert_eq!(player.song_index(), 1);
        assert_eq!(player.song_name(), Some("b"));
        assert_eq!(player.state(), PlayerState::Playing);
        assert_eq!(player.clock().tick_count(), 0);
    }

    #[test]
    fn test_update_releases_replaced_songs() {
        let (mut player, _output, _dir) = player(&["a", "b", "c"]);
        player.load_song().unwrap();
        player.pump_audio(0);

        // Two loads before the audio side sees either
        player.next_song().unwrap();
        player.next_song().unwrap();
        assert_eq!(player.clock().retired_count(), 2);

        player.pump_audio(0);
        assert!(wait_for(|| {
            player.update();
            player.clock().retired_count() == 0
        }));
        assert_eq!(player.song_name(), Some("c"));
    }

    #[test]
    fn test_jump_to_next_part_while_stopped() {
        let (mut player, _output, _dir) = player(&["a"]);
        player.load_song().unwrap();

        player.jump_to_next_part();
        assert_eq!(player.clock().current_part_index(), 1);
        assert_eq!(player.clock().tick_count(), 96);

        // The end marker is not a part to jump to
        player.jump_to_next_part();
        assert_eq!(player.clock().current_part_index(), 1);

        player.start_playback();
        player.pump_audio(0);
        assert_eq!(player.audio().position_ms(), 2000.0);
    }

    #[test]
    fn test_loop_end_replays_last_part() {
        let (mut player, _output, _dir) = player(&["a"]);
        player.load_song().unwrap();
        assert!(player.toggle_loop());
        player.start_playback();

        player.pump_audio(170_000);
        assert!(player.clock().loop_end_reached());
        assert_eq!(player.clock().current_part_index(), 1);

        player.update();
        assert!(player.is_playing());
        assert_eq!(player.clock().tick_count(), 96);
        player.pump_audio(0);
        assert!(!player.clock().loop_end_reached());
        assert_eq!(player.audio().position_ms(), 2000.0);
    }

    #[test]
    fn test_navigation_bounds() {
        let (mut player, _output, _dir) = player(&["a", "b"]);
        player.load_song().unwrap();
        player.previous_song().unwrap();
        assert_eq!(player.song_index(), 0);

        player.next_song().unwrap();
        assert_eq!(player.song_name(), Some("b"));
        player.next_song().unwrap();
        assert_eq!(player.song_index(), 1);

        player.play_song_at(0).unwrap();
        assert_eq!(player.song_name(), Some("a"));
        assert!(player.is_playing());
        player.play_song_at(7).unwrap();
        assert_eq!(player.song_index(), 0);
    }

    #[test]
    fn test_broken_song_prevents_start() {
        let (mut player, _output, dir) = player(&["a"]);
        fs::write(
            dir.path().join("a/export/structure.yaml"),
            "parts:\n  - name: A\n    beat: 0\n    bpm: 0\n  - name: End\n    beat: 4\n",
        )
        .unwrap();

        assert!(player.load_song().is_err());
        assert_eq!(player.state(), PlayerState::NoSong);
        assert!(player.status().is_some());
        player.start_playback();
        assert!(!player.is_playing());
    }

    #[test]
    fn test_toggles() {
        let (mut player, _output, _dir) = player(&["a"]);
        assert!(player.video_resync());
        assert!(!player.toggle_video_resync());
        assert!(player.toggle_auto_play());
        assert!(player.toggle_loop());
        assert!(player.loop_mode());
    }

    #[test]
    fn test_shutdown_sends_exit_program() {
        let (mut player, output, _dir) = player(&["a"]);
        player.load_song().unwrap();
        player.start_playback();
        player.shutdown();

        let messages = output.get_messages();
        assert_eq!(messages.last(), Some(&vec![messages::PROGRAM_CHANGE | 9, 95]));
    }
}
