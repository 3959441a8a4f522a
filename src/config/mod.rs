// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration system for stagesync.
//!
//! This module provides data structures for loading the application
//! settings, song structures and the setlist.

pub mod song;

pub use song::{PartEntry, Setlist, SongPaths, StemVolumes, StructureFile};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::song::{OutputProfile, PatchProfile};
use crate::timing::ClockConfig;
use crate::video::VideoSyncConfig;

/// Application settings (`settings.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Directory holding one sub-directory per song
    #[serde(default = "default_songs_root_dir")]
    pub songs_root_dir: PathBuf,
    /// Setlist file; every song directory is used when absent
    #[serde(default)]
    pub setlist: Option<PathBuf>,
    /// Audio device settings
    #[serde(default)]
    pub audio: AudioConfig,
    /// MIDI destinations
    #[serde(default)]
    pub midi_outputs: Vec<MidiOutputConfig>,
    /// Tick clock tunables
    #[serde(default)]
    pub clock: ClockConfig,
    /// Video resync tunables
    #[serde(default)]
    pub video: VideoSyncConfig,
    /// Latency compensation added to the video start position
    #[serde(default)]
    pub video_start_delay_ms: f64,
    /// Play individual stems instead of the master mix
    #[serde(default = "default_true")]
    pub stem_mode: bool,
    /// Start the next song of the setlist when one ends
    #[serde(default)]
    pub auto_play_next: bool,
    /// Whether video speed follows the audio
    #[serde(default = "default_true")]
    pub video_resync: bool,
    /// UI refresh rate (frames per second)
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Log file
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

fn default_songs_root_dir() -> PathBuf {
    PathBuf::from("songs")
}
fn default_true() -> bool {
    true
}
fn default_frame_rate() -> u32 {
    24
}
fn default_log_file() -> PathBuf {
    PathBuf::from("stagesync.log")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            songs_root_dir: default_songs_root_dir(),
            setlist: None,
            audio: AudioConfig::default(),
            midi_outputs: Vec::new(),
            clock: ClockConfig::default(),
            video: VideoSyncConfig::default(),
            video_start_delay_ms: 0.0,
            stem_mode: default_true(),
            auto_play_next: false,
            video_resync: default_true(),
            frame_rate: default_frame_rate(),
            log_file: default_log_file(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;
        let settings = Self::from_yaml(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(settings) => settings,
            Err(e) => {
                error!("Using default settings: {:#}", e);
                Self::default()
            }
        }
    }

    /// Parse settings from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse settings YAML")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize settings to YAML")
    }

    /// Save settings to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write settings file: {:?}", path.as_ref()))
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for output in &self.midi_outputs {
            if !ids.insert(output.id.as_str()) {
                bail!("Duplicate MIDI output id '{}'", output.id);
            }
            if !(1..=16).contains(&output.channel) {
                bail!(
                    "MIDI output '{}': channel {} is not in 1-16",
                    output.id,
                    output.channel
                );
            }
            if let Some(exit) = &output.exit_program {
                if output.patching.resolve(exit).is_none() {
                    bail!(
                        "MIDI output '{}': exit program '{}' does not resolve",
                        output.id,
                        exit
                    );
                }
            }
        }
        if self.clock.ticks_per_beat == 0 {
            bail!("clock.ticks_per_beat must be positive");
        }
        if self.frame_rate == 0 {
            bail!("frame_rate must be positive");
        }
        let video = &self.video;
        if !(video.speed_divisor.is_finite() && video.speed_divisor > 0.0) {
            bail!("video.speed_divisor must be positive");
        }
        for (name, value) in [
            ("dead_band_ms", video.dead_band_ms),
            ("delay_cap_ms", video.delay_cap_ms),
            ("min_speed_offset", video.min_speed_offset),
            ("speed_change_delay_ms", video.speed_change_delay_ms),
            ("stable_check_interval_ms", video.stable_check_interval_ms),
            ("correction_check_interval_ms", video.correction_check_interval_ms),
            ("max_speed_deviation", video.max_speed_deviation),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                bail!("video.{} must be a non-negative number, got {}", name, value);
            }
        }
        if video.max_speed_deviation >= 1.0 {
            bail!("video.max_speed_deviation must be below 1.0");
        }
        Ok(())
    }

    /// Patch naming rules of every output, in configuration order
    pub fn output_profiles(&self) -> Vec<OutputProfile> {
        self.midi_outputs
            .iter()
            .map(MidiOutputConfig::profile)
            .collect()
    }

    /// Setlist file, relative paths taken from the songs root
    pub fn setlist_path(&self) -> PathBuf {
        match &self.setlist {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.songs_root_dir.join(path),
            None => self.songs_root_dir.join("setlist.yaml"),
        }
    }
}

/// Audio device settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Requested sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Requested buffer size in frames
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,
    /// Output device name; the system default when absent
    #[serde(default)]
    pub device: Option<String>,
}

fn default_sample_rate() -> u32 {
    44100
}
fn default_buffer_size() -> u32 {
    512
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            buffer_size: default_buffer_size(),
            device: None,
        }
    }
}

/// One MIDI destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MidiOutputConfig {
    /// Identifier referenced by part patch assignments
    pub id: String,
    /// Port index or name fragment
    pub port: String,
    /// MIDI channel (1-16)
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Whether clock pulses and START/STOP go to this device
    #[serde(default)]
    pub send_ticks: bool,
    /// Patch selected when the application exits
    #[serde(default)]
    pub exit_program: Option<String>,
    /// Patch naming rules
    #[serde(flatten)]
    pub patching: PatchProfile,
}

fn default_channel() -> u8 {
    10
}

impl MidiOutputConfig {
    pub fn profile(&self) -> OutputProfile {
        OutputProfile::new(self.id.clone(), self.patching.clone())
    }

    /// 0-based channel
    pub fn channel_index(&self) -> u8 {
        self.channel.saturating_sub(1).min(15)
    }

    /// Resolved exit program
    pub fn exit_program_number(&self) -> Option<u8> {
        self.exit_program
            .as_deref()
            .and_then(|patch| self.patching.resolve(patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::PatchFormat;

    #[test]
    fn test_parse_settings() {
        let yaml = r#"
songs_root_dir: /srv/show
audio:
  sample_rate: 48000
  device: "Scarlett"
midi_outputs:
  - id: seq
    port: "Digitakt"
    channel: 11
    send_ticks: true
    patch_format: bank
    follow_song_program: true
    exit_program: F16
  - id: synth
    port: "2"
    channel: 1
    patch_format: name
    patch_names:
      Pad: 4
      Lead: 12
    default_patch: Pad
video_start_delay_ms: 120
auto_play_next: true
"#;

        let settings = Settings::from_yaml(yaml).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.songs_root_dir, PathBuf::from("/srv/show"));
        assert_eq!(settings.audio.sample_rate, 48000);
        assert_eq!(settings.audio.buffer_size, 512);
        assert_eq!(settings.midi_outputs.len(), 2);

        let seq = &settings.midi_outputs[0];
        assert_eq!(seq.channel_index(), 10);
        assert!(seq.send_ticks);
        assert_eq!(seq.patching.patch_format, PatchFormat::Bank);
        assert_eq!(seq.exit_program_number(), Some(95));

        let synth = &settings.midi_outputs[1];
        assert_eq!(synth.patching.patch_names.get("Lead"), Some(&12));
        assert_eq!(synth.patching.default_patch.as_deref(), Some("Pad"));

        assert_eq!(settings.video_start_delay_ms, 120.0);
        assert!(settings.auto_play_next);
        assert!(settings.stem_mode);
    }

    #[test]
    fn test_default_values() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.clock.ticks_per_beat, 24);
        assert_eq!(settings.clock.ignored_startup_ticks, 4);
        assert_eq!(settings.video.dead_band_ms, 40.0);
        assert_eq!(settings.video.speed_divisor, 2800.0);
        assert_eq!(settings.frame_rate, 24);
        assert!(settings.video_resync);
    }

    #[test]
    fn test_partial_tunables_keep_defaults() {
        let yaml = r#"
clock:
  ignored_startup_ticks: 2
video:
  dead_band_ms: 25
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.clock.ignored_startup_ticks, 2);
        assert_eq!(settings.clock.part_change_lookahead_ticks, 24);
        assert_eq!(settings.video.dead_band_ms, 25.0);
        assert_eq!(settings.video.correction_check_interval_ms, 3000.0);
    }

    #[test]
    fn test_validate_rejects_bad_outputs() {
        let yaml = r#"
midi_outputs:
  - id: a
    port: "0"
  - id: a
    port: "1"
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert!(settings.validate().is_err());

        let yaml = r#"
midi_outputs:
  - id: a
    port: "0"
    channel: 17
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert!(settings.validate().is_err());

        let yaml = r#"
midi_outputs:
  - id: a
    port: "0"
    patch_format: bank
    exit_program: Z99
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_video_tunables() {
        for line in [
            "delay_cap_ms: -5",
            "delay_cap_ms: .nan",
            "max_speed_deviation: -0.1",
            "max_speed_deviation: .nan",
            "max_speed_deviation: 1.5",
            "dead_band_ms: -1",
            "dead_band_ms: .inf",
            "min_speed_offset: -0.01",
            "min_speed_offset: .nan",
            "speed_change_delay_ms: .nan",
            "stable_check_interval_ms: -20000",
            "correction_check_interval_ms: .nan",
            "speed_divisor: 0",
            "speed_divisor: .nan",
        ] {
            let yaml = format!("video:\n  {}\n", line);
            let settings = Settings::from_yaml(&yaml).unwrap();
            assert!(settings.validate().is_err(), "accepted {}", line);
        }

        let settings = Settings::from_yaml("video:\n  delay_cap_ms: 0\n  dead_band_ms: 0\n").unwrap();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_bad_video_tunables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(&path, "video:\n  delay_cap_ms: -5\n").unwrap();
        assert!(Settings::load(&path).is_err());
        assert_eq!(Settings::load_or_default(&path).video, VideoSyncConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_or_default(dir.path().join("missing.yaml"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");

        let mut settings = Settings::default();
        settings.auto_play_next = true;
        settings.video_start_delay_ms = 80.0;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_setlist_path() {
        let mut settings = Settings::default();
        assert_eq!(settings.setlist_path(), PathBuf::from("songs/setlist.yaml"));
        settings.setlist = Some(PathBuf::from("tour.yaml"));
        assert_eq!(settings.setlist_path(), PathBuf::from("songs/tour.yaml"));
    }
}
