// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Song directory files.
//!
//! Layout of one song under the songs root:
//!
//! ```text
//! <song>/export/structure.yaml   part list, last entry is the end marker
//! <song>/export/audio/*.wav      stems and/or master.wav
//! <song>/export/volumes.yaml     optional per-stem gain
//! <song>/export/clip/clip.mp4    optional video clip
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::song::{parse_bank_slot, OutputProfile, SongPart, SongTimeline};

/// Program used by parts that do not name one
pub const DEFAULT_PROGRAM: &str = "F16";

/// Master mix file name
pub const MASTER_STEM: &str = "master.wav";

/// Paths inside one song directory
#[derive(Debug, Clone, PartialEq)]
pub struct SongPaths {
    pub name: String,
    pub root: PathBuf,
}

impl SongPaths {
    pub fn new(songs_root_dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        let root = songs_root_dir.join(&name);
        Self { name, root }
    }

    fn export(&self) -> PathBuf {
        self.root.join("export")
    }

    pub fn structure(&self) -> PathBuf {
        self.export().join("structure.yaml")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.export().join("audio")
    }

    pub fn volumes(&self) -> PathBuf {
        self.export().join("volumes.yaml")
    }

    pub fn video_clip(&self) -> PathBuf {
        self.export().join("clip").join("clip.mp4")
    }

    /// WAV files to play.
    ///
    /// In stem mode every stem except the master mix is used, unless the
    /// master is the only file. Otherwise only the master mix is used.
    pub fn audio_files(&self, stem_mode: bool) -> Result<Vec<PathBuf>> {
        let dir = self.audio_dir();
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("Failed to read audio directory: {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("wav"))
                        .unwrap_or(false)
            })
            .collect();
        files.sort();

        let is_master = |path: &PathBuf| {
            path.file_name()
                .map(|name| name == MASTER_STEM)
                .unwrap_or(false)
        };

        let selected: Vec<PathBuf> = if stem_mode {
            if files.len() > 1 {
                files.into_iter().filter(|p| !is_master(p)).collect()
            } else {
                files
            }
        } else {
            files.into_iter().filter(is_master).collect()
        };

        if selected.is_empty() {
            bail!("No playable audio in {:?}", dir);
        }
        Ok(selected)
    }
}

/// One entry of `structure.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartEntry {
    /// Part name shown in the UI
    #[serde(default)]
    pub name: String,
    /// Start position in beats
    #[serde(default)]
    pub beat: Option<f64>,
    /// Start position in ticks, takes precedence over `beat`
    #[serde(default)]
    pub tick: Option<u64>,
    /// Tempo; may be omitted on the end marker
    #[serde(default)]
    pub bpm: f64,
    /// Song program in bank format
    #[serde(default = "default_program")]
    pub program: String,
    /// Per-output patch assignments
    #[serde(default)]
    pub patches: BTreeMap<String, String>,
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}

impl PartEntry {
    fn start_tick(&self, ticks_per_beat: u32) -> Option<u64> {
        match (self.tick, self.beat) {
            (Some(tick), _) => Some(tick),
            (None, Some(beat)) if beat.is_finite() && beat >= 0.0 => {
                Some((beat * ticks_per_beat as f64).round() as u64)
            }
            _ => None,
        }
    }
}

/// Song structure file (`structure.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StructureFile {
    /// Display name; the directory name when absent
    #[serde(default)]
    pub name: Option<String>,
    /// Parts in order, end marker last
    #[serde(default)]
    pub parts: Vec<PartEntry>,
}

impl StructureFile {
    /// Load a structure from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read structure file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Parse a structure from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse structure YAML")
    }

    /// Build the validated timeline
    pub fn to_timeline(
        &self,
        song_name: &str,
        ticks_per_beat: u32,
        outputs: &[OutputProfile],
    ) -> Result<SongTimeline> {
        let mut parts = Vec::with_capacity(self.parts.len());
        for (index, entry) in self.parts.iter().enumerate() {
            let start_tick = entry
                .start_tick(ticks_per_beat)
                .ok_or_else(|| anyhow!("Part {} ('{}') has no start position", index, entry.name))?;
            let program_id = parse_bank_slot(&entry.program).ok_or_else(|| {
                anyhow!(
                    "Part {} ('{}') has invalid program '{}'",
                    index,
                    entry.name,
                    entry.program
                )
            })?;

            let mut part = SongPart::new(entry.name.clone(), start_tick, entry.bpm)
                .with_program(program_id, entry.program.clone());
            for (output, patch) in &entry.patches {
                part = part.with_patch(output.clone(), patch.clone());
            }
            parts.push(part);
        }

        let name = self.name.as_deref().unwrap_or(song_name);
        SongTimeline::new(name, parts, ticks_per_beat, outputs)
            .with_context(|| format!("Invalid structure for song '{}'", name))
    }
}

/// Per-stem gain (`volumes.yaml`), keyed by file name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct StemVolumes {
    pub volumes: HashMap<String, f32>,
}

impl StemVolumes {
    /// Load volumes; a missing file means unity gain everywhere
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|yaml| serde_yaml::from_str(&yaml).map_err(anyhow::Error::from))
        {
            Ok(volumes) => volumes,
            Err(e) => {
                warn!("Ignoring stem volumes {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Gain of a stem, 1.0 when not listed
    pub fn gain(&self, stem: &str) -> f32 {
        self.volumes
            .get(stem)
            .copied()
            .filter(|gain| gain.is_finite())
            .map(|gain| gain.clamp(0.0, 4.0))
            .unwrap_or(1.0)
    }
}

/// Ordered list of song directory names
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Setlist {
    pub songs: Vec<String>,
}

impl Setlist {
    /// Parse a setlist from YAML string (a list of song directory names)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse setlist YAML")
    }

    /// Load the setlist file, or list every song directory when it is absent
    pub fn load(setlist_path: &Path, songs_root_dir: &Path) -> Result<Self> {
        if setlist_path.is_file() {
            let contents = fs::read_to_string(setlist_path)
                .with_context(|| format!("Failed to read setlist: {:?}", setlist_path))?;
            return Self::from_yaml(&contents);
        }
        Self::scan(songs_root_dir)
    }

    /// Every directory under the songs root, sorted by name
    pub fn scan(songs_root_dir: &Path) -> Result<Self> {
        let mut songs: Vec<String> = fs::read_dir(songs_root_dir)
            .with_context(|| format!("Failed to read songs directory: {:?}", songs_root_dir))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        songs.sort();
        Ok(Self { songs })
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.songs.get(index).map(String::as_str)
    }
}
