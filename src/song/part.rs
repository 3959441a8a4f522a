// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! A single part of a song: where it starts, how fast it goes and which
//! patches the external devices should play during it.

/// Explicit patch assignment of one output for one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchAssignment {
    /// Output identifier (matches an [`OutputProfile`](super::OutputProfile) id)
    pub output_id: String,
    /// Patch identifier, in the output's own patch format
    pub patch: String,
}

impl PatchAssignment {
    pub fn new(output_id: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            output_id: output_id.into(),
            patch: patch.into(),
        }
    }
}

/// A contiguous span of the song with its own tempo and patches
#[derive(Debug, Clone, PartialEq)]
pub struct SongPart {
    /// First tick of the part, counted from song start
    pub start_tick: u64,
    /// Tempo in BPM
    pub tempo_bpm: f64,
    /// 0-based program number for devices following the song program
    pub program_id: u8,
    /// Program name as written in the song structure (e.g. "F16")
    pub program_name: String,
    /// Name shown to the performer
    pub display_name: String,
    /// Explicit per-output patch assignments
    pub patch_assignments: Vec<PatchAssignment>,
}

impl SongPart {
    /// Create a part with no program or patch assignments
    pub fn new(display_name: impl Into<String>, start_tick: u64, tempo_bpm: f64) -> Self {
        Self {
            start_tick,
            tempo_bpm,
            program_id: 0,
            program_name: String::new(),
            display_name: display_name.into(),
            patch_assignments: Vec::new(),
        }
    }

    /// Create the end-of-song marker
    pub fn sentinel(end_tick: u64, tempo_bpm: f64) -> Self {
        Self::new("end", end_tick, tempo_bpm)
    }

    /// Set the song program (builder style)
    pub fn with_program(mut self, program_id: u8, program_name: impl Into<String>) -> Self {
        self.program_id = program_id;
        self.program_name = program_name.into();
        self
    }

    /// Add an explicit patch assignment (builder style)
    pub fn with_patch(mut self, output_id: impl Into<String>, patch: impl Into<String>) -> Self {
        self.patch_assignments
            .push(PatchAssignment::new(output_id, patch));
        self
    }

    /// Explicit patch for the given output, if any
    pub fn patch_for(&self, output_id: &str) -> Option<&str> {
        self.patch_assignments
            .iter()
            .find(|assignment| assignment.output_id == output_id)
            .map(|assignment| assignment.patch.as_str())
    }

    /// Milliseconds covered by `ticks` ticks at this part's tempo
    pub fn ticks_to_ms(&self, ticks: u64, ticks_per_beat: u32) -> f64 {
        (ticks as f64 / ticks_per_beat as f64) / self.tempo_bpm * 60_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_builder() {
        let part = SongPart::new("Verse", 96, 120.0)
            .with_program(95, "F16")
            .with_patch("digitakt", "B03");

        assert_eq!(part.start_tick, 96);
        assert_eq!(part.program_id, 95);
        assert_eq!(part.patch_for("digitakt"), Some("B03"));
        assert_eq!(part.patch_for("synth"), None);
    }

    #[test]
    fn test_ticks_to_ms() {
        let part = SongPart::new("Intro", 0, 120.0);
        // One beat at 120 BPM lasts 500ms
        assert!((part.ticks_to_ms(24, 24) - 500.0).abs() < 1e-9);
        assert!((part.ticks_to_ms(96, 24) - 2000.0).abs() < 1e-9);
    }
}
