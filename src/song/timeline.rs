// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Song timeline: the validated, read-only sequence of parts of a loaded song.
//!
//! The last part is a sentinel whose start tick is the song length. Patch
//! assignments are resolved once here, for every part and every output, so
//! that part transitions only have to read a table.

use thiserror::Error;

use super::part::SongPart;
use super::patch::OutputProfile;

/// Reasons a song structure cannot be turned into a timeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    #[error("song has no parts")]
    Empty,

    #[error("part {index} starts at tick {start_tick}, not after the previous part")]
    NonIncreasingStart { index: usize, start_tick: u64 },

    #[error("part {index} has invalid tempo {bpm}")]
    InvalidTempo { index: usize, bpm: f64 },

    #[error("part {index} assigns a patch to unknown output '{output}'")]
    UnknownOutput { index: usize, output: String },

    #[error("part {index}: patch '{patch}' cannot be resolved for output '{output}'")]
    UnresolvedPatch {
        index: usize,
        output: String,
        patch: String,
    },

    #[error("default patch '{patch}' cannot be resolved for output '{output}'")]
    UnresolvedDefaultPatch { output: String, patch: String },
}

/// A program change to send when a part starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchChange {
    /// Index into the output list the timeline was built with
    pub output_index: usize,
    /// 0-based program number
    pub program: u8,
}

/// Validated song timeline
#[derive(Debug, Clone, PartialEq)]
pub struct SongTimeline {
    name: String,
    parts: Vec<SongPart>,
    ticks_per_beat: u32,
    /// Resolved program per part per output
    patches: Vec<Vec<Option<u8>>>,
}

impl SongTimeline {
    /// Validate parts and resolve per-output patches.
    ///
    /// The last entry of `parts` is the end sentinel. A sentinel with an
    /// unusable tempo takes the tempo of the part before it.
    pub fn new(
        name: impl Into<String>,
        mut parts: Vec<SongPart>,
        ticks_per_beat: u32,
        outputs: &[OutputProfile],
    ) -> Result<Self, TimelineError> {
        if parts.is_empty() {
            return Err(TimelineError::Empty);
        }

        for index in 1..parts.len() {
            if parts[index].start_tick <= parts[index - 1].start_tick {
                return Err(TimelineError::NonIncreasingStart {
                    index,
                    start_tick: parts[index].start_tick,
                });
            }
        }

        let last = parts.len() - 1;
        for (index, part) in parts.iter().enumerate().take(last) {
            if !valid_tempo(part.tempo_bpm) {
                return Err(TimelineError::InvalidTempo {
                    index,
                    bpm: part.tempo_bpm,
                });
            }
        }
        if !valid_tempo(parts[last].tempo_bpm) {
            match last.checked_sub(1) {
                Some(previous) => parts[last].tempo_bpm = parts[previous].tempo_bpm,
                None => {
                    return Err(TimelineError::InvalidTempo {
                        index: last,
                        bpm: parts[last].tempo_bpm,
                    })
                }
            }
        }

        let patches = resolve_patches(&parts, outputs)?;

        Ok(Self {
            name: name.into(),
            parts,
            ticks_per_beat: ticks_per_beat.max(1),
            patches,
        })
    }

    /// Song name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All parts, sentinel included
    pub fn parts(&self) -> &[SongPart] {
        &self.parts
    }

    /// Part by index
    pub fn part(&self, index: usize) -> Option<&SongPart> {
        self.parts.get(index)
    }

    /// Number of parts, sentinel included
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Always false: a timeline holds at least the sentinel
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Index of the sentinel
    pub fn last_index(&self) -> usize {
        self.parts.len() - 1
    }

    /// Song length in ticks (start tick of the sentinel)
    pub fn total_ticks(&self) -> u64 {
        self.parts[self.last_index()].start_tick
    }

    /// Ticks per beat the start ticks are expressed in
    pub fn ticks_per_beat(&self) -> u32 {
        self.ticks_per_beat
    }

    /// Tempo of the given part, falling back to the sentinel's
    pub fn tempo_at(&self, index: usize) -> f64 {
        self.parts
            .get(index)
            .unwrap_or(&self.parts[self.last_index()])
            .tempo_bpm
    }

    /// Index of the part containing `tick`
    pub fn part_index_at(&self, tick: u64) -> usize {
        self.parts
            .iter()
            .rposition(|part| part.start_tick <= tick)
            .unwrap_or(0)
    }

    /// Playback position in milliseconds of the given tick.
    ///
    /// Each passed part contributes its whole length at its own tempo, the
    /// part containing `tick` contributes the elapsed ticks at its tempo.
    pub fn position_ms_at_tick(&self, tick: u64) -> f64 {
        let mut ms = 0.0;
        for (index, part) in self.parts.iter().enumerate() {
            if tick < part.start_tick {
                break;
            }
            let part_end = self
                .parts
                .get(index + 1)
                .map(|next| next.start_tick)
                .unwrap_or(u64::MAX);
            if tick >= part_end {
                ms += part.ticks_to_ms(part_end - part.start_tick, self.ticks_per_beat);
            } else {
                ms += part.ticks_to_ms(tick - part.start_tick, self.ticks_per_beat);
                break;
            }
        }
        ms
    }

    /// Playback position in milliseconds where the given part starts
    pub fn part_start_ms(&self, index: usize) -> f64 {
        let index = index.min(self.last_index());
        self.position_ms_at_tick(self.parts[index].start_tick)
    }

    /// Resolved program changes for a part, one per output that has a patch
    pub fn patch_changes(&self, index: usize) -> impl Iterator<Item = PatchChange> + '_ {
        self.patches
            .get(index)
            .into_iter()
            .flat_map(|row| row.iter().enumerate())
            .filter_map(|(output_index, program)| {
                program.map(|program| PatchChange {
                    output_index,
                    program,
                })
            })
    }

    /// Resolved program of one output during one part
    pub fn resolved_patch(&self, index: usize, output_index: usize) -> Option<u8> {
        self.patches.get(index)?.get(output_index).copied().flatten()
    }
}

fn valid_tempo(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

/// Build the per-part per-output program table.
///
/// Order per output: explicit assignment, then the part's own program if the
/// output follows the song program, then the previous part's program, then
/// the output default. The sentinel row stays empty.
fn resolve_patches(
    parts: &[SongPart],
    outputs: &[OutputProfile],
) -> Result<Vec<Vec<Option<u8>>>, TimelineError> {
    for (index, part) in parts.iter().enumerate() {
        for assignment in &part.patch_assignments {
            if !outputs.iter().any(|output| output.id == assignment.output_id) {
                return Err(TimelineError::UnknownOutput {
                    index,
                    output: assignment.output_id.clone(),
                });
            }
        }
    }

    let mut carried: Vec<Option<u8>> = Vec::with_capacity(outputs.len());
    for output in outputs {
        let default = match &output.patching.default_patch {
            Some(patch) => Some(output.patching.resolve(patch).ok_or_else(|| {
                TimelineError::UnresolvedDefaultPatch {
                    output: output.id.clone(),
                    patch: patch.clone(),
                }
            })?),
            None => None,
        };
        carried.push(default);
    }

    let last = parts.len() - 1;
    let mut table = Vec::with_capacity(parts.len());
    for (index, part) in parts.iter().enumerate() {
        if index == last {
            table.push(vec![None; outputs.len()]);
            break;
        }
        for (output_index, output) in outputs.iter().enumerate() {
            if let Some(patch) = part.patch_for(&output.id) {
                let program = output.patching.resolve(patch).ok_or_else(|| {
                    TimelineError::UnresolvedPatch {
                        index,
                        output: output.id.clone(),
                        patch: patch.to_string(),
                    }
                })?;
                carried[output_index] = Some(program);
            } else if output.patching.follow_song_program {
                carried[output_index] = Some(part.program_id);
            }
        }
        table.push(carried.clone());
    }

    Ok(table)
}
