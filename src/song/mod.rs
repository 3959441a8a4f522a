// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Song structure.
//!
//! This module provides:
//! - Parts: tempo, program and patch assignments of one song section
//! - Patch profiles: how each output device names its patches
//! - Timeline: the validated part sequence with resolved patch table

pub mod part;
pub mod patch;
pub mod timeline;

pub use part::{PatchAssignment, SongPart};
pub use patch::{parse_bank_slot, parse_program_number, OutputProfile, PatchFormat, PatchProfile};
pub use timeline::{PatchChange, SongTimeline, TimelineError};
