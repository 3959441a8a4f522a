// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Patch identifiers and their resolution to MIDI program numbers.
//!
//! Every output device names its patches in its own way: plain program
//! numbers, bank/slot pairs such as `F16`, or free-form names looked up in
//! a per-device table. A [`PatchProfile`] captures how one device does it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Number of slots in one bank for [`PatchFormat::Bank`]
pub const BANK_SIZE: u8 = 16;

/// How an output device names its patches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchFormat {
    /// 1-based program number ("1" to "128")
    #[default]
    Program,
    /// Bank letter and 1-based slot, e.g. "A01" or "F16"
    Bank,
    /// Name looked up in the device's `patch_names` table
    Name,
}

/// Patch naming rules for one output device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchProfile {
    /// Patch identifier format
    #[serde(default)]
    pub patch_format: PatchFormat,
    /// Name to program number table, used with [`PatchFormat::Name`]
    #[serde(default)]
    pub patch_names: HashMap<String, u8>,
    /// Patch used when no part has assigned one yet
    #[serde(default)]
    pub default_patch: Option<String>,
    /// Whether the part's own program applies to this device when the part
    /// carries no explicit assignment for it
    #[serde(default)]
    pub follow_song_program: bool,
}

impl PatchProfile {
    /// Resolve a patch identifier to a 0-based program number
    pub fn resolve(&self, patch: &str) -> Option<u8> {
        match self.patch_format {
            PatchFormat::Program => parse_program_number(patch),
            PatchFormat::Bank => parse_bank_slot(patch),
            PatchFormat::Name => self.patch_names.get(patch.trim()).copied(),
        }
    }
}

/// A device's identity plus its patch naming rules
#[derive(Debug, Clone, PartialEq)]
pub struct OutputProfile {
    /// Output identifier referenced by part patch assignments
    pub id: String,
    /// Patch naming rules
    pub patching: PatchProfile,
}

impl OutputProfile {
    pub fn new(id: impl Into<String>, patching: PatchProfile) -> Self {
        Self {
            id: id.into(),
            patching,
        }
    }
}

/// Parse a 1-based program number ("1" to "128")
pub fn parse_program_number(text: &str) -> Option<u8> {
    let number: u16 = text.trim().parse().ok()?;
    if (1..=128).contains(&number) {
        Some((number - 1) as u8)
    } else {
        None
    }
}

/// Parse a bank/slot name such as "F16" into a 0-based program number.
///
/// Banks run from `A` to `H`, slots from 1 to 16, so `A01` is program 0 and
/// `F16` is program 95.
pub fn parse_bank_slot(text: &str) -> Option<u8> {
    let text = text.trim();
    let mut chars = text.chars();
    let bank = chars.next()?.to_ascii_uppercase();
    if !('A'..='H').contains(&bank) {
        return None;
    }
    let slot: u8 = chars.as_str().parse().ok()?;
    if !(1..=BANK_SIZE).contains(&slot) {
        return None;
    }
    let bank_offset = (bank as u8 - b'A') * BANK_SIZE;
    Some(bank_offset + slot - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bank_slot() {
        assert_eq!(parse_bank_slot("A01"), Some(0));
        assert_eq!(parse_bank_slot("A1"), Some(0));
        assert_eq!(parse_bank_slot("B03"), Some(18));
        assert_eq!(parse_bank_slot("F16"), Some(95));
        assert_eq!(parse_bank_slot("h16"), Some(127));
    }

    #[test]
    fn test_parse_bank_slot_rejects_garbage() {
        assert_eq!(parse_bank_slot(""), None);
        assert_eq!(parse_bank_slot("Z01"), None);
        assert_eq!(parse_bank_slot("A00"), None);
        assert_eq!(parse_bank_slot("A17"), None);
        assert_eq!(parse_bank_slot("Axx"), None);
    }

    #[test]
    fn test_parse_program_number() {
        assert_eq!(parse_program_number("1"), Some(0));
        assert_eq!(parse_program_number(" 128 "), Some(127));
        assert_eq!(parse_program_number("0"), None);
        assert_eq!(parse_program_number("129"), None);
    }

    #[test]
    fn test_profile_resolution_by_format() {
        let mut profile = PatchProfile::default();
        assert_eq!(profile.resolve("10"), Some(9));

        profile.patch_format = PatchFormat::Bank;
        assert_eq!(profile.resolve("C02"), Some(33));

        profile.patch_format = PatchFormat::Name;
        profile.patch_names.insert("Warm Pad".to_string(), 42);
        assert_eq!(profile.resolve("Warm Pad"), Some(42));
        assert_eq!(profile.resolve("Cold Pad"), None);
    }
}
