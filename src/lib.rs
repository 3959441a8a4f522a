// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! stagesync: live playback of stems, MIDI clock, program changes and video
//! from one audio-driven tick clock.

pub mod audio;
pub mod config;
pub mod midi;
pub mod player;
pub mod song;
pub mod timing;
pub mod ui;
pub mod video;
