// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI output abstraction layer.
//!
//! This module provides a trait-based abstraction for MIDI output, the
//! midir backend, and the dispatcher thread that turns clock events into
//! clock pulses and program changes on the configured devices.

pub mod dispatcher;
pub mod midir_backend;

use anyhow::Result;

pub use dispatcher::{MidiDispatcher, OutputPort, Transport, TransportCommand};
pub use midir_backend::{list_destinations, print_destinations, MidiError, MidirOutput};

/// Trait for MIDI output implementations.
///
/// This trait abstracts over different MIDI backends, providing a unified
/// interface for sending MIDI messages.
pub trait MidiOutput: Send {
    /// Send a MIDI message immediately.
    ///
    /// # Arguments
    /// * `message` - Raw MIDI bytes (e.g., `[0xC0, 95]` for Program Change)
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err` if the message could not be sent
    fn send(&mut self, message: &[u8]) -> Result<()>;

    /// Send a program change on a channel (0-15).
    fn program_change(&mut self, channel: u8, program: u8) -> Result<()> {
        self.send(&[messages::PROGRAM_CHANGE | (channel & 0x0F), program & 0x7F])
    }

    /// Send one timing clock pulse.
    fn clock_pulse(&mut self) -> Result<()> {
        self.send(&[messages::TIMING_CLOCK])
    }
}

impl<T: MidiOutput + ?Sized> MidiOutput for Box<T> {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        (**self).send(message)
    }
}

/// MIDI message constants
pub mod messages {
    // Channel Voice Messages (upper nibble, lower nibble is channel 0-15)
    pub const PROGRAM_CHANGE: u8 = 0xC0;

    // System Real-Time Messages
    pub const TIMING_CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const STOP: u8 = 0xFC;
}
