// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! midir backend.
//!
//! This module provides a midir implementation of the `MidiOutput` trait
//! (ALSA on Linux, Core MIDI on macOS, WinMM on Windows).

use anyhow::Result;
use midir::{MidiOutput as MidirPorts, MidiOutputConnection};
use thiserror::Error;

use super::MidiOutput;

const CLIENT_NAME: &str = "stagesync";

/// MIDI device errors
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to initialize MIDI output: {0}")]
    Init(String),
    #[error("MIDI destination {index} not found (only {count} available)")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("no MIDI destination matching '{0}' found")]
    NotFound(String),
    #[error("failed to connect to MIDI destination '{name}': {reason}")]
    Connect { name: String, reason: String },
    #[error("failed to send MIDI message: {0}")]
    Send(String),
}

/// midir output connection.
pub struct MidirOutput {
    name: String,
    connection: MidiOutputConnection,
}

impl MidirOutput {
    /// Create a new output connected to the specified destination.
    ///
    /// # Arguments
    /// * `destination_index` - Index of the destination in the system's MIDI device list
    ///
    /// # Returns
    /// * `Ok(MidirOutput)` on success
    /// * `Err` if the client could not be created or the destination is missing
    pub fn new(destination_index: usize) -> Result<Self> {
        let midi_out = MidirPorts::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports.get(destination_index).ok_or(MidiError::IndexOutOfRange {
            index: destination_index,
            count: ports.len(),
        })?;
        let name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| format!("Unknown {}", destination_index));

        let connection = midi_out
            .connect(port, "stagesync-out")
            .map_err(|e| MidiError::Connect {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { name, connection })
    }

    /// Create a new output connected to a destination by name.
    ///
    /// # Arguments
    /// * `name` - Partial name to match against destination names (case-insensitive)
    ///
    /// # Returns
    /// * `Ok(MidirOutput)` on success
    /// * `Err` if no matching destination is found
    pub fn new_by_name(name: &str) -> Result<Self> {
        let pattern = name.to_lowercase();
        let index = list_destinations()
            .into_iter()
            .find(|(_, n)| n.to_lowercase().contains(&pattern))
            .map(|(i, _)| i)
            .ok_or_else(|| MidiError::NotFound(name.to_string()))?;

        Self::new(index)
    }

    /// Open a destination given as a port index or a name fragment
    pub fn open(port: &str) -> Result<Self> {
        match port.trim().parse::<usize>() {
            Ok(index) => Self::new(index),
            Err(_) => Self::new_by_name(port),
        }
    }

    /// Name of the connected destination
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MidiOutput for MidirOutput {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.connection
            .send(message)
            .map_err(|e| MidiError::Send(e.to_string()))?;
        Ok(())
    }
}

/// List all available MIDI destinations.
///
/// # Returns
/// A vector of (index, name) tuples.
pub fn list_destinations() -> Vec<(usize, String)> {
    let Ok(midi_out) = MidirPorts::new(CLIENT_NAME) else {
        return Vec::new();
    };

    midi_out
        .ports()
        .iter()
        .enumerate()
        .map(|(i, port)| {
            let name = midi_out
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown {}", i));
            (i, name)
        })
        .collect()
}

/// Print all available MIDI destinations to stdout.
pub fn print_destinations() {
    let destinations = list_destinations();
    if destinations.is_empty() {
        println!("No MIDI destinations found.");
    } else {
        println!("Available MIDI destinations:");
        for (i, name) in destinations {
            println!("  {}: {}", i, name);
        }
    }
}
