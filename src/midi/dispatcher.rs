// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI transport dispatch.
//!
//! The tick clock runs on the audio thread and only pushes `ClockEvent`s
//! into a ring buffer. The dispatcher thread drains that ring and the control
//! commands, and does the actual device I/O. A device that is missing or
//! fails to send is logged and skipped; playback goes on.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use rtrb::Consumer;
use tracing::{debug, info, warn};

use super::{messages, MidiOutput};
use crate::song::SongTimeline;
use crate::timing::ClockEvent;

/// Poll interval of the dispatcher thread (a tick is ~20ms at 120 BPM)
const POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Control requests for the transport
#[derive(Debug, Clone)]
pub enum TransportCommand {
    /// Use this song for program changes
    SetTimeline(Arc<SongTimeline>),
    /// Send the resolved patches of a part
    SendPatches(usize),
    /// Rewind the devices and start them
    Start,
    Stop,
    /// Stop the devices, send exit programs and end the thread
    Shutdown,
}

/// One configured MIDI destination
pub struct OutputPort {
    id: String,
    /// Channel 0-15
    channel: u8,
    send_ticks: bool,
    exit_program: Option<u8>,
    output: Option<Box<dyn MidiOutput>>,
}

impl OutputPort {
    /// Create a port; `output` is `None` when the device could not be opened
    pub fn new(
        id: impl Into<String>,
        channel: u8,
        send_ticks: bool,
        exit_program: Option<u8>,
        output: Option<Box<dyn MidiOutput>>,
    ) -> Self {
        Self {
            id: id.into(),
            channel: channel & 0x0F,
            send_ticks,
            exit_program,
            output,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn sends_ticks(&self) -> bool {
        self.send_ticks
    }

    pub fn is_open(&self) -> bool {
        self.output.is_some()
    }

    fn send(&mut self, message: &[u8]) {
        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.send(message) {
                warn!(output = %self.id, "MIDI send failed: {}", e);
            }
        }
    }

    fn send_program(&mut self, program: u8) {
        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.program_change(self.channel, program) {
                warn!(output = %self.id, "MIDI program change failed: {}", e);
            }
        }
    }
}

/// Device-side state of the transport
pub struct Transport {
    outputs: Vec<OutputPort>,
    timeline: Option<Arc<SongTimeline>>,
    running: bool,
    pulses_sent: u64,
}

impl Transport {
    /// Create a transport; `outputs` must be in the order the timeline's
    /// output profiles were given
    pub fn new(outputs: Vec<OutputPort>) -> Self {
        Self {
            outputs,
            timeline: None,
            running: false,
            pulses_sent: 0,
        }
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Clock pulses forwarded since the last start
    pub fn pulses_sent(&self) -> u64 {
        self.pulses_sent
    }

    pub fn handle_event(&mut self, event: ClockEvent) {
        match event {
            ClockEvent::Pulse => {
                if self.running {
                    self.pulses_sent += 1;
                    self.send_to_tick_outputs(&[messages::TIMING_CLOCK]);
                }
            }
            ClockEvent::PartChanged { part_index } => self.send_patches(part_index),
            ClockEvent::LoopEndReached { part_index } => {
                debug!(part = part_index, "Loop end reached");
            }
        }
    }

    /// Apply a command; returns false once the transport has shut down
    pub fn handle_command(&mut self, command: TransportCommand) -> bool {
        match command {
            TransportCommand::SetTimeline(timeline) => {
                self.timeline = Some(timeline);
            }
            TransportCommand::SendPatches(part_index) => self.send_patches(part_index),
            TransportCommand::Start => self.start(),
            TransportCommand::Stop => self.stop(),
            TransportCommand::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Send the resolved patch of every output for a part
    pub fn send_patches(&mut self, part_index: usize) {
        let Some(timeline) = self.timeline.clone() else {
            return;
        };
        for change in timeline.patch_changes(part_index) {
            if let Some(port) = self.outputs.get_mut(change.output_index) {
                debug!(
                    output = %port.id,
                    part = part_index,
                    program = change.program,
                    "Sending program change"
                );
                port.send_program(change.program);
            }
        }
    }

    /// Rewind the devices to their first pattern, then start them
    pub fn start(&mut self) {
        info!("MIDI transport start");
        self.send_to_tick_outputs(&[messages::START]);
        self.send_to_tick_outputs(&[messages::TIMING_CLOCK]);
        self.send_to_tick_outputs(&[messages::STOP]);
        self.send_to_tick_outputs(&[messages::START]);
        self.running = true;
        self.pulses_sent = 0;
    }

    pub fn stop(&mut self) {
        info!("MIDI transport stop");
        self.send_to_tick_outputs(&[messages::STOP]);
        self.running = false;
    }

    /// Stop the devices and leave them on their exit program
    pub fn shutdown(&mut self) {
        self.stop();
        for port in self.outputs.iter_mut().filter(|p| p.send_ticks) {
            if let Some(program) = port.exit_program {
                port.send_program(program);
            }
        }
    }

    fn send_to_tick_outputs(&mut self, message: &[u8]) {
        for port in self.outputs.iter_mut().filter(|p| p.send_ticks) {
            port.send(message);
        }
    }
}

/// Thread running a `Transport`
pub struct MidiDispatcher {
    commands: Sender<TransportCommand>,
    thread: Option<JoinHandle<()>>,
}

impl MidiDispatcher {
    /// Start the dispatcher thread.
    ///
    /// # Arguments
    /// * `transport` - Devices to drive
    /// * `events` - Consumer end of the clock event ring
    pub fn spawn(transport: Transport, events: Consumer<ClockEvent>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("midi-dispatch".into())
            .spawn(move || run(transport, events, rx))
            .context("Failed to spawn MIDI dispatcher thread")?;

        Ok(Self {
            commands: tx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, command: TransportCommand) {
        if self.commands.send(command).is_err() {
            warn!("MIDI dispatcher is gone, command dropped");
        }
    }

    pub fn set_timeline(&self, timeline: Arc<SongTimeline>) {
        self.send(TransportCommand::SetTimeline(timeline));
    }

    pub fn send_patches(&self, part_index: usize) {
        self.send(TransportCommand::SendPatches(part_index));
    }

    pub fn start(&self) {
        self.send(TransportCommand::Start);
    }

    pub fn stop(&self) {
        self.send(TransportCommand::Stop);
    }

    /// Send the shutdown sequence and wait for the thread to finish
    pub fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.send(TransportCommand::Shutdown);
            if thread.join().is_err() {
                warn!("MIDI dispatcher thread panicked");
            }
        }
    }
}

impl Drop for MidiDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(mut transport: Transport, mut events: Consumer<ClockEvent>, commands: Receiver<TransportCommand>) {
    loop {
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    if !transport.handle_command(command) {
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    transport.shutdown();
                    return;
                }
            }
        }

        while let Ok(event) = events.pop() {
            transport.handle_event(event);
        }

        thread::sleep(POLL_INTERVAL);
    }
}
