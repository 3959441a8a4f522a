// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Events produced by the tick clock on the audio thread.

/// Something the downstream transport must act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// One clock pulse (one tick)
    Pulse,
    /// The clock entered a new part; its patches must be sent
    PartChanged { part_index: usize },
    /// Loop mode stopped the clock from leaving the last real part
    LoopEndReached { part_index: usize },
}

/// Receiver of clock events.
///
/// Called from the audio thread: implementations must not block.
pub trait ClockSink {
    fn on_clock_event(&mut self, event: ClockEvent);
}

impl ClockSink for Vec<ClockEvent> {
    fn on_clock_event(&mut self, event: ClockEvent) {
        self.push(event);
    }
}

impl ClockSink for rtrb::Producer<ClockEvent> {
    fn on_clock_event(&mut self, event: ClockEvent) {
        // A full ring drops the event rather than stalling the audio thread
        let _ = self.push(event);
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ClockSink for NullSink {
    fn on_clock_event(&mut self, _event: ClockEvent) {}
}
