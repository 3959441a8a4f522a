// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing and clock module.
//!
//! This module provides the sample-driven tick clock, its drift correction
//! and the handoff between the audio thread and the control thread.

pub mod clock;
pub mod correction;
pub mod events;
pub mod shared;

pub use clock::{samples_per_tick, ClockConfig, ClockState, TickClock, PPQN};
pub use correction::{CorrectionDecision, CorrectionThresholds};
pub use events::{ClockEvent, ClockSink, NullSink};
pub use shared::{clock_channel, ClockCommand, ClockHandle, ClockRunner, ClockShared};
