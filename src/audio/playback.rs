// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio-thread playback state.
//!
//! The UI thread sends `PlaybackCommand`s over a lock-free ring; the audio
//! thread applies them at the start of each block and publishes its frame
//! position through atomics. Replaced mixes go back over a second ring so
//! they are freed off the audio thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use super::stems::Mix;

/// Capacity of the command ring
const COMMAND_QUEUE_CAPACITY: usize = 64;
/// Capacity of the ring returning replaced mixes
const RETIRED_QUEUE_CAPACITY: usize = 8;

/// Commands sent from the UI thread to the audio thread
pub enum PlaybackCommand {
    /// Replace the current mix and rewind
    Load(Box<Mix>),
    Unload,
    Play,
    Stop,
    /// Move to a frame position
    Seek(u64),
}

/// State the audio thread publishes
#[derive(Debug, Default)]
pub struct PlaybackAtomics {
    /// Frames played since the start of the song
    position: AtomicU64,
    playing: AtomicBool,
    /// Length of the loaded mix in frames
    length: AtomicU64,
}

impl PlaybackAtomics {
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }
}

/// Control-side ends of the playback rings
pub struct PlaybackControl {
    pub commands: Producer<PlaybackCommand>,
    pub retired: Consumer<Box<Mix>>,
    pub atomics: Arc<PlaybackAtomics>,
}

/// Create the rings and both ends of the playback state
pub fn playback_channel() -> (PlaybackControl, MixPlayer) {
    let (command_tx, command_rx) = RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    let (retired_tx, retired_rx) = RingBuffer::new(RETIRED_QUEUE_CAPACITY);
    let atomics = Arc::new(PlaybackAtomics::default());

    let control = PlaybackControl {
        commands: command_tx,
        retired: retired_rx,
        atomics: Arc::clone(&atomics),
    };
    let player = MixPlayer {
        mix: None,
        position: 0,
        playing: false,
        commands: command_rx,
        retired: retired_tx,
        atomics,
    };
    (control, player)
}

/// Audio-thread owner of the mix
pub struct MixPlayer {
    mix: Option<Box<Mix>>,
    position: u64,
    playing: bool,
    commands: Consumer<PlaybackCommand>,
    retired: Producer<Box<Mix>>,
    atomics: Arc<PlaybackAtomics>,
}

impl MixPlayer {
    /// Apply pending commands and fill one output block.
    ///
    /// # Returns
    /// Number of frames the song position advanced (0 while stopped)
    pub fn process(&mut self, data: &mut [f32], channels: usize) -> usize {
        while let Ok(command) = self.commands.pop() {
            self.apply(command);
        }

        data.fill(0.0);
        if !self.playing || channels == 0 {
            return 0;
        }

        let frames = data.len() / channels;
        if let Some(mix) = &self.mix {
            mix.render(self.position as usize, data, channels);
        }
        // Position keeps counting past the end of the mix so the clock can
        // reach the end of the song
        self.position += frames as u64;
        self.atomics.position.store(self.position, Ordering::Relaxed);
        frames
    }

    fn apply(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Load(mix) => {
                self.atomics.length.store(mix.frames() as u64, Ordering::Relaxed);
                let old = self.mix.replace(mix);
                self.retire(old);
                self.position = 0;
                self.playing = false;
            }
            PlaybackCommand::Unload => {
                self.atomics.length.store(0, Ordering::Relaxed);
                let old = self.mix.take();
                self.retire(old);
                self.position = 0;
                self.playing = false;
            }
            PlaybackCommand::Play => self.playing = true,
            PlaybackCommand::Stop => self.playing = false,
            PlaybackCommand::Seek(frame) => self.position = frame,
        }
        self.atomics.playing.store(self.playing, Ordering::Relaxed);
        self.atomics.position.store(self.position, Ordering::Relaxed);
    }

    fn retire(&mut self, mix: Option<Box<Mix>>) {
        if let Some(mix) = mix {
            // A full ring frees here; the UI drains it every frame
            let _ = self.retired.push(mix);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::stems::Stem;

    fn mix(frames: usize) -> Box<Mix> {
        Box::new(Mix::new(vec![Stem::from_stereo(
            "a",
            vec![1.0; frames * 2],
            1.0,
        )]))
    }

    #[test]
    fn test_stopped_player_is_silent() {
        let (mut control, mut player) = playback_channel();
        control.commands.push(PlaybackCommand::Load(mix(16))).unwrap();

        let mut data = vec![0.5; 8];
        assert_eq!(player.process(&mut data, 2), 0);
        assert!(data.iter().all(|s| *s == 0.0));
        assert_eq!(control.atomics.length(), 16);
    }

    #[test]
    fn test_play_advances_position() {
        let (mut control, mut player) = playback_channel();
        control.commands.push(PlaybackCommand::Load(mix(16))).unwrap();
        control.commands.push(PlaybackCommand::Play).unwrap();

        let mut data = vec![0.0; 8];
        assert_eq!(player.process(&mut data, 2), 4);
        assert_eq!(data, vec![1.0; 8]);
        assert_eq!(control.atomics.position(), 4);
        assert!(control.atomics.is_playing());
    }

    #[test]
    fn test_position_counts_past_end() {
        let (mut control, mut player) = playback_channel();
        control.commands.push(PlaybackCommand::Load(mix(2))).unwrap();
        control.commands.push(PlaybackCommand::Play).unwrap();

        let mut data = vec![0.0; 8];
        player.process(&mut data, 2);
        player.process(&mut data, 2);
        assert_eq!(player.position(), 8);
        assert!(data.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_seek_and_stop() {
        let (mut control, mut player) = playback_channel();
        control.commands.push(PlaybackCommand::Load(mix(16))).unwrap();
        control.commands.push(PlaybackCommand::Seek(10)).unwrap();
        control.commands.push(PlaybackCommand::Play).unwrap();

        let mut data = vec![0.0; 4];
        player.process(&mut data, 2);
        assert_eq!(player.position(), 12);

        control.commands.push(PlaybackCommand::Stop).unwrap();
        assert_eq!(player.process(&mut data, 2), 0);
        assert_eq!(control.atomics.position(), 12);
        assert!(!control.atomics.is_playing());
    }

    #[test]
    fn test_replaced_mix_is_returned() {
        let (mut control, mut player) = playback_channel();
        control.commands.push(PlaybackCommand::Load(mix(4))).unwrap();
        control.commands.push(PlaybackCommand::Load(mix(8))).unwrap();
        control.commands.push(PlaybackCommand::Unload).unwrap();

        let mut data = vec![0.0; 4];
        player.process(&mut data, 2);

        let mut returned = Vec::new();
        while let Ok(old) = control.retired.pop() {
            returned.push(old.frames());
        }
        assert_eq!(returned, vec![4, 8]);
        assert_eq!(control.atomics.length(), 0);
    }
}
