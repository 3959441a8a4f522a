// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio output via cpal.
//!
//! Opens the configured (or default) output device at the requested sample
//! rate when the device supports it, otherwise at the device default rate.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use tracing::{error, info, warn};

use super::AudioError;
use crate::config::AudioConfig;

/// Negotiated stream parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Buffer size in frames
    pub buffer_size: u32,
    /// Number of output channels
    pub channels: u16,
}

impl StreamParams {
    /// Output latency in milliseconds
    pub fn latency_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (self.buffer_size as f64 / self.sample_rate as f64) * 1000.0
    }
}

/// Audio output stream
pub struct AudioOutput {
    _stream: Stream,
    device_name: String,
    params: StreamParams,
}

impl AudioOutput {
    /// Open an output stream that calls `callback(buffer, channels)` per block
    pub fn new<F>(config: &AudioConfig, mut callback: F) -> Result<Self, AudioError>
    where
        F: FnMut(&mut [f32], usize) + Send + 'static,
    {
        let device = find_device(config.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::InitFailed(format!("Failed to get default config: {}", e)))?;

        let sample_rate = if supports_rate(&device, config.sample_rate) {
            config.sample_rate
        } else {
            let fallback = default_config.sample_rate().0;
            warn!(
                requested = config.sample_rate,
                fallback, "Sample rate not supported by device, using default"
            );
            fallback
        };

        let params = StreamParams {
            sample_rate,
            buffer_size: config.buffer_size,
            channels: default_config.channels().max(1),
        };
        let stream_config = StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(params.buffer_size),
        };
        let channels = params.channels as usize;

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback(data, channels);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamFailed(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamFailed(format!("Failed to start stream: {}", e)))?;

        info!(
            device = %device_name,
            sample_rate = params.sample_rate,
            buffer = params.buffer_size,
            channels = params.channels,
            latency_ms = params.latency_ms(),
            "Audio output started"
        );

        Ok(Self {
            _stream: stream,
            device_name,
            params,
        })
    }

    pub fn params(&self) -> StreamParams {
        self.params
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }
}

/// Output device by case-insensitive name fragment, or the default device
fn find_device(name: Option<&str>) -> Result<Device, AudioError> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => {
            let wanted = wanted.to_lowercase();
            host.output_devices()
                .map_err(|e| AudioError::InitFailed(e.to_string()))?
                .find(|d| {
                    d.name()
                        .map(|n| n.to_lowercase().contains(&wanted))
                        .unwrap_or(false)
                })
                .ok_or_else(|| AudioError::DeviceNotFound(wanted))
        }
        None => host.default_output_device().ok_or(AudioError::NoDevice),
    }
}

fn supports_rate(device: &Device, sample_rate: u32) -> bool {
    device
        .supported_output_configs()
        .map(|mut configs| {
            configs.any(|c| {
                c.sample_format() == cpal::SampleFormat::F32
                    && c.min_sample_rate().0 <= sample_rate
                    && sample_rate <= c.max_sample_rate().0
            })
        })
        .unwrap_or(false)
}

/// List available audio output devices
pub fn list_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Get default device name
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| d.name().ok())
}
