//! Session configuration
//!
//! All values are fixed for the lifetime of a session. Frame counts are in
//! frames (one sample per channel), not in interleaved samples.

use crate::lead::LeadTarget;
use crate::prefill::PrefillMode;
use crate::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default sample rate (48 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Largest ring buffer allocation accepted (512 MB worth of f32 samples)
pub const MAX_RING_BUFFER_SAMPLES: usize = 512 * 1024 * 1024 / std::mem::size_of::<f32>();

/// Configuration for a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels per frame
    pub channels: u16,

    /// Ring buffer capacity in frames
    /// Must hold the worst-case lead plus a safety margin
    pub ring_buffer_capacity_frames: usize,

    /// Desired steady-state distance between write and read cursors
    pub target_lead_frames: usize,

    /// Lead ceiling; above it the producer stops writing
    pub max_lead_frames: usize,

    /// Lead the producer waits to fall back to after exceeding the ceiling
    pub reset_lead_frames: usize,

    /// Frames pushed before the device callback is attached
    pub prefill_duration_frames: usize,

    /// Where prefill content comes from
    pub prefill_mode: PrefillMode,

    /// Largest batch the producer pulls from the generator per cycle
    pub max_batch_frames: usize,

    /// Upper bound on a single producer park
    pub producer_park_timeout_ms: u64,

    /// How long `stop` waits for the consumer to drain buffered frames
    pub drain_timeout_ms: u64,

    /// Interval between producer metrics log lines
    pub metrics_interval_ms: u64,
}

impl StreamConfig {
    /// Create a configuration tuned for low latency
    /// Target lead = 50 ms, ceiling = 100 ms
    pub fn low_latency(sample_rate: u32) -> Self {
        let target = frames_from_millis(sample_rate, 50);
        StreamConfig {
            sample_rate,
            channels: 2,
            ring_buffer_capacity_frames: target * 4,
            target_lead_frames: target,
            max_lead_frames: target * 2,
            reset_lead_frames: target,
            prefill_duration_frames: target,
            prefill_mode: PrefillMode::Silence,
            max_batch_frames: 1024,
            producer_park_timeout_ms: 5,
            drain_timeout_ms: 500,
            metrics_interval_ms: 1000,
        }
    }

    /// Create a configuration tuned for stability
    /// Target lead = 100 ms, ceiling = 200 ms, capacity = 1 s
    pub fn stable(sample_rate: u32) -> Self {
        let target = frames_from_millis(sample_rate, 100);
        StreamConfig {
            sample_rate,
            channels: 2,
            ring_buffer_capacity_frames: frames_from_millis(sample_rate, 1000),
            target_lead_frames: target,
            max_lead_frames: target * 2,
            reset_lead_frames: target,
            prefill_duration_frames: target,
            prefill_mode: PrefillMode::Silence,
            max_batch_frames: 2048,
            producer_park_timeout_ms: 5,
            drain_timeout_ms: 1000,
            metrics_interval_ms: 1000,
        }
    }

    /// Builder-style channel count override
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Builder-style prefill override
    pub fn with_prefill(mut self, frames: usize, mode: PrefillMode) -> Self {
        self.prefill_duration_frames = frames;
        self.prefill_mode = mode;
        self
    }

    /// Lead parameters as an immutable target
    pub fn lead_target(&self) -> LeadTarget {
        LeadTarget {
            target_lead_frames: self.target_lead_frames,
            max_lead_frames: self.max_lead_frames,
            reset_lead_frames: self.reset_lead_frames,
        }
    }

    /// Steady-state latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        ((self.target_lead_frames as f32) / (self.sample_rate as f32)) * 1000.0
    }

    /// Interleaved samples needed for `frames` frames
    pub fn samples_for(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }

    /// Producer park backstop
    pub fn park_timeout(&self) -> Duration {
        Duration::from_millis(self.producer_park_timeout_ms.max(1))
    }

    /// Drain deadline used by `Session::stop`
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Metrics log interval
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    /// Check the configuration for values a session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(StreamError::Config("sample_rate must be > 0".into()));
        }
        if self.channels == 0 {
            return Err(StreamError::Config("channels must be > 0".into()));
        }
        if self.ring_buffer_capacity_frames == 0 {
            return Err(StreamError::Config(
                "ring_buffer_capacity_frames must be > 0".into(),
            ));
        }
        let samples = self
            .ring_buffer_capacity_frames
            .checked_mul(self.channels as usize)
            .unwrap_or(usize::MAX);
        if samples > MAX_RING_BUFFER_SAMPLES {
            return Err(StreamError::Config(format!(
                "ring buffer of {} frames x {} channels exceeds maximum safe size {MAX_RING_BUFFER_SAMPLES} samples",
                self.ring_buffer_capacity_frames, self.channels
            )));
        }
        if self.target_lead_frames == 0 {
            return Err(StreamError::Config("target_lead_frames must be > 0".into()));
        }
        if self.target_lead_frames > self.max_lead_frames {
            return Err(StreamError::Config(format!(
                "target_lead_frames ({}) exceeds max_lead_frames ({})",
                self.target_lead_frames, self.max_lead_frames
            )));
        }
        if self.reset_lead_frames > self.max_lead_frames {
            return Err(StreamError::Config(format!(
                "reset_lead_frames ({}) exceeds max_lead_frames ({})",
                self.reset_lead_frames, self.max_lead_frames
            )));
        }
        if self.max_lead_frames > self.ring_buffer_capacity_frames {
            return Err(StreamError::Config(format!(
                "max_lead_frames ({}) exceeds ring_buffer_capacity_frames ({})",
                self.max_lead_frames, self.ring_buffer_capacity_frames
            )));
        }
        if self.prefill_duration_frames > self.ring_buffer_capacity_frames {
            return Err(StreamError::Config(format!(
                "prefill_duration_frames ({}) exceeds ring_buffer_capacity_frames ({})",
                self.prefill_duration_frames, self.ring_buffer_capacity_frames
            )));
        }
        if self.max_batch_frames == 0 {
            return Err(StreamError::Config("max_batch_frames must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::stable(DEFAULT_SAMPLE_RATE)
    }
}

/// Convert a duration in milliseconds to frames at `sample_rate`
pub fn frames_from_millis(sample_rate: u32, millis: u64) -> usize {
    ((sample_rate as u64 * millis) / 1000) as usize
}
