//! Audio device integration using rodio
//!
//! Plays blocks rendered by the session's callback on the system audio device.
//! rodio pulls samples one at a time from its own output thread; the source
//! refills a fixed block from the callback whenever the block is used up.

use super::{AudioBackend, DeviceStream};
use crate::config::StreamConfig;
use crate::consumer::RenderCallback;
use crate::{Result, StreamError};
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Audio source that renders through the callback
struct CallbackSource {
    callback: Box<dyn RenderCallback>,
    sample_rate: u32,
    channels: u16,
    finished: Arc<AtomicBool>,
    /// Block handed to the callback; allocated once
    block: Vec<f32>,
    /// Current position in the block
    block_pos: usize,
}

impl CallbackSource {
    fn new(
        callback: Box<dyn RenderCallback>,
        sample_rate: u32,
        channels: u16,
        block_frames: usize,
        finished: Arc<AtomicBool>,
    ) -> Self {
        let len = block_frames.max(1) * channels as usize;
        CallbackSource {
            callback,
            sample_rate,
            channels,
            finished,
            block: vec![0.0f32; len],
            block_pos: len, // Start by rendering a new block
        }
    }
}

impl Source for CallbackSource {
    fn current_frame_len(&self) -> Option<usize> {
        let remaining = self.block.len() - self.block_pos;
        if remaining > 0 {
            Some(remaining)
        } else {
            Some(self.block.len())
        }
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for CallbackSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.block_pos >= self.block.len() {
            self.callback.render(&mut self.block);
            self.block_pos = 0;
        }

        let sample = self.block[self.block_pos];
        self.block_pos += 1;
        Some(sample)
    }
}

/// Backend for the default system output device
#[derive(Debug, Clone, Copy)]
pub struct RodioDevice {
    block_frames: usize,
}

impl RodioDevice {
    /// Render `block_frames` frames per callback invocation
    pub fn new(block_frames: usize) -> Self {
        RodioDevice { block_frames }
    }
}

impl Default for RodioDevice {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl AudioBackend for RodioDevice {
    fn open(
        &mut self,
        config: &StreamConfig,
        callback: Box<dyn RenderCallback>,
    ) -> Result<Box<dyn DeviceStream>> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| StreamError::AudioDevice(format!("Failed to create audio stream: {e}")))?;

        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| StreamError::AudioDevice(format!("Failed to create audio sink: {e}")))?;

        let finished = Arc::new(AtomicBool::new(false));
        let source = CallbackSource::new(
            callback,
            config.sample_rate,
            config.channels,
            self.block_frames,
            Arc::clone(&finished),
        );
        sink.append(source);

        debug!(
            "rodio output opened at {} Hz, {} channels",
            config.sample_rate, config.channels
        );

        Ok(Box::new(RodioStream {
            _stream: stream,
            sink,
            finished,
        }))
    }
}

/// Open rodio output
struct RodioStream {
    _stream: OutputStream,
    sink: Sink,
    finished: Arc<AtomicBool>,
}

impl DeviceStream for RodioStream {
    fn stop(&mut self) -> Result<()> {
        // The source ends on its next sample instead of playing silence forever
        self.finished.store(true, Ordering::Relaxed);
        self.sink.stop();
        Ok(())
    }

    fn is_running(&self) -> bool {
        !self.finished.load(Ordering::Relaxed) && !self.sink.empty()
    }
}

impl Drop for RodioStream {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::Relaxed);
        self.sink.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp(f32);

    impl RenderCallback for Ramp {
        fn render(&mut self, dest: &mut [f32]) {
            for s in dest.iter_mut() {
                *s = self.0;
                self.0 += 1.0;
            }
        }
    }

    #[test]
    fn test_source_reports_format() {
        let finished = Arc::new(AtomicBool::new(false));
        let source = CallbackSource::new(Box::new(Ramp(0.0)), 44_100, 2, 256, finished);
        assert_eq!(source.sample_rate(), 44_100);
        assert_eq!(source.channels(), 2);
        assert_eq!(source.current_frame_len(), Some(512));
    }

    #[test]
    fn test_source_renders_in_blocks() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut source = CallbackSource::new(Box::new(Ramp(0.0)), 48_000, 1, 4, finished);
        let samples: Vec<f32> = source.by_ref().take(10).collect();
        assert_eq!(samples, (0..10).map(|v| v as f32).collect::<Vec<_>>());
        assert_eq!(source.current_frame_len(), Some(2));
    }

    #[test]
    fn test_source_finished_signal() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut source =
            CallbackSource::new(Box::new(Ramp(0.0)), 48_000, 1, 4, Arc::clone(&finished));
        assert!(source.next().is_some());
        finished.store(true, Ordering::Relaxed);
        assert_eq!(source.next(), None);
    }

    #[test]
    fn test_open_default_device() {
        let config = StreamConfig::low_latency(48_000);
        let mut device = RodioDevice::default();
        let mut stream = match device.open(&config, Box::new(Ramp(0.0))) {
            Ok(stream) => stream,
            Err(err) => {
                eprintln!("Skipping rodio device test (audio backend unavailable): {err}");
                return;
            }
        };
        stream.stop().unwrap();
        assert!(!stream.is_running());
    }
}
