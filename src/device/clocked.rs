//! Software-clocked device
//!
//! Stands in for a hardware clock: a dedicated thread invokes the callback
//! with one block every `block_frames / sample_rate` seconds, scheduling each
//! tick from the previous deadline so the cadence does not drift.

use super::{AudioBackend, DeviceStream};
use crate::config::StreamConfig;
use crate::consumer::RenderCallback;
use crate::{Result, StreamError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Device that pulls fixed blocks on a timer thread
#[derive(Debug, Clone)]
pub struct ClockedDevice {
    block_frames: usize,
    capture: Option<Arc<Mutex<Vec<f32>>>>,
}

impl ClockedDevice {
    /// Pull `block_frames` frames per tick
    pub fn new(block_frames: usize) -> Self {
        ClockedDevice {
            block_frames: block_frames.max(1),
            capture: None,
        }
    }

    /// Keep a copy of everything rendered (for inspection in tests)
    pub fn with_capture(mut self) -> Self {
        self.capture = Some(Arc::new(Mutex::new(Vec::new())));
        self
    }

    /// Samples rendered so far, if capture is enabled
    pub fn captured(&self) -> Option<Vec<f32>> {
        self.capture.as_ref().map(|c| c.lock().clone())
    }

    /// Frames per tick
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }
}

impl AudioBackend for ClockedDevice {
    fn open(
        &mut self,
        config: &StreamConfig,
        mut callback: Box<dyn RenderCallback>,
    ) -> Result<Box<dyn DeviceStream>> {
        let period =
            Duration::from_secs_f64(self.block_frames as f64 / config.sample_rate as f64);
        let mut block = vec![0.0f32; self.block_frames * config.channels as usize];
        let capture = self.capture.clone();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("pcm-device-clock".into())
            .spawn(move || {
                let mut next = Instant::now();
                while thread_running.load(Ordering::Acquire) {
                    callback.render(&mut block);
                    if let Some(capture) = &capture {
                        capture.lock().extend_from_slice(&block);
                    }

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else if now - next > period * 4 {
                        // Fell far behind (debugger, suspended VM): resync instead of bursting
                        warn!("device clock fell {:?} behind, resyncing", now - next);
                        next = now;
                    }
                }
            })
            .map_err(|e| StreamError::AudioDevice(format!("Failed to spawn device clock: {e}")))?;

        debug!(
            "clocked device started: {} frames every {:?}",
            self.block_frames, period
        );

        Ok(Box::new(ClockedStream {
            running,
            handle: Some(handle),
        }))
    }
}

/// Running clocked device
pub struct ClockedStream {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceStream for ClockedStream {
    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| StreamError::AudioDevice("device clock thread panicked".into()))?;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ClockedStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting(Arc<AtomicUsize>);

    impl RenderCallback for Counting {
        fn render(&mut self, dest: &mut [f32]) {
            self.0.fetch_add(1, Ordering::Relaxed);
            dest.fill(0.1);
        }
    }

    #[test]
    fn test_clock_invokes_callback_until_stopped() {
        let config = StreamConfig::stable(48_000).with_channels(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut device = ClockedDevice::new(480).with_capture();

        let mut stream = device
            .open(&config, Box::new(Counting(Arc::clone(&calls))))
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(stream.is_running());
        stream.stop().unwrap();
        assert!(!stream.is_running());

        let n = calls.load(Ordering::Relaxed);
        // 10 ms period over ~100 ms; generous bounds for loaded CI machines
        assert!(n >= 2 && n <= 30, "callback ran {n} times");
        let captured = device.captured().unwrap();
        assert_eq!(captured.len(), n * 480);
        assert!(captured.iter().all(|&s| s == 0.1));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::Relaxed), n);
    }
}
