//! Audio device adapters
//!
//! A device owns the realtime clock: once opened it invokes the
//! [`RenderCallback`] with fixed-size blocks until its stream is stopped.
//! Backends:
//! - [`ManualDevice`]: blocks are pulled explicitly (tests, offline rendering)
//! - [`ClockedDevice`]: a thread pulls one block per block period
//! - `RodioDevice` (feature `device`): the system audio output via rodio

#[cfg(feature = "device")]
mod audio_device;
mod clocked;

#[cfg(feature = "device")]
pub use audio_device::RodioDevice;
pub use clocked::{ClockedDevice, ClockedStream};

use crate::config::StreamConfig;
use crate::consumer::RenderCallback;
use crate::{Result, StreamError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Handle to an open device stream
pub trait DeviceStream {
    /// Stop invoking the callback and release the device
    fn stop(&mut self) -> Result<()>;

    /// Whether the device is still invoking the callback
    fn is_running(&self) -> bool;
}

/// Something that can open a stream driving a render callback
pub trait AudioBackend {
    /// Open the device and start invoking `callback`
    fn open(
        &mut self,
        config: &StreamConfig,
        callback: Box<dyn RenderCallback>,
    ) -> Result<Box<dyn DeviceStream>>;
}

struct Attached {
    callback: Box<dyn RenderCallback>,
    channels: usize,
}

type Slot = Arc<Mutex<Option<Attached>>>;

/// Device whose blocks are requested by the caller
///
/// Clones share the attached callback, so a test can keep one clone and pass
/// another to the session.
#[derive(Clone, Default)]
pub struct ManualDevice {
    slot: Slot,
}

impl ManualDevice {
    /// Create a device with nothing attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a callback is attached
    pub fn is_attached(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Render into `dest`, returning false if nothing is attached
    pub fn pull_into(&self, dest: &mut [f32]) -> bool {
        match self.slot.lock().as_mut() {
            Some(attached) => {
                attached.callback.render(dest);
                true
            }
            None => false,
        }
    }

    /// Render one block of `frames` frames
    pub fn pull(&self, frames: usize) -> Option<Vec<f32>> {
        let mut slot = self.slot.lock();
        let attached = slot.as_mut()?;
        let mut block = vec![0.0f32; frames * attached.channels];
        attached.callback.render(&mut block);
        Some(block)
    }
}

impl AudioBackend for ManualDevice {
    fn open(
        &mut self,
        config: &StreamConfig,
        callback: Box<dyn RenderCallback>,
    ) -> Result<Box<dyn DeviceStream>> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(StreamError::AudioDevice(
                "manual device already has a stream attached".into(),
            ));
        }
        *slot = Some(Attached {
            callback,
            channels: config.channels as usize,
        });
        Ok(Box::new(ManualStream {
            slot: Arc::clone(&self.slot),
        }))
    }
}

struct ManualStream {
    slot: Slot,
}

impl DeviceStream for ManualStream {
    fn stop(&mut self) -> Result<()> {
        self.slot.lock().take();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.slot.lock().is_some()
    }
}
