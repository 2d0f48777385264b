//! Sample sources feeding the producer loop
//!
//! A generator is pulled from the producer thread only. It may block internally,
//! may return zero frames when it has nothing yet, and reports end-of-stream
//! through [`SampleGenerator::is_finished`].

mod channel;
mod sine;

pub use channel::{ChannelGenerator, GeneratorFeed};
pub use sine::SineGenerator;

use crate::producer::ProducerWaker;

/// Errors reported by a sample generator
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    /// Unrecoverable generation failure
    #[error("{0}")]
    Failed(String),

    /// The other end of a generator channel is gone
    #[error("generator channel disconnected")]
    Disconnected,
}

/// Source of interleaved PCM frames
pub trait SampleGenerator: Send {
    /// Interleaved channels per frame
    fn channels(&self) -> u16;

    /// Fill the front of `dest` with whole frames and return the frame count
    ///
    /// `dest.len()` is a whole number of frames and bounds the batch. Returning
    /// `Ok(0)` means "no data yet" and is not an error.
    fn produce(&mut self, dest: &mut [f32]) -> Result<usize, GeneratorError>;

    /// True once the generator will never produce again
    fn is_finished(&self) -> bool {
        false
    }

    /// Receive a waker to signal "new data arrived" to a parked producer
    ///
    /// Generators that only produce when pulled can ignore it.
    fn attach_waker(&mut self, _waker: ProducerWaker) {}

    /// True if the generator wakes the producer whenever new data or
    /// end-of-stream arrives, so a producer waiting for data need not time out
    fn wakes_on_data(&self) -> bool {
        false
    }
}

impl<G: SampleGenerator + ?Sized> SampleGenerator for Box<G> {
    fn channels(&self) -> u16 {
        (**self).channels()
    }

    fn produce(&mut self, dest: &mut [f32]) -> Result<usize, GeneratorError> {
        (**self).produce(dest)
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }

    fn attach_waker(&mut self, waker: ProducerWaker) {
        (**self).attach_waker(waker)
    }

    fn wakes_on_data(&self) -> bool {
        (**self).wakes_on_data()
    }
}

/// Generator that always has silence available
#[derive(Debug, Clone, Copy)]
pub struct SilenceGenerator {
    channels: u16,
}

impl SilenceGenerator {
    /// Silence with `channels` channels
    pub fn new(channels: u16) -> Self {
        SilenceGenerator {
            channels: channels.max(1),
        }
    }
}

impl SampleGenerator for SilenceGenerator {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn produce(&mut self, dest: &mut [f32]) -> Result<usize, GeneratorError> {
        dest.fill(0.0);
        Ok(dest.len() / self.channels as usize)
    }
}
