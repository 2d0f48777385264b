//! State shared by the session controller, the producer thread and the device callback

use crate::config::StreamConfig;
use crate::producer::ProducerWaker;
use crate::ring_buffer::RingBuffer;
use crate::state::SharedPlaybackState;
use crate::telemetry::Telemetry;
use crate::Result;
use std::sync::Arc;

/// Everything both threads touch, created at session start and dropped after
/// both threads have let go of it
#[derive(Debug)]
pub struct StreamShared {
    /// Frame storage and cursors
    pub ring: RingBuffer,
    /// Underrun/overrun counters
    pub telemetry: Telemetry,
    /// Playback lifecycle
    pub state: SharedPlaybackState,
    /// Producer park/wake signal
    pub waker: ProducerWaker,
}

impl StreamShared {
    /// Allocate shared state for a validated configuration
    pub fn new(config: &StreamConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(StreamShared {
            ring: RingBuffer::new(config.ring_buffer_capacity_frames, config.channels)?,
            telemetry: Telemetry::new(),
            state: SharedPlaybackState::new(),
            waker: ProducerWaker::new(),
        }))
    }
}
