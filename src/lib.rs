//! Lead-controlled PCM streaming
//!
//! Moves audio frames from an asynchronous, bursty sample generator to a
//! hardware-clocked audio callback through a bounded ring buffer. A lead
//! controller keeps the producer's write cursor a bounded distance ahead of the
//! consumer's read cursor, so playback neither starves (dropouts) nor drifts
//! into excess latency.
//!
//! # Architecture
//!
//! ```text
//! Generator ──► ProducerLoop ──(RingBuffer)──► ConsumerCallback ──► Audio device
//!                    ▲                                 │
//!                    └────── LeadController ◄── cursors┘
//! ```
//!
//! - The producer thread may block; it parks whenever it has no write budget or
//!   the generator has no data, and is woken by the consumer freeing space, the
//!   generator publishing data, or a stop request.
//! - The consumer runs on the device's realtime thread. It never blocks, never
//!   allocates and never fails: shortfalls are filled with silence and counted.
//!
//! # Crate feature flags
//! - `device` (opt-in): real-time output to the system audio device via rodio
//!
//! # Quick start
//! ```no_run
//! use pcm_lead::{ClockedDevice, Session, SineGenerator, StreamConfig};
//!
//! let config = StreamConfig::low_latency(48_000);
//! let tone = SineGenerator::new(440.0, 0.5, config.sample_rate, config.channels);
//! let mut device = ClockedDevice::new(800);
//! let session = Session::start(config, tone, &mut device).unwrap();
//! std::thread::sleep(std::time::Duration::from_millis(500));
//! let report = session.stop().unwrap();
//! println!("underruns: {}", report.telemetry.underrun_count);
//! ```

#![warn(missing_docs)]

pub mod config; // Session configuration
pub mod consumer; // Realtime render callback
pub mod device; // Audio device adapters
pub mod generator; // Sample sources
pub mod lead; // Lead-time control
pub mod prefill; // Startup buffering
pub mod producer; // Background producer loop
pub mod ring_buffer; // Shared frame storage
pub mod session; // Session controller
pub mod shared; // Cross-thread state
pub mod state; // Playback lifecycle
pub mod telemetry; // Underrun/overrun counters

use generator::GeneratorError;
use ring_buffer::RingBufferError;

/// Error types for streaming sessions
///
/// Underruns and overruns are not errors; they are recorded in [`Telemetry`].
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Ring buffer construction failed
    #[error("Ring buffer error: {0}")]
    RingBuffer(#[from] RingBufferError),

    /// The sample generator reported a hard failure
    #[error("Generator failure: {0}")]
    Generator(#[from] GeneratorError),

    /// Audio device open/close failure
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// The producer thread panicked
    #[error("Producer thread panicked")]
    ProducerPanicked,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for StreamError {
    /// Converts a String into `StreamError::Other`.
    ///
    /// Prefer the specific variants (`Config`, `AudioDevice`) where the failure
    /// kind is known.
    fn from(msg: String) -> Self {
        StreamError::Other(msg)
    }
}

impl From<&str> for StreamError {
    /// Converts a string slice into `StreamError::Other`.
    fn from(msg: &str) -> Self {
        StreamError::Other(msg.to_string())
    }
}

/// Result type for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;

// Public API exports
pub use config::StreamConfig;
pub use consumer::{ConsumerCallback, RenderCallback};
#[cfg(feature = "device")]
pub use device::RodioDevice;
pub use device::{AudioBackend, ClockedDevice, DeviceStream, ManualDevice};
pub use generator::{
    ChannelGenerator, GeneratorFeed, SampleGenerator, SilenceGenerator, SineGenerator,
};
pub use lead::{LeadController, LeadState, LeadTarget, WriteBudget};
pub use prefill::{PrefillManager, PrefillMode, PrefillReport};
pub use producer::{ProducerExit, ProducerLoop, ProducerWaker, StepOutcome};
pub use ring_buffer::RingBuffer;
pub use session::{Session, SessionReport};
pub use shared::StreamShared;
pub use state::{PlaybackState, SharedPlaybackState};
pub use telemetry::{BufferHealth, Telemetry, TelemetrySnapshot};
