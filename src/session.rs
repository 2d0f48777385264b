//! Session controller
//!
//! Owns the lifecycle of one stream:
//! - Allocates the shared ring/telemetry/state
//! - Runs the prefill, then moves `Prefilling -> Playing`
//! - Starts the producer thread and attaches the consumer callback to the device
//! - On stop: halts the producer, lets the device drain, then `Stopped`

use crate::config::StreamConfig;
use crate::consumer::ConsumerCallback;
use crate::device::{AudioBackend, DeviceStream};
use crate::generator::SampleGenerator;
use crate::prefill::{PrefillManager, PrefillReport};
use crate::producer::{ProducerExit, ProducerLoop};
use crate::shared::StreamShared;
use crate::state::PlaybackState;
use crate::telemetry::{BufferHealth, TelemetrySnapshot};
use crate::{Result, StreamError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll interval while waiting for the device to drain
const DRAIN_POLL: Duration = Duration::from_millis(1);

/// Summary returned by [`Session::stop`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Final counters
    pub telemetry: TelemetrySnapshot,
    /// What the prefill pushed
    pub prefill: PrefillReport,
    /// Why the producer ended
    pub exit: ProducerExit,
    /// Whether the device consumed every buffered frame before teardown
    pub drained: bool,
    /// Session duration
    pub elapsed: Duration,
}

/// A running stream: producer thread plus attached device
pub struct Session {
    config: StreamConfig,
    shared: Arc<StreamShared>,
    producer: Option<JoinHandle<ProducerExit>>,
    exit: Option<ProducerExit>,
    stream: Option<Box<dyn DeviceStream>>,
    prefill: PrefillReport,
    started: Instant,
}

impl Session {
    /// Prefill, start the producer, and attach the device
    ///
    /// # Errors
    /// - Invalid configuration or generator channel mismatch
    /// - Generator failure during prefill
    /// - Device open failure (the producer is stopped before returning)
    pub fn start<G, B>(config: StreamConfig, mut generator: G, backend: &mut B) -> Result<Session>
    where
        G: SampleGenerator + 'static,
        B: AudioBackend + ?Sized,
    {
        if generator.channels() != config.channels {
            return Err(StreamError::Config(format!(
                "generator produces {} channels, stream expects {}",
                generator.channels(),
                config.channels
            )));
        }

        let shared = StreamShared::new(&config)?;
        let started = Instant::now();

        let prefill = match PrefillManager::new(&config).run(&shared, &mut generator) {
            Ok(report) => report,
            Err(e) => {
                shared
                    .state
                    .transition(PlaybackState::Prefilling, PlaybackState::Stopped);
                return Err(e);
            }
        };
        shared
            .state
            .transition(PlaybackState::Prefilling, PlaybackState::Playing);

        let producer = ProducerLoop::new(Arc::clone(&shared), generator, &config).spawn()?;

        let mut session = Session {
            config,
            shared: Arc::clone(&shared),
            producer: Some(producer),
            exit: None,
            stream: None,
            prefill,
            started,
        };

        let callback = Box::new(ConsumerCallback::new(shared));
        match backend.open(&session.config, callback) {
            Ok(stream) => session.stream = Some(stream),
            Err(e) => {
                warn!("device open failed, stopping producer: {e}");
                // Nothing will drain the prefill; tear down right away
                session.halt_producer()?;
                session
                    .shared
                    .state
                    .transition(PlaybackState::Draining, PlaybackState::Stopped);
                return Err(e);
            }
        }

        info!(
            "stream started: {} Hz, {} ch, target lead {} frames ({:.1} ms), prefill {} frames",
            session.config.sample_rate,
            session.config.channels,
            session.config.target_lead_frames,
            session.config.latency_ms(),
            session.prefill.total_frames()
        );
        Ok(session)
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        self.shared.state.get()
    }

    /// Current counters
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.shared.telemetry.snapshot()
    }

    /// Current buffer health
    pub fn health(&self) -> BufferHealth {
        self.shared.telemetry.health()
    }

    /// Frames buffered between the cursors
    pub fn buffered_frames(&self) -> usize {
        self.shared.ring.available()
    }

    /// What the prefill pushed
    pub fn prefill_report(&self) -> PrefillReport {
        self.prefill
    }

    /// Session configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Shared state (ring, telemetry, lifecycle)
    pub fn shared(&self) -> &Arc<StreamShared> {
        &self.shared
    }

    /// Whether the producer thread has exited (end-of-stream or failure)
    pub fn producer_finished(&self) -> bool {
        self.producer.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait up to `timeout` for the producer to exit on its own
    pub fn wait_for_producer(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.producer_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(DRAIN_POLL);
        }
        true
    }

    /// Halt the producer and enter `Draining`; the device keeps consuming
    ///
    /// Idempotent. Returns the error of a panicked producer thread.
    pub fn request_stop(&mut self) -> Result<()> {
        self.halt_producer()
    }

    /// How the producer ended, once it has
    ///
    /// Returns `None` while the producer is still running. A generator failure
    /// shows up here as [`ProducerExit::Failed`] without stopping the session.
    pub fn producer_exit(&mut self) -> Result<Option<&ProducerExit>> {
        if self.producer.as_ref().is_some_and(|h| h.is_finished()) {
            self.join_producer()?;
        }
        Ok(self.exit.as_ref())
    }

    /// Stop the session: halt the producer, drain, detach the device
    ///
    /// A generator failure that halted the producer is reported here as
    /// [`StreamError::Generator`]. Use [`shutdown`](Self::shutdown) to keep the
    /// report in that case.
    pub fn stop(self) -> Result<SessionReport> {
        let report = self.shutdown()?;
        if let ProducerExit::Failed(e) = &report.exit {
            return Err(StreamError::Generator(e.clone()));
        }
        Ok(report)
    }

    /// Same teardown as [`stop`](Self::stop), but a generator failure is left
    /// in [`SessionReport::exit`] instead of becoming an error
    pub fn shutdown(mut self) -> Result<SessionReport> {
        self.halt_producer()?;
        let drained = self.drain();
        self.detach_device()?;
        self.shared
            .state
            .transition(PlaybackState::Draining, PlaybackState::Stopped);

        let report = SessionReport {
            telemetry: self.shared.telemetry.snapshot(),
            prefill: self.prefill,
            exit: self.exit.clone().unwrap_or(ProducerExit::Stopped),
            drained,
            elapsed: self.started.elapsed(),
        };

        info!(
            "stream stopped after {:?}: {} frames played, {} silence, {} underruns, {} overruns",
            report.elapsed,
            report.telemetry.frames_read,
            report.telemetry.silence_frames,
            report.telemetry.underrun_count,
            report.telemetry.overrun_count
        );
        Ok(report)
    }

    fn halt_producer(&mut self) -> Result<()> {
        if self.producer.is_none() {
            return Ok(());
        }

        self.shared.waker.request_stop();
        self.shared
            .state
            .transition(PlaybackState::Playing, PlaybackState::Draining);
        self.join_producer()
    }

    fn join_producer(&mut self) -> Result<()> {
        let Some(handle) = self.producer.take() else {
            return Ok(());
        };
        let exit = handle.join().map_err(|_| StreamError::ProducerPanicked)?;
        debug!("producer joined: {exit:?}");
        self.exit = Some(exit);
        Ok(())
    }

    /// Wait for the device to consume what is buffered
    fn drain(&self) -> bool {
        let running = self.stream.as_ref().is_some_and(|s| s.is_running());
        if !running {
            return self.shared.ring.is_empty();
        }

        let deadline = Instant::now() + self.config.drain_timeout();
        while !self.shared.ring.is_empty() {
            if Instant::now() >= deadline {
                warn!(
                    "drain timed out with {} frames buffered",
                    self.shared.ring.available()
                );
                return false;
            }
            std::thread::sleep(DRAIN_POLL);
        }
        true
    }

    fn detach_device(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("buffered_frames", &self.buffered_frames())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Dropped without stop(): tear down without waiting for a drain
        if let Err(e) = self.halt_producer() {
            warn!("producer teardown failed: {e}");
        }
        if let Err(e) = self.detach_device() {
            warn!("device teardown failed: {e}");
        }
        self.shared
            .state
            .transition(PlaybackState::Draining, PlaybackState::Stopped);
    }
}
