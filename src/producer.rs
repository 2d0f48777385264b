//! Background producer loop
//!
//! Runs in a dedicated thread: asks the [`LeadController`] for a write budget,
//! pulls at most that many frames from the generator, and writes them into the
//! ring. Whenever there is no budget or no data it parks on a condition variable
//! until the device frees space, the generator publishes data, or a stop is
//! requested.
//!
//! ```text
//! Idle ──(budget && data)──► Writing ──► Idle
//!  ▲                                      │
//!  └──────── park (no budget / no data) ◄─┘
//! ```

use crate::config::StreamConfig;
use crate::generator::{GeneratorError, SampleGenerator};
use crate::lead::LeadController;
use crate::shared::StreamShared;
use crate::state::PlaybackState;
use crate::telemetry::MetricsLog;
use crate::{Result, StreamError};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, trace};

#[derive(Debug, Default)]
struct WakeInner {
    /// Set by producer-side notifiers under the lock
    pending: Mutex<bool>,
    /// Set by the realtime callback without taking the lock
    pending_rt: AtomicBool,
    stop: AtomicBool,
    cond: Condvar,
}

/// Wake/stop signal for a parked producer
///
/// Cheap to clone; every clone refers to the same signal.
#[derive(Debug, Clone, Default)]
pub struct ProducerWaker {
    inner: Arc<WakeInner>,
}

impl ProducerWaker {
    /// Create an un-signalled waker
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the producer ("new data arrived")
    ///
    /// Takes the wait lock briefly; never call from the device callback.
    pub fn wake(&self) {
        *self.inner.pending.lock() = true;
        self.inner.cond.notify_one();
    }

    /// Wake the producer from the realtime callback ("space freed")
    ///
    /// Lock-free. A notify racing the producer's predicate check can be missed;
    /// the producer's bounded park covers that window.
    #[inline]
    pub fn wake_from_realtime(&self) {
        self.inner.pending_rt.store(true, Ordering::Release);
        self.inner.cond.notify_one();
    }

    /// Ask the producer to exit and wake it so it notices
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
        self.wake();
    }

    /// Whether a stop was requested
    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::Acquire)
    }

    /// Park until woken, stopped, or `timeout` elapses
    ///
    /// Returns true if a wake or stop was observed.
    pub fn park(&self, timeout: Duration) -> bool {
        let mut pending = self.inner.pending.lock();
        loop {
            if *pending
                || self.inner.pending_rt.swap(false, Ordering::AcqRel)
                || self.is_stop_requested()
            {
                *pending = false;
                return true;
            }
            if self.inner.cond.wait_for(&mut pending, timeout).timed_out() {
                let woken = std::mem::take(&mut *pending)
                    || self.inner.pending_rt.swap(false, Ordering::AcqRel);
                return woken || self.is_stop_requested();
            }
        }
    }
    /// Park with no timeout until woken or stopped
    ///
    /// Only for waits that every relevant notifier signals through
    /// [`wake`](Self::wake) or [`request_stop`](Self::request_stop), both of
    /// which take the wait lock and so cannot be missed.
    pub fn park_until_woken(&self) {
        let mut pending = self.inner.pending.lock();
        while !(*pending
            || self.inner.pending_rt.swap(false, Ordering::AcqRel)
            || self.is_stop_requested())
        {
            self.inner.cond.wait(&mut pending);
        }
        *pending = false;
    }
}

/// Result of one producer cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Frames were written; run another cycle right away
    Wrote(usize),
    /// Lead at or above target (or overrun latched); park
    NoBudget,
    /// Budget available but the generator had nothing; park
    NoData,
    /// Generator reached end-of-stream
    Finished,
}

/// Why the producer thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerExit {
    /// Stop was requested by the session
    Stopped,
    /// The generator ran out
    Finished,
    /// The generator failed; no retry is attempted
    Failed(GeneratorError),
}

/// Producer state machine, owned by the producer thread
pub struct ProducerLoop<G: SampleGenerator> {
    shared: Arc<StreamShared>,
    generator: G,
    lead: LeadController,
    /// Reusable generator batch (`max_batch_frames * channels` samples)
    scratch: Vec<f32>,
    channels: usize,
    park_timeout: Duration,
    metrics: MetricsLog,
}

impl<G: SampleGenerator> ProducerLoop<G> {
    /// Create a producer for `generator`, handing it the session's waker
    pub fn new(shared: Arc<StreamShared>, mut generator: G, config: &StreamConfig) -> Self {
        generator.attach_waker(shared.waker.clone());
        ProducerLoop {
            lead: LeadController::new(config.lead_target()),
            scratch: vec![0.0; config.samples_for(config.max_batch_frames)],
            channels: config.channels as usize,
            park_timeout: config.park_timeout(),
            metrics: MetricsLog::new(config.metrics_interval(), shared.ring.capacity()),
            shared,
            generator,
        }
    }

    /// Lead controller state (for diagnostics and tests)
    pub fn lead(&self) -> &LeadController {
        &self.lead
    }

    /// Run one cycle: budget, pull, write
    pub fn step(&mut self) -> std::result::Result<StepOutcome, GeneratorError> {
        let ring = &self.shared.ring;
        let telemetry = &self.shared.telemetry;

        let budget = self.lead.budget(ring.cursors(), ring.capacity());
        telemetry.record_lead(budget.lead);
        self.metrics.observe_lead(budget.lead);
        if budget.entered_overrun {
            telemetry.enter_overrun();
            debug!(
                "lead {} above ceiling {}, holding producer",
                budget.lead,
                self.lead.target().max_lead_frames
            );
        } else if budget.left_overrun {
            telemetry.leave_overrun();
            debug!("lead back to {}, resuming producer", budget.lead);
        }

        if budget.frames == 0 {
            return Ok(StepOutcome::NoBudget);
        }

        let max_frames = self.scratch.len() / self.channels;
        let frames = budget.frames.min(max_frames);
        let batch = &mut self.scratch[..frames * self.channels];
        let produced = self.generator.produce(batch)?;
        debug_assert!(
            produced <= frames,
            "generator returned {produced} frames for a {frames}-frame batch"
        );
        let produced = produced.min(frames);

        if produced == 0 {
            if self.generator.is_finished() {
                return Ok(StepOutcome::Finished);
            }
            return Ok(StepOutcome::NoData);
        }

        let written = ring.write(&self.scratch[..produced * self.channels]);
        // The budget never exceeds free(), and only this thread adds data
        debug_assert_eq!(written, produced, "ring write short of budgeted batch");
        if written < produced {
            error!(
                "ring accepted {written} of {produced} budgeted frames; dropping the rest"
            );
        }
        telemetry.record_write(written);
        trace!("wrote {written} frames (lead was {})", budget.lead);

        Ok(StepOutcome::Wrote(written))
    }

    /// Drive the loop until stop, end-of-stream, or generator failure
    pub fn run(mut self) -> ProducerExit {
        debug!("producer started");

        let exit = loop {
            if self.shared.waker.is_stop_requested() {
                break ProducerExit::Stopped;
            }

            match self.step() {
                Ok(StepOutcome::Wrote(_)) => {}
                Ok(StepOutcome::NoData) if self.generator.wakes_on_data() => {
                    // The generator signals new data itself; no backstop needed
                    self.shared.waker.park_until_woken();
                }
                Ok(StepOutcome::NoBudget) | Ok(StepOutcome::NoData) => {
                    self.shared.waker.park(self.park_timeout);
                }
                Ok(StepOutcome::Finished) => break ProducerExit::Finished,
                Err(e) => {
                    error!("generator failed, halting producer: {e}");
                    break ProducerExit::Failed(e);
                }
            }

            self.metrics.maybe_log(&self.shared.telemetry);
        };

        if exit != ProducerExit::Stopped {
            // Generator ended on its own: the device keeps draining what is buffered
            self.shared
                .state
                .transition(PlaybackState::Playing, PlaybackState::Draining);
        }

        debug!("producer finished: {exit:?}");
        exit
    }
}

impl<G: SampleGenerator + 'static> ProducerLoop<G> {
    /// Run the loop on a named thread
    pub fn spawn(self) -> Result<JoinHandle<ProducerExit>> {
        std::thread::Builder::new()
            .name("pcm-producer".into())
            .spawn(move || self.run())
            .map_err(|e| StreamError::Other(format!("Failed to spawn producer thread: {e}")))
    }
}
