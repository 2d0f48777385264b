//! Generator fed from another thread
//!
//! The simulation side pushes bursts through a [`GeneratorFeed`]; every push
//! wakes a parked producer. Dropping every feed ends the stream once the queued
//! bursts are consumed.

use super::{GeneratorError, SampleGenerator};
use crate::producer::ProducerWaker;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use tracing::warn;

enum FeedMessage {
    Samples(Vec<f32>),
    Failure(String),
}

type WakerSlot = Arc<Mutex<Option<ProducerWaker>>>;

/// Producer-thread end: pulls queued bursts
pub struct ChannelGenerator {
    rx: Receiver<FeedMessage>,
    channels: u16,
    /// Partially consumed burst
    pending: Vec<f32>,
    pending_pos: usize,
    disconnected: bool,
    waker: WakerSlot,
}

/// Simulation-thread end: pushes bursts of interleaved frames
#[derive(Clone)]
pub struct GeneratorFeed {
    tx: SyncSender<FeedMessage>,
    channels: u16,
    waker: WakerSlot,
}

impl ChannelGenerator {
    /// Create a generator and its feed, queueing at most `max_bursts` bursts
    pub fn new(channels: u16, max_bursts: usize) -> (ChannelGenerator, GeneratorFeed) {
        let channels = channels.max(1);
        let (tx, rx) = mpsc::sync_channel(max_bursts.max(1));
        let waker: WakerSlot = Arc::new(Mutex::new(None));
        let generator = ChannelGenerator {
            rx,
            channels,
            pending: Vec::new(),
            pending_pos: 0,
            disconnected: false,
            waker: Arc::clone(&waker),
        };
        let feed = GeneratorFeed {
            tx,
            channels,
            waker,
        };
        (generator, feed)
    }

    fn pending_len(&self) -> usize {
        self.pending.len() - self.pending_pos
    }
}

impl SampleGenerator for ChannelGenerator {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn produce(&mut self, dest: &mut [f32]) -> Result<usize, GeneratorError> {
        let mut filled = 0;
        while filled < dest.len() {
            if self.pending_len() == 0 {
                match self.rx.try_recv() {
                    Ok(FeedMessage::Samples(samples)) => {
                        self.pending = samples;
                        self.pending_pos = 0;
                        continue;
                    }
                    Ok(FeedMessage::Failure(reason)) => {
                        return Err(GeneratorError::Failed(reason));
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.disconnected = true;
                        break;
                    }
                }
            }

            let n = self.pending_len().min(dest.len() - filled);
            dest[filled..filled + n]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
            self.pending_pos += n;
            filled += n;
        }

        Ok(filled / self.channels as usize)
    }

    fn is_finished(&self) -> bool {
        self.disconnected && self.pending_len() == 0
    }

    fn attach_waker(&mut self, waker: ProducerWaker) {
        *self.waker.lock() = Some(waker);
    }

    fn wakes_on_data(&self) -> bool {
        self.waker.lock().is_some()
    }
}

impl GeneratorFeed {
    /// Queue a burst, waiting while the queue is full
    ///
    /// `samples` must hold whole frames.
    pub fn push(&self, samples: Vec<f32>) -> Result<(), GeneratorError> {
        self.check_frames(&samples)?;
        self.tx
            .send(FeedMessage::Samples(samples))
            .map_err(|_| GeneratorError::Disconnected)?;
        self.wake();
        Ok(())
    }

    /// Queue a burst without waiting; returns `Ok(false)` when the queue is full
    pub fn try_push(&self, samples: Vec<f32>) -> Result<bool, GeneratorError> {
        self.check_frames(&samples)?;
        match self.tx.try_send(FeedMessage::Samples(samples)) {
            Ok(()) => {
                self.wake();
                Ok(true)
            }
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(GeneratorError::Disconnected),
        }
    }

    /// Report a hard failure; the producer halts when it reaches this message
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), GeneratorError> {
        self.tx
            .send(FeedMessage::Failure(reason.into()))
            .map_err(|_| GeneratorError::Disconnected)?;
        self.wake();
        Ok(())
    }

    fn check_frames(&self, samples: &[f32]) -> Result<(), GeneratorError> {
        if samples.len() % self.channels as usize != 0 {
            warn!(
                "rejecting burst of {} samples for {} channels",
                samples.len(),
                self.channels
            );
            return Err(GeneratorError::Failed(format!(
                "burst of {} samples is not a whole number of {}-channel frames",
                samples.len(),
                self.channels
            )));
        }
        Ok(())
    }

    fn wake(&self) {
        if let Some(waker) = self.waker.lock().as_ref() {
            waker.wake();
        }
    }
}

impl Drop for GeneratorFeed {
    fn drop(&mut self) {
        // The last feed going away ends the stream; wake the producer to notice.
        // The generator side still holds one reference to the slot.
        if Arc::strong_count(&self.waker) <= 2 {
            self.wake();
        }
    }
}
