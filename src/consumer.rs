//! Realtime render callback
//!
//! The device invokes [`RenderCallback::render`] on its own realtime thread with a
//! fixed-size destination block. The callback must fill the whole block within
//! the deadline: it never blocks, never allocates, never logs and never fails.
//! Whatever the ring cannot supply is silence.

use crate::shared::StreamShared;
use std::sync::Arc;

/// Single-method sink interface the audio device drives
pub trait RenderCallback: Send {
    /// Fill `dest` (interleaved, whole frames) completely, with data or silence
    fn render(&mut self, dest: &mut [f32]);
}

/// Consumer side of the ring: reads, silence-fills, counts underruns
#[derive(Debug)]
pub struct ConsumerCallback {
    shared: Arc<StreamShared>,
    channels: usize,
}

impl ConsumerCallback {
    /// Create the callback for a session's shared state
    pub fn new(shared: Arc<StreamShared>) -> Self {
        let channels = shared.ring.channels();
        ConsumerCallback { shared, channels }
    }

    /// Interleaved channels per frame
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Render one block and return the number of frames of real data in it
    #[inline]
    pub fn render_block(&mut self, dest: &mut [f32]) -> usize {
        let shared = &*self.shared;
        let requested = dest.len() / self.channels;

        // Lock contention is treated exactly like an empty ring
        let (read, contended) = match shared.ring.try_read(&mut dest[..requested * self.channels])
        {
            Some(read) => (read, false),
            None => (0, true),
        };

        dest[read * self.channels..].fill(0.0);

        shared.telemetry.record_read(requested, read, contended);
        shared.telemetry.record_lead(shared.ring.available());

        if read > 0 {
            shared.waker.wake_from_realtime();
        }
        read
    }
}

impl RenderCallback for ConsumerCallback {
    fn render(&mut self, dest: &mut [f32]) {
        self.render_block(dest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::telemetry::BufferHealth;

    fn shared(channels: u16) -> Arc<StreamShared> {
        let config = StreamConfig::stable(48_000).with_channels(channels);
        StreamShared::new(&config).unwrap()
    }

    #[test]
    fn test_full_read_no_underrun() {
        let shared = shared(1);
        shared.ring.write(&[0.25; 800]);
        let mut consumer = ConsumerCallback::new(Arc::clone(&shared));
        let mut block = [1.0f32; 800];
        assert_eq!(consumer.render_block(&mut block), 800);
        assert!(block.iter().all(|&s| s == 0.25));
        assert_eq!(shared.telemetry.underrun_count(), 0);
    }

    #[test]
    fn test_shortfall_filled_with_silence() {
        let shared = shared(2);
        shared.ring.write(&[0.5; 200]);
        let mut consumer = ConsumerCallback::new(Arc::clone(&shared));
        let mut block = [1.0f32; 512];
        assert_eq!(consumer.render_block(&mut block), 100);
        assert!(block[..200].iter().all(|&s| s == 0.5));
        assert!(block[200..].iter().all(|&s| s == 0.0));
        assert_eq!(shared.telemetry.underrun_count(), 1);
        assert_eq!(shared.telemetry.snapshot().silence_frames, 156);
    }

    #[test]
    fn test_render_never_waits_for_storage_lock() {
        let shared = shared(1);
        shared.ring.write(&[0.75; 800]);
        let mut consumer = ConsumerCallback::new(Arc::clone(&shared));

        let guard = shared.ring.lock_storage();
        let (tx, rx) = std::sync::mpsc::channel();
        let render = std::thread::spawn(move || {
            let mut block = [1.0f32; 400];
            let read = consumer.render_block(&mut block);
            tx.send((read, block.iter().all(|&s| s == 0.0))).unwrap();
        });

        // A waiting consumer would still be stuck on the lock held above
        let result = rx.recv_timeout(std::time::Duration::from_secs(2));
        drop(guard);
        render.join().unwrap();

        let (read, silent) = result.expect("render blocked on the storage lock");
        assert_eq!(read, 0);
        assert!(silent);
        let telemetry = shared.telemetry.snapshot();
        assert_eq!(telemetry.underrun_count, 1);
        assert_eq!(telemetry.contention_count, 1);
        assert_eq!(telemetry.silence_frames, 400);
        // Nothing consumed: the data is still there once the lock is free
        assert_eq!(shared.ring.available(), 800);
    }

    #[test]
    fn test_empty_ring_is_silence_and_underrun_state() {
        let shared = shared(1);
        let mut consumer = ConsumerCallback::new(Arc::clone(&shared));
        let mut block = [1.0f32; 64];
        consumer.render(&mut block);
        assert!(block.iter().all(|&s| s == 0.0));
        assert_eq!(shared.telemetry.health(), BufferHealth::Underrun);
    }
}
