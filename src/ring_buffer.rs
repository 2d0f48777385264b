//! Ring buffer shared by the producer thread and the device callback
//!
//! A ring buffer (circular buffer) allows two threads to operate concurrently:
//! - Producer thread: pulls frames from the generator and writes them in
//! - Consumer thread: the audio device callback reading frames out
//!
//! Cursors are unbounded, monotonically increasing frame counters; the physical
//! slot of a cursor is `cursor % capacity`. Callers never see physical offsets.
//!
//! Memory consumption is fixed at `capacity * channels * sizeof(f32)`.
//! Storage is guarded by a `parking_lot::Mutex`; the cursors are atomics published
//! with release ordering after the copy and loaded with acquire ordering before
//! computing `available()`/`free()`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Error type for ring buffer construction
#[derive(Debug, Clone)]
pub struct RingBufferError(pub String);

impl std::fmt::Display for RingBufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RingBufferError {}

/// Point-in-time view of both cursors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursors {
    /// Frames consumed so far
    pub read: u64,
    /// Frames produced so far
    pub write: u64,
}

impl Cursors {
    /// Distance between the cursors (the lead)
    pub fn lead(&self) -> usize {
        self.write.saturating_sub(self.read) as usize
    }
}

/// Ring buffer for streaming interleaved audio frames
///
/// # Thread Safety
/// - Exactly one producer thread calls [`write`](Self::write)
/// - Exactly one consumer calls [`read`](Self::read) / [`try_read`](Self::try_read)
/// - Invariant: `read_cursor <= write_cursor <= read_cursor + capacity`
#[derive(Debug)]
pub struct RingBuffer {
    /// Interleaved sample storage (`capacity * channels` samples)
    buffer: Mutex<Vec<f32>>,
    /// Write cursor in frames (producer)
    write_pos: AtomicU64,
    /// Read cursor in frames (consumer)
    read_pos: AtomicU64,
    /// Capacity in frames
    capacity: usize,
    /// Samples per frame
    channels: usize,
}

impl RingBuffer {
    /// Create a new ring buffer holding `capacity` frames of `channels` samples
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Requested capacity or channel count is 0
    /// - Requested size would exceed maximum safe allocation (512 MB)
    pub fn new(capacity: usize, channels: u16) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError(
                "Ring buffer capacity must be greater than 0".into(),
            ));
        }
        if channels == 0 {
            return Err(RingBufferError(
                "Ring buffer channel count must be greater than 0".into(),
            ));
        }

        let channels = channels as usize;
        let samples = capacity
            .checked_mul(channels)
            .filter(|&s| s <= crate::config::MAX_RING_BUFFER_SAMPLES)
            .ok_or_else(|| {
                RingBufferError(format!(
                    "Ring buffer capacity {capacity} frames x {channels} channels exceeds maximum safe size {}",
                    crate::config::MAX_RING_BUFFER_SAMPLES
                ))
            })?;

        Ok(RingBuffer {
            buffer: Mutex::new(vec![0.0; samples]),
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
            capacity,
            channels,
        })
    }

    /// Hold the storage lock, as a producer mid-copy would
    #[cfg(test)]
    pub(crate) fn lock_storage(&self) -> parking_lot::MutexGuard<'_, Vec<f32>> {
        self.buffer.lock()
    }

    /// Capacity in frames
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per frame
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Snapshot both cursors (read first, so `write >= read` always holds)
    pub fn cursors(&self) -> Cursors {
        let read = self.read_pos.load(Ordering::Acquire);
        let write = self.write_pos.load(Ordering::Acquire);
        Cursors { read, write }
    }

    /// Frames available to read
    pub fn available(&self) -> usize {
        self.cursors().lead().min(self.capacity)
    }

    /// Frames that can be written without overwriting unread data
    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    /// Write interleaved frames (producer)
    ///
    /// Copies up to `free()` frames and returns the number of frames written.
    /// Never blocks on the consumer; the storage lock is only contended by a
    /// concurrent copy.
    pub fn write(&self, samples: &[f32]) -> usize {
        debug_assert!(
            samples.len() % self.channels == 0,
            "write of {} samples is not a whole number of {}-channel frames",
            samples.len(),
            self.channels
        );

        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        debug_assert!(read_pos <= write_pos, "read cursor passed write cursor");
        let used = write_pos.saturating_sub(read_pos) as usize;
        debug_assert!(used <= self.capacity, "write cursor overran read cursor");
        let free = self.capacity.saturating_sub(used);

        let to_write = (samples.len() / self.channels).min(free);
        if to_write == 0 {
            return 0;
        }

        {
            let mut buf = self.buffer.lock();
            self.copy_in(&mut buf, write_pos, &samples[..to_write * self.channels]);
        }

        // Publish only after the copy is complete
        self.write_pos
            .store(write_pos + to_write as u64, Ordering::Release);

        to_write
    }

    /// Read interleaved frames (consumer), waiting for a concurrent copy to finish
    ///
    /// Returns the number of frames read. Not for use on a realtime thread; see
    /// [`try_read`](Self::try_read).
    pub fn read(&self, dest: &mut [f32]) -> usize {
        let buf = self.buffer.lock();
        self.read_locked(&buf, dest)
    }

    /// Read interleaved frames without ever waiting
    ///
    /// Returns `None` when the storage lock is held by the producer; callers on
    /// a realtime thread treat that exactly like an empty buffer.
    pub fn try_read(&self, dest: &mut [f32]) -> Option<usize> {
        let buf = self.buffer.try_lock()?;
        Some(self.read_locked(&buf, dest))
    }

    /// Drain and discard all buffered frames
    ///
    /// Only valid from the consumer side or once the producer has stopped.
    pub fn flush(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }

    /// Check if the buffer has any frames to read
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Check if the buffer is full
    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Get fill percentage (0.0 to 1.0)
    pub fn fill_percentage(&self) -> f32 {
        (self.available() as f32) / (self.capacity as f32)
    }

    fn read_locked(&self, buf: &[f32], dest: &mut [f32]) -> usize {
        debug_assert!(
            dest.len() % self.channels == 0,
            "read of {} samples is not a whole number of {}-channel frames",
            dest.len(),
            self.channels
        );

        // Acquire pairs with the producer's release store
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        debug_assert!(read_pos <= write_pos, "read cursor passed write cursor");
        let available = (write_pos.saturating_sub(read_pos) as usize).min(self.capacity);

        let to_read = (dest.len() / self.channels).min(available);
        if to_read == 0 {
            return 0;
        }

        self.copy_out(buf, read_pos, &mut dest[..to_read * self.channels]);

        self.read_pos
            .store(read_pos + to_read as u64, Ordering::Release);

        to_read
    }

    /// Copy `src` into storage starting at frame cursor `pos`, wrapping once at most
    fn copy_in(&self, buf: &mut [f32], pos: u64, src: &[f32]) {
        let start = self.physical(pos);
        let end_of_storage = buf.len();
        if start + src.len() <= end_of_storage {
            buf[start..start + src.len()].copy_from_slice(src);
        } else {
            let first_part = end_of_storage - start;
            buf[start..].copy_from_slice(&src[..first_part]);
            buf[..src.len() - first_part].copy_from_slice(&src[first_part..]);
        }
    }

    /// Copy from storage starting at frame cursor `pos` into `dest`, wrapping once at most
    fn copy_out(&self, buf: &[f32], pos: u64, dest: &mut [f32]) {
        let start = self.physical(pos);
        let end_of_storage = buf.len();
        let len = dest.len();
        if start + len <= end_of_storage {
            dest.copy_from_slice(&buf[start..start + len]);
        } else {
            let first_part = end_of_storage - start;
            dest[..first_part].copy_from_slice(&buf[start..]);
            dest[first_part..].copy_from_slice(&buf[..len - first_part]);
        }
    }

    /// Sample offset of a frame cursor
    fn physical(&self, pos: u64) -> usize {
        (pos % self.capacity as u64) as usize * self.channels
    }
}
