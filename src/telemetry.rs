//! Underrun/overrun counters and buffer health monitoring
//!
//! Counters are plain atomics with no cross-field consistency: the consumer
//! callback and the producer each own the fields they write, and readers only
//! get a best-effort [`TelemetrySnapshot`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Buffer health as seen from both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferHealth {
    /// Reads are satisfied and the lead is within bounds
    Healthy,
    /// The last consumer read found too little data
    Underrun,
    /// The producer is held off because the lead exceeded its ceiling
    Overrun,
}

/// Shared counters, written by the producer and the consumer callback
#[derive(Debug, Default)]
pub struct Telemetry {
    underrun_count: AtomicU64,
    overrun_count: AtomicU64,
    last_lead_frames: AtomicUsize,
    frames_written: AtomicU64,
    frames_read: AtomicU64,
    silence_frames: AtomicU64,
    contention_count: AtomicU64,
    underrun_active: AtomicBool,
    overrun_active: AtomicBool,
}

/// Point-in-time copy of [`Telemetry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    /// Consumer reads that came up short
    pub underrun_count: u64,
    /// Transitions into the overrun state
    pub overrun_count: u64,
    /// Most recently observed lead
    pub last_lead_frames: usize,
    /// Frames written by the producer (prefill included)
    pub frames_written: u64,
    /// Frames of real data delivered to the device
    pub frames_read: u64,
    /// Frames of silence delivered to the device
    pub silence_frames: u64,
    /// Consumer reads that found the storage lock held
    pub contention_count: u64,
}

impl Telemetry {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one consumer read of `requested` frames that delivered `read`
    ///
    /// Allocation-free and wait-free; called from the realtime callback.
    #[inline]
    pub fn record_read(&self, requested: usize, read: usize, contended: bool) {
        self.frames_read.fetch_add(read as u64, Ordering::Relaxed);
        if contended {
            self.contention_count.fetch_add(1, Ordering::Relaxed);
        }
        if read < requested {
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
            self.silence_frames
                .fetch_add((requested - read) as u64, Ordering::Relaxed);
        }
        // Healthy again as soon as a read finds data
        self.underrun_active
            .store(read == 0 && requested > 0, Ordering::Relaxed);
    }

    /// Record frames committed to the ring by the producer
    pub fn record_write(&self, frames: usize) {
        self.frames_written
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Record the most recent lead
    #[inline]
    pub fn record_lead(&self, lead: usize) {
        self.last_lead_frames.store(lead, Ordering::Relaxed);
    }

    /// Producer entered the overrun state
    pub fn enter_overrun(&self) {
        self.overrun_count.fetch_add(1, Ordering::Relaxed);
        self.overrun_active.store(true, Ordering::Relaxed);
    }

    /// Producer left the overrun state
    pub fn leave_overrun(&self) {
        self.overrun_active.store(false, Ordering::Relaxed);
    }

    /// Current health
    pub fn health(&self) -> BufferHealth {
        if self.overrun_active.load(Ordering::Relaxed) {
            BufferHealth::Overrun
        } else if self.underrun_active.load(Ordering::Relaxed) {
            BufferHealth::Underrun
        } else {
            BufferHealth::Healthy
        }
    }

    /// Number of short consumer reads
    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Number of overrun entries
    pub fn overrun_count(&self) -> u64 {
        self.overrun_count.load(Ordering::Relaxed)
    }

    /// Most recently observed lead
    pub fn last_lead_frames(&self) -> usize {
        self.last_lead_frames.load(Ordering::Relaxed)
    }

    /// Copy every counter
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            underrun_count: self.underrun_count.load(Ordering::Relaxed),
            overrun_count: self.overrun_count.load(Ordering::Relaxed),
            last_lead_frames: self.last_lead_frames.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
            silence_frames: self.silence_frames.load(Ordering::Relaxed),
            contention_count: self.contention_count.load(Ordering::Relaxed),
        }
    }
}

/// Periodic producer-side metrics log
///
/// Tracks lead min/max between reports and emits one `debug!` line per interval
/// with per-interval deltas.
#[derive(Debug, Clone)]
pub struct MetricsLog {
    interval: Duration,
    last_log_time: Instant,
    last: TelemetrySnapshot,
    lead_min: usize,
    lead_max: usize,
    capacity: usize,
}

impl MetricsLog {
    /// Create a log for a ring of `capacity` frames
    pub fn new(interval: Duration, capacity: usize) -> Self {
        MetricsLog {
            interval,
            last_log_time: Instant::now(),
            last: TelemetrySnapshot::default(),
            lead_min: usize::MAX,
            lead_max: 0,
            capacity,
        }
    }

    /// Track a lead observation
    pub fn observe_lead(&mut self, lead: usize) {
        self.lead_min = self.lead_min.min(lead);
        self.lead_max = self.lead_max.max(lead);
    }

    /// Lowest lead seen since the last report
    pub fn lead_min(&self) -> Option<usize> {
        (self.lead_min != usize::MAX).then_some(self.lead_min)
    }

    /// Highest lead seen since the last report
    pub fn lead_max(&self) -> usize {
        self.lead_max
    }

    /// Log if the interval has elapsed; returns whether a line was emitted
    pub fn maybe_log(&mut self, telemetry: &Telemetry) -> bool {
        if self.last_log_time.elapsed() < self.interval {
            return false;
        }

        let now = telemetry.snapshot();
        let fill_pct = (now.last_lead_frames as f64 / self.capacity as f64) * 100.0;
        debug!(
            "stream metrics: lead={} ({:.1}%) min={} max={} written={} read={} \
             silence={} underruns={} overruns={} contention={} health={:?}",
            now.last_lead_frames,
            fill_pct,
            self.lead_min().unwrap_or(0),
            self.lead_max,
            now.frames_written - self.last.frames_written,
            now.frames_read - self.last.frames_read,
            now.silence_frames - self.last.silence_frames,
            now.underrun_count - self.last.underrun_count,
            now.overrun_count - self.last.overrun_count,
            now.contention_count - self.last.contention_count,
            telemetry.health(),
        );

        self.last = now;
        self.lead_min = usize::MAX;
        self.lead_max = 0;
        self.last_log_time = Instant::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_read_counts_underrun() {
        let t = Telemetry::new();
        t.record_read(800, 800, false);
        assert_eq!(t.underrun_count(), 0);
        assert_eq!(t.health(), BufferHealth::Healthy);

        t.record_read(800, 200, false);
        assert_eq!(t.underrun_count(), 1);
        assert_eq!(t.snapshot().silence_frames, 600);

        t.record_read(800, 0, false);
        assert_eq!(t.underrun_count(), 2);
        assert_eq!(t.health(), BufferHealth::Underrun);

        t.record_read(800, 10, false);
        assert_eq!(t.health(), BufferHealth::Healthy);
    }

    #[test]
    fn test_contention_counted_separately() {
        let t = Telemetry::new();
        t.record_read(64, 0, true);
        let snap = t.snapshot();
        assert_eq!(snap.contention_count, 1);
        assert_eq!(snap.underrun_count, 1);
    }

    #[test]
    fn test_overrun_dominates_health() {
        let t = Telemetry::new();
        t.record_read(64, 0, false);
        t.enter_overrun();
        assert_eq!(t.health(), BufferHealth::Overrun);
        assert_eq!(t.overrun_count(), 1);
        t.leave_overrun();
        assert_eq!(t.health(), BufferHealth::Underrun);
    }

    #[test]
    fn test_metrics_log_interval() {
        let t = Telemetry::new();
        let mut log = MetricsLog::new(Duration::from_secs(3600), 1000);
        log.observe_lead(40);
        log.observe_lead(10);
        assert_eq!(log.lead_min(), Some(10));
        assert_eq!(log.lead_max(), 40);
        assert!(!log.maybe_log(&t));

        let mut log = MetricsLog::new(Duration::ZERO, 1000);
        log.observe_lead(5);
        assert!(log.maybe_log(&t));
        assert_eq!(log.lead_min(), None);
    }
}
