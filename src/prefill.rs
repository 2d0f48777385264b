//! Startup buffering
//!
//! Before the device callback is attached, the ring is loaded with
//! `prefill_duration_frames` of content so the generator's startup latency can
//! not cause an initial underrun. The content is either silence, or early
//! generator output topped up with silence if the generator has not produced
//! enough by the end of the prefill window.

use crate::config::StreamConfig;
use crate::generator::SampleGenerator;
use crate::shared::StreamShared;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Source of prefill content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrefillMode {
    /// Push silence
    #[default]
    Silence,
    /// Pull from the generator for up to the prefill window, then pad with silence
    Generator,
}

/// What the prefill pushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefillReport {
    /// Frames taken from the generator
    pub generator_frames: usize,
    /// Frames of silence
    pub silence_frames: usize,
    /// Wall-clock time spent
    pub elapsed: Duration,
}

impl PrefillReport {
    /// Total frames pushed
    pub fn total_frames(&self) -> usize {
        self.generator_frames + self.silence_frames
    }
}

/// One-shot prefill step run by the session before playback
#[derive(Debug, Clone, Copy)]
pub struct PrefillManager {
    frames: usize,
    mode: PrefillMode,
    batch_frames: usize,
    channels: usize,
    /// Real-time length of the prefill window
    window: Duration,
    park_timeout: Duration,
}

impl PrefillManager {
    /// Prefill as configured
    pub fn new(config: &StreamConfig) -> Self {
        let window =
            Duration::from_secs_f64(config.prefill_duration_frames as f64 / config.sample_rate as f64);
        PrefillManager {
            frames: config.prefill_duration_frames,
            mode: config.prefill_mode,
            batch_frames: config.max_batch_frames,
            channels: config.channels as usize,
            window,
            park_timeout: config.park_timeout(),
        }
    }

    /// Override the generator wait window
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Frames this prefill pushes
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Push the prefill into the ring
    ///
    /// A generator failure during prefill aborts the session setup.
    pub fn run<G: SampleGenerator>(
        &self,
        shared: &StreamShared,
        generator: &mut G,
    ) -> Result<PrefillReport> {
        let start = Instant::now();
        let mut scratch = vec![0.0f32; self.batch_frames.min(self.frames.max(1)) * self.channels];
        let mut report = PrefillReport::default();

        if self.mode == PrefillMode::Generator {
            generator.attach_waker(shared.waker.clone());
            let deadline = start + self.window;

            while report.generator_frames < self.frames && !generator.is_finished() {
                let want = (self.frames - report.generator_frames).min(self.batch_frames);
                let batch = &mut scratch[..want * self.channels];
                let produced = generator.produce(batch)?.min(want);

                if produced > 0 {
                    let written = shared.ring.write(&scratch[..produced * self.channels]);
                    debug_assert_eq!(written, produced, "prefill exceeded ring capacity");
                    report.generator_frames += written;
                    continue;
                }

                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                shared.waker.park((deadline - now).min(self.park_timeout));
            }
        }

        scratch.fill(0.0);
        while report.total_frames() < self.frames {
            let want = (self.frames - report.total_frames()).min(scratch.len() / self.channels);
            let written = shared.ring.write(&scratch[..want * self.channels]);
            debug_assert_eq!(written, want, "prefill exceeded ring capacity");
            if written == 0 {
                break;
            }
            report.silence_frames += written;
        }

        shared.telemetry.record_write(report.total_frames());
        shared.telemetry.record_lead(shared.ring.available());
        report.elapsed = start.elapsed();

        debug!(
            "prefill pushed {} frames ({} generated, {} silence) in {:?}",
            report.total_frames(),
            report.generator_frames,
            report.silence_frames,
            report.elapsed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{ChannelGenerator, SineGenerator};

    fn config(mode: PrefillMode) -> StreamConfig {
        StreamConfig::stable(48_000)
            .with_channels(1)
            .with_prefill(4800, mode)
    }

    #[test]
    fn test_silence_prefill() {
        let config = config(PrefillMode::Silence);
        let shared = StreamShared::new(&config).unwrap();
        let mut gen = SineGenerator::new(440.0, 0.5, 48_000, 1);

        let report = PrefillManager::new(&config).run(&shared, &mut gen).unwrap();
        assert_eq!(report.silence_frames, 4800);
        assert_eq!(report.generator_frames, 0);
        assert_eq!(shared.ring.available(), 4800);
        assert_eq!(gen.position(), 0);
    }

    #[test]
    fn test_generator_prefill() {
        let config = config(PrefillMode::Generator);
        let shared = StreamShared::new(&config).unwrap();
        let mut gen = SineGenerator::new(440.0, 0.5, 48_000, 1);

        let report = PrefillManager::new(&config).run(&shared, &mut gen).unwrap();
        assert_eq!(report.generator_frames, 4800);
        assert_eq!(report.silence_frames, 0);
        assert_eq!(shared.telemetry.snapshot().frames_written, 4800);
    }

    #[test]
    fn test_slow_generator_padded_with_silence() {
        let config = config(PrefillMode::Generator);
        let shared = StreamShared::new(&config).unwrap();
        let (mut gen, feed) = ChannelGenerator::new(1, 4);
        feed.push(vec![0.9; 1000]).unwrap();

        let report = PrefillManager::new(&config)
            .with_window(Duration::from_millis(20))
            .run(&shared, &mut gen)
            .unwrap();
        assert_eq!(report.generator_frames, 1000);
        assert_eq!(report.silence_frames, 3800);
        assert_eq!(shared.ring.available(), 4800);

        let mut out = vec![0.0; 1001];
        shared.ring.read(&mut out);
        assert_eq!(out[999], 0.9);
        assert_eq!(out[1000], 0.0);
    }

    #[test]
    fn test_generator_failure_aborts_prefill() {
        let config = config(PrefillMode::Generator);
        let shared = StreamShared::new(&config).unwrap();
        let (mut gen, feed) = ChannelGenerator::new(1, 4);
        feed.fail("warm-up diverged").unwrap();

        let err = PrefillManager::new(&config)
            .run(&shared, &mut gen)
            .unwrap_err();
        assert!(err.to_string().contains("warm-up diverged"));
    }

    #[test]
    fn test_zero_prefill() {
        let config = StreamConfig::stable(48_000).with_prefill(0, PrefillMode::Silence);
        let shared = StreamShared::new(&config).unwrap();
        let mut gen = SineGenerator::new(440.0, 0.5, 48_000, 2);
        let report = PrefillManager::new(&config).run(&shared, &mut gen).unwrap();
        assert_eq!(report.total_frames(), 0);
        assert!(shared.ring.is_empty());
    }
}
