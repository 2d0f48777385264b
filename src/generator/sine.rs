//! Sine test tone
//!
//! Clean tone for verifying the audio path end to end. A 10 ms fade-in (and a
//! 10 ms fade-out when a duration is set) avoids clicks at the edges.

use super::{GeneratorError, SampleGenerator};
use std::f64::consts::TAU;

/// Sine wave source, identical on every channel
#[derive(Debug, Clone)]
pub struct SineGenerator {
    frequency: f64,
    amplitude: f32,
    sample_rate: u32,
    channels: u16,
    /// Phase in cycles (0.0..1.0)
    phase: f64,
    /// Frames produced so far
    position: u64,
    /// Total frames when the tone has a fixed duration
    total_frames: Option<u64>,
    fade_frames: u64,
}

impl SineGenerator {
    /// Endless tone at `frequency` Hz
    pub fn new(frequency: f64, amplitude: f32, sample_rate: u32, channels: u16) -> Self {
        SineGenerator {
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            sample_rate,
            channels: channels.max(1),
            phase: 0.0,
            position: 0,
            total_frames: None,
            fade_frames: (sample_rate / 100).max(1) as u64,
        }
    }

    /// Limit the tone to `seconds`, fading out at the end
    pub fn with_duration(mut self, seconds: f64) -> Self {
        let total = (seconds * self.sample_rate as f64).max(0.0) as u64;
        self.total_frames = Some(total);
        self.fade_frames = self.fade_frames.min(total.max(1));
        self
    }

    /// Frames produced so far
    pub fn position(&self) -> u64 {
        self.position
    }

    fn gain(&self, frame: u64) -> f32 {
        let fade = self.fade_frames as f32;
        let mut gain = (frame as f32 / fade).min(1.0);
        if let Some(total) = self.total_frames {
            let from_end = total.saturating_sub(1).saturating_sub(frame);
            gain = gain.min(from_end as f32 / fade);
        }
        gain
    }
}

impl SampleGenerator for SineGenerator {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn produce(&mut self, dest: &mut [f32]) -> Result<usize, GeneratorError> {
        let channels = self.channels as usize;
        let mut frames = dest.len() / channels;
        if let Some(total) = self.total_frames {
            frames = frames.min(total.saturating_sub(self.position) as usize);
        }

        let increment = self.frequency / self.sample_rate as f64;
        for frame in dest.chunks_exact_mut(channels).take(frames) {
            let value = ((TAU * self.phase).sin() as f32) * self.amplitude * self.gain(self.position);
            frame.fill(value);
            self.phase = (self.phase + increment).fract();
            self.position += 1;
        }

        Ok(frames)
    }

    fn is_finished(&self) -> bool {
        self.total_frames
            .is_some_and(|total| self.position >= total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_zero_channels_treated_as_mono() {
        let mut gen = SineGenerator::new(440.0, 0.5, 48_000, 0);
        assert_eq!(gen.channels(), 1);
        let mut buf = vec![0.0f32; 16];
        assert_eq!(gen.produce(&mut buf).unwrap(), 16);
    }

    #[test]
    fn test_fade_in_starts_silent() {
        let mut gen = SineGenerator::new(440.0, 0.5, 48_000, 1);
        let mut buf = vec![0.0f32; 48];
        assert_eq!(gen.produce(&mut buf).unwrap(), 48);
        assert_eq!(buf[0], 0.0);
        assert!(buf.iter().all(|s| s.abs() <= 0.5));
    }

    #[test]
    fn test_steady_state_amplitude() {
        let mut gen = SineGenerator::new(1000.0, 0.5, 48_000, 1);
        let mut buf = vec![0.0f32; 4800];
        gen.produce(&mut buf).unwrap();
        // After the 480-frame fade, peaks reach the amplitude
        let peak = buf[480..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert_abs_diff_eq!(peak, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_channels_are_identical() {
        let mut gen = SineGenerator::new(440.0, 0.8, 48_000, 2);
        let mut buf = vec![0.0f32; 2000];
        assert_eq!(gen.produce(&mut buf).unwrap(), 1000);
        for frame in buf.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_finite_duration_ends_silent() {
        let mut gen = SineGenerator::new(440.0, 0.5, 48_000, 1).with_duration(0.1);
        let mut buf = vec![0.0f32; 10_000];
        assert_eq!(gen.produce(&mut buf).unwrap(), 4800);
        assert!(gen.is_finished());
        assert_abs_diff_eq!(buf[4799], 0.0, epsilon = 1e-6);
        assert_eq!(gen.produce(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_phase_continuous_across_batches() {
        let mut a = SineGenerator::new(440.0, 0.5, 48_000, 1);
        let mut b = SineGenerator::new(440.0, 0.5, 48_000, 1);
        let mut whole = vec![0.0f32; 1000];
        a.produce(&mut whole).unwrap();

        let mut first = vec![0.0f32; 333];
        let mut second = vec![0.0f32; 667];
        b.produce(&mut first).unwrap();
        b.produce(&mut second).unwrap();

        assert_eq!(&whole[..333], &first[..]);
        assert_eq!(&whole[333..], &second[..]);
        assert_eq!(b.position(), 1000);
    }
}
