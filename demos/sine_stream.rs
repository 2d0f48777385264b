//! Play a test tone through the system audio device
//!
//! Run with: cargo run --example sine_stream --features device -- [seconds] [frequency]
//! Set RUST_LOG=pcm_lead=debug to see the periodic buffer metrics.

use anyhow::{Context, Result};
use pcm_lead::{BufferHealth, RodioDevice, Session, SineGenerator, StreamConfig};
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let seconds: f64 = match args.next() {
        Some(s) => s.parse().context("seconds must be a number")?,
        None => 3.0,
    };
    let frequency: f64 = match args.next() {
        Some(s) => s.parse().context("frequency must be a number")?,
        None => 440.0,
    };

    let config = StreamConfig::stable(48_000);
    let tone = SineGenerator::new(frequency, 0.3, config.sample_rate, config.channels)
        .with_duration(seconds);
    let mut device = RodioDevice::new(1024);

    let session =
        Session::start(config, tone, &mut device).context("failed to start audio stream")?;
    println!(
        "Playing {frequency} Hz for {seconds} s ({:.0} ms lead)",
        config.latency_ms()
    );

    let poll = Duration::from_millis(250);
    while !session.producer_finished() {
        std::thread::sleep(poll);
        let telemetry = session.telemetry();
        if session.health() == BufferHealth::Underrun {
            println!("underrun ({} so far)", telemetry.underrun_count);
        }
    }

    let report = session.stop()?;
    println!(
        "Done: {} frames played, {} underruns, {} overruns",
        report.telemetry.frames_read, report.telemetry.underrun_count, report.telemetry.overrun_count
    );
    Ok(())
}
