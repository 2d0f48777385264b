use pcm_lead::{
    ConsumerCallback, PrefillMode, ProducerLoop, RingBuffer, SilenceGenerator, StepOutcome,
    StreamConfig, StreamShared,
};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Write(usize),
    Read(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..80).prop_map(Op::Write),
        (0usize..80).prop_map(Op::Read),
    ]
}

fn assert_cursor_invariant(ring: &RingBuffer) -> Result<(), TestCaseError> {
    let cursors = ring.cursors();
    prop_assert!(cursors.read <= cursors.write);
    prop_assert!(cursors.write <= cursors.read + ring.capacity() as u64);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn ring_matches_fifo_model(
        capacity in 1usize..64,
        channels in 1u16..4,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let ring = RingBuffer::new(capacity, channels).unwrap();
        let ch = channels as usize;
        let mut model: VecDeque<f32> = VecDeque::new();
        let mut next = 0f32;

        for op in ops {
            match op {
                Op::Write(frames) => {
                    let samples: Vec<f32> = (0..frames * ch)
                        .map(|_| {
                            next += 1.0;
                            next
                        })
                        .collect();
                    let written = ring.write(&samples);
                    prop_assert_eq!(written, frames.min(capacity - model.len() / ch));
                    model.extend(&samples[..written * ch]);
                }
                Op::Read(frames) => {
                    let mut out = vec![0.0f32; frames * ch];
                    let read = ring.read(&mut out);
                    prop_assert_eq!(read, frames.min(model.len() / ch));
                    let expected: Vec<f32> = model.drain(..read * ch).collect();
                    prop_assert_eq!(&out[..read * ch], expected.as_slice());
                }
            }
            assert_cursor_invariant(&ring)?;
            prop_assert_eq!(ring.available(), model.len() / ch);
        }
    }

    #[test]
    fn concurrent_interleavings_keep_order(
        capacity in 1usize..256,
        write_sizes in prop::collection::vec(1usize..300, 1..64),
        read_sizes in prop::collection::vec(1usize..300, 1..64),
    ) {
        let ring = Arc::new(RingBuffer::new(capacity, 2).unwrap());
        let total: usize = write_sizes.iter().sum();
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let ring = Arc::clone(&ring);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut seq = 0u32;
                for size in write_sizes {
                    let mut chunk = Vec::with_capacity(size * 2);
                    for _ in 0..size {
                        seq += 1;
                        chunk.extend_from_slice(&[seq as f32, -(seq as f32)]);
                    }
                    let mut offset = 0;
                    while offset < chunk.len() {
                        offset += ring.write(&chunk[offset..]) * 2;
                        std::thread::yield_now();
                    }
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut received = 0usize;
        let mut violations = 0usize;
        let mut sizes = read_sizes.iter().cycle();
        while received < total {
            let cursors = ring.cursors();
            if cursors.read > cursors.write
                || cursors.write > cursors.read + capacity as u64
            {
                violations += 1;
            }

            let frames = *sizes.next().unwrap();
            let mut out = vec![0.0f32; frames * 2];
            let read = ring.try_read(&mut out).unwrap_or(0);
            for frame in out[..read * 2].chunks_exact(2) {
                received += 1;
                prop_assert_eq!(frame, [received as f32, -(received as f32)]);
            }
            if read == 0 {
                std::thread::yield_now();
            }
        }

        producer.join().unwrap();
        prop_assert!(done.load(Ordering::Acquire));
        prop_assert_eq!(violations, 0);
        prop_assert!(ring.is_empty());
    }

    #[test]
    fn lead_converges_to_target(
        target in 100usize..5000,
        read_sizes in prop::collection::vec(1usize..2500, 1..300),
    ) {
        let mut config = StreamConfig::stable(48_000)
            .with_channels(1)
            .with_prefill(0, PrefillMode::Silence);
        config.target_lead_frames = target;
        config.max_lead_frames = target * 2;
        config.reset_lead_frames = target;
        config.max_batch_frames = 512;

        let shared = StreamShared::new(&config).unwrap();
        let mut producer =
            ProducerLoop::new(Arc::clone(&shared), SilenceGenerator::new(1), &config);
        let mut consumer = ConsumerCallback::new(Arc::clone(&shared));

        for frames in read_sizes {
            while let StepOutcome::Wrote(_) = producer.step().unwrap() {}
            let lead = shared.ring.cursors().lead();
            prop_assert_eq!(lead, target);

            let mut block = vec![0.0f32; frames];
            consumer.render_block(&mut block);
            let lead = shared.ring.cursors().lead();
            prop_assert!(lead <= config.max_lead_frames);
        }
        prop_assert_eq!(shared.telemetry.overrun_count(), 0);
    }
}
