//! Refill cycle benchmarks
//!
//! Measures one full scheduler cycle (gate poll, synthesis, demultiplex,
//! buffer rotation) against the mock backend at several pool sizes. The
//! cycle must comfortably fit inside one block period (~11.6 ms for
//! 512-frame blocks at 44.1 kHz) to leave budget for a real synthesis
//! engine.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use wavefield_sp::device::{MockDevice, NoReverb, PlaybackDevice};
use wavefield_sp::playback::{create_voice_pool, SchedulerContext};
use wavefield_sp::synth::{CallbackSource, SynthesisSource};

const BLOCK_SIZE: usize = 512;
const TICK_FRAMES: usize = 64;

fn bench_refill_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("refill_cycle");

    for &num_voices in &[2usize, 8, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_voices),
            &num_voices,
            |b, &num_voices| {
                let device = Arc::new(MockDevice::new());
                let voices =
                    create_voice_pool(device.as_ref(), num_voices, BLOCK_SIZE, &NoReverb).unwrap();

                let mut source =
                    Box::new(CallbackSource::new(TICK_FRAMES, |_ticks, out: &mut [i16]| {
                        out.fill(0);
                        Ok(())
                    }));
                source.initialize(0, num_voices, 44100).unwrap();

                let mut context = SchedulerContext::new(
                    Arc::clone(&device) as Arc<dyn PlaybackDevice>,
                    source,
                    voices,
                    BLOCK_SIZE,
                    44100,
                )
                .unwrap();

                b.iter(|| {
                    device.consume_all(1);
                    context.run_cycle()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_refill_cycle);
criterion_main!(benches);
