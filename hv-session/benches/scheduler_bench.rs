//! Scheduler and output graph throughput
//!
//! Rendering has to run far faster than realtime: a device callback that
//! takes longer than its block period underruns.
//!
//! **Target:** >100x realtime for rendering a crossfaded utterance

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hv_common::FadeCurve;
use hv_session::audio::pcm::quantize_i16;
use hv_session::audio::AudioChunk;
use hv_session::playback::{OutputGraph, PlaybackScheduler};
use std::time::{Duration, Instant};

const RATE: u32 = 24_000;

fn chunk_payload(frames: usize) -> Bytes {
    let samples: Vec<f32> = (0..frames)
        .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / RATE as f32).sin() * 0.4)
        .collect();
    Bytes::from(quantize_i16(&samples))
}

fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");
    let payload = chunk_payload(4_800); // 200 ms

    group.bench_function("enqueue_200ms_chunk", |b| {
        let graph = OutputGraph::new(RATE, FadeCurve::Linear);
        let mut scheduler = PlaybackScheduler::new(graph, Duration::from_millis(50));
        let mut sequence = 0;

        b.iter(|| {
            let report = scheduler.enqueue(AudioChunk::new(sequence, payload.clone()));
            sequence += 1;
            if sequence % 50 == 0 {
                scheduler.interrupt();
            }
            black_box(report);
        });
    });

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("output_graph");
    let payload = chunk_payload(4_800);

    group.bench_function("render_crossfaded_second", |b| {
        b.iter_batched(
            || {
                let graph = OutputGraph::new(RATE, FadeCurve::SCurve);
                let mut scheduler = PlaybackScheduler::new(graph.clone(), Duration::from_millis(50));
                for sequence in 0..6 {
                    scheduler.enqueue(AudioChunk::new(sequence, payload.clone()));
                }
                graph.attach_meter();
                (graph, scheduler)
            },
            |(graph, _scheduler)| {
                let start = Instant::now();
                let mut block = vec![0.0f32; 480];
                for _ in 0..(RATE as usize / 480) {
                    graph.render(&mut block);
                }

                let realtime_factor = 1.0 / start.elapsed().as_secs_f64();
                if realtime_factor < 100.0 {
                    eprintln!(
                        "WARNING: Render speed {:.2}x is below 100x realtime target",
                        realtime_factor
                    );
                }
                black_box(graph.level());
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_enqueue, bench_render);
criterion_main!(benches);
