//! Playback scheduler properties
//!
//! Exercises the scheduler against a real output graph, rendering blocks by
//! hand to move the clock.

mod helpers;

use bytes::Bytes;
use helpers::{constant_pcm, sine_wav_bytes};
use hv_common::FadeCurve;
use hv_session::audio::AudioChunk;
use hv_session::playback::{InterruptReport, OutputGraph, PlaybackScheduler};
use std::time::Duration;

const RATE: u32 = 24_000;
const FADE: Duration = Duration::from_millis(50);

fn scheduler(curve: FadeCurve) -> (OutputGraph, PlaybackScheduler) {
    let graph = OutputGraph::new(RATE, curve);
    let scheduler = PlaybackScheduler::new(graph.clone(), FADE);
    (graph, scheduler)
}

fn chunk(sequence: u64, payload: Vec<u8>) -> AudioChunk {
    AudioChunk::new(sequence, Bytes::from(payload))
}

fn render(graph: &OutputGraph, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; frames];
    for block in out.chunks_mut(480) {
        graph.render(block);
    }
    out
}

#[test]
fn test_same_utterance_boundary_has_no_step() {
    for curve in [FadeCurve::Linear, FadeCurve::SCurve] {
        let (graph, mut scheduler) = scheduler(curve);
        let level = 0.5;

        scheduler.enqueue(chunk(0, constant_pcm(level, 4_800)));
        let report = scheduler.enqueue(chunk(1, constant_pcm(level, 4_800)));
        let second = report.scheduled[0];
        assert_eq!(second.start_frame, 3_600, "second chunk overlaps by one window");
        assert_eq!(second.fade_in_frames, 1_200);

        let output = render(&graph, second.end_frame as usize);
        let fade_frames = scheduler.fade_window_frames() as f32;
        let max_step = level * curve.max_slope() / fade_frames + 1e-4;

        let mut previous = 0.0f32;
        for (frame, sample) in output.iter().enumerate() {
            let step = (sample - previous).abs();
            assert!(
                step <= max_step,
                "{:?}: step {} at frame {} exceeds {}",
                curve,
                step,
                frame,
                max_step
            );
            previous = *sample;
        }
    }
}

#[test]
fn test_chunk_shorter_than_fade_keeps_level_flat() {
    for curve in [FadeCurve::Linear, FadeCurve::SCurve] {
        let (graph, mut scheduler) = scheduler(curve);
        let level = 0.5;

        scheduler.enqueue(chunk(0, constant_pcm(level, 4_800)));
        let short = scheduler.enqueue(chunk(1, constant_pcm(level, 240))).scheduled[0];
        assert_eq!(short.start_frame, 4_560);
        let last = scheduler.enqueue(chunk(2, constant_pcm(level, 4_800))).scheduled[0];
        assert_eq!(last.start_frame, 3_600);

        let output = render(&graph, last.end_frame as usize);
        let fade_in_end = scheduler.fade_window_frames() as usize;
        for (frame, sample) in output.iter().enumerate().skip(fade_in_end) {
            assert!(
                (sample - level).abs() < 1e-3,
                "{:?}: level {} at frame {}",
                curve,
                sample,
                frame
            );
        }
    }
}

#[test]
fn test_cursor_never_decreases_between_interrupts() {
    let (graph, mut scheduler) = scheduler(FadeCurve::Linear);
    let mut last_cursor = scheduler.next_chunk_frame();

    for sequence in 0..24u64 {
        let frames = 600 + (sequence as usize * 137) % 3_000;
        scheduler.enqueue(chunk(sequence, constant_pcm(0.3, frames)));

        if sequence % 5 == 4 {
            scheduler.end_utterance();
        }
        if sequence % 3 == 0 {
            render(&graph, 2_400);
        }

        let cursor = scheduler.next_chunk_frame();
        assert!(cursor >= last_cursor, "cursor moved back at chunk {}", sequence);
        assert!(cursor >= graph.current_frame());
        last_cursor = cursor;
    }
}

#[test]
fn test_new_utterance_never_overlaps_previous() {
    let (_graph, mut scheduler) = scheduler(FadeCurve::Linear);

    let first = scheduler.enqueue(chunk(0, constant_pcm(0.3, 4_800))).scheduled[0];
    scheduler.end_utterance();
    let second = scheduler.enqueue(chunk(1, constant_pcm(0.3, 4_800))).scheduled[0];

    assert_eq!(second.start_frame, first.end_frame);
    assert_eq!(second.fade_in_frames, 1_200);
}

#[test]
fn test_interrupt_twice_matches_once() {
    let (graph, mut scheduler) = scheduler(FadeCurve::Linear);

    scheduler.enqueue(chunk(0, constant_pcm(0.3, 9_600)));
    scheduler.push(chunk(1, constant_pcm(0.3, 9_600)));
    render(&graph, 1_000);

    let first = scheduler.interrupt();
    assert_eq!(first.discarded_pending, 1);
    assert_eq!(first.discarded_segments, 1);

    let after_once = (
        scheduler.pending_len(),
        scheduler.next_chunk_frame(),
        graph.meter_attached(),
        graph.segment_count(),
    );

    let second = scheduler.interrupt();
    assert_eq!(second, InterruptReport::default());
    assert_eq!(
        after_once,
        (
            scheduler.pending_len(),
            scheduler.next_chunk_frame(),
            graph.meter_attached(),
            graph.segment_count(),
        )
    );
    assert_eq!(after_once, (0, 1_000, false, 0));
}

#[test]
fn test_settle_waits_for_long_segment() {
    let (graph, mut scheduler) = scheduler(FadeCurve::Linear);
    let grace = Duration::from_millis(500);

    // 1.2 s of audio
    let report = scheduler.enqueue(chunk(0, sine_wav_bytes(RATE, 440.0, 1_200)));
    assert_eq!(report.scheduled[0].end_frame, 28_800);
    assert!(!scheduler.is_settled(grace));

    // 0.66 s in: cursor still more than the grace window ahead
    render(&graph, 16_000);
    assert!(!scheduler.is_settled(grace));

    // 0.8 s in: the remaining 0.4 s fits inside the grace window
    render(&graph, 3_200);
    assert!(graph.is_playing());
    assert!(scheduler.is_settled(grace));
    assert!(!scheduler.is_settled(Duration::ZERO));

    render(&graph, 9_600);
    assert!(!graph.is_playing());
    assert!(scheduler.is_settled(Duration::ZERO));
}

#[test]
fn test_corrupt_chunk_dropped_and_next_scheduled() {
    let (_graph, mut scheduler) = scheduler(FadeCurve::Linear);

    let corrupt = scheduler.enqueue(chunk(0, b"RIFF\x10\x00\x00\x00WAVEjunk".to_vec()));
    assert!(corrupt.scheduled.is_empty());
    assert_eq!(corrupt.dropped.len(), 1);
    assert_eq!(corrupt.dropped[0].sequence, 0);

    let valid = scheduler.enqueue(chunk(1, sine_wav_bytes(RATE, 440.0, 100)));
    assert_eq!(valid.scheduled.len(), 1);
    assert!(valid.dropped.is_empty());

    let stats = scheduler.stats();
    assert_eq!(stats.chunks_dropped, 1);
    assert_eq!(stats.chunks_scheduled, 1);
}

#[test]
fn test_resampled_payload_lands_at_output_rate() {
    let (_graph, mut scheduler) = scheduler(FadeCurve::Linear);

    // 16 kHz WAV, 500 ms -> 12_000 output frames at 24 kHz
    let report = scheduler.enqueue(chunk(0, sine_wav_bytes(16_000, 300.0, 500)));
    let segment = report.scheduled[0];
    let frames = segment.end_frame - segment.start_frame;
    assert!(
        (11_900..=12_100).contains(&frames),
        "expected ~12000 frames, got {}",
        frames
    );
}
