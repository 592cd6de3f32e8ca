use std::hint::black_box;

use beatviz_core::render::RecordingSurface;
use beatviz_core::{
    pulse_strength, AnalyserConfig, BeatSchedule, FftAnalyzer, FrequencyFrame, PixelSurface,
    RenderConfig, RenderDriver, Signal, DEFAULT_FALLOFF,
};
use criterion::{criterion_group, criterion_main, Criterion};

fn beat_grid(count: usize) -> BeatSchedule {
    BeatSchedule::from_unsorted((0..count).map(|i| i as f64 * 0.48))
}

fn pulse_lookup_benchmark(c: &mut Criterion) {
    let beats = beat_grid(700);
    let mut group = c.benchmark_group("Beats");
    group.bench_function("pulse_strength_700_beats", |b| {
        let mut pos = 0.0;
        b.iter(|| {
            pos = (pos + 0.016) % 336.0;
            pulse_strength(black_box(&beats), black_box(pos), DEFAULT_FALLOFF)
        });
    });
    group.finish();
}

fn render_benchmark(c: &mut Criterion) {
    let driver = RenderDriver::new(RenderConfig::default());
    let frame = FrequencyFrame::from_bins((0..1024).map(|i| (i % 256) as u8).collect());

    let mut group = c.benchmark_group("RenderDriver");
    group.bench_function("spectrum_recorded", |b| {
        let mut surface = RecordingSurface::new(1280.0, 720.0);
        b.iter(|| {
            surface.fills.clear();
            driver.draw(&mut surface, &Signal::Spectrum(black_box(&frame)));
        });
    });
    group.bench_function("pulse_rasterized_720p", |b| {
        let mut surface = PixelSurface::new(1280, 720);
        b.iter(|| driver.draw(&mut surface, &Signal::Pulse(black_box(0.7))));
    });
    group.finish();
}

fn analyser_benchmark(c: &mut Criterion) {
    let mut analyser = FftAnalyzer::new(AnalyserConfig::default());
    let samples: Vec<f32> = (0..2048).map(|i| (i as f32 * 0.05).sin()).collect();
    let mut frame = FrequencyFrame::default();

    c.bench_function("fft_analyser_2048", |b| {
        b.iter(|| analyser.process(black_box(&samples), &mut frame));
    });
}

criterion_group!(benches, pulse_lookup_benchmark, render_benchmark, analyser_benchmark);
criterion_main!(benches);
