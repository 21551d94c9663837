#![allow(clippy::unwrap_used)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sg_audio::analyzer::SpectralAnalyzer;
use sg_audio::bands::BandTable;
use sg_audio::features::FeatureExtractor;
use sg_core::block::AudioBlock;
use sg_core::config::SonicConfig;

fn tone(len: usize, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let t = n as f32 / sample_rate as f32;
            let w = 2.0 * std::f32::consts::PI * t;
            (w * 440.0).sin() + 0.1 * (w * 3150.0).sin()
        })
        .collect()
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    for block_size in [256usize, 1024, 4096] {
        let table = BandTable::build(12, block_size, 44100, 20.0, None).unwrap();
        let mut analyzer = SpectralAnalyzer::new(block_size, 44100, Arc::new(table));
        let block = AudioBlock::new(0, tone(block_size, 44100));
        group.bench_with_input(BenchmarkId::from_parameter(block_size), &block, |b, block| {
            b.iter(|| black_box(analyzer.analyze(black_box(block)).unwrap()));
        });
    }
    group.finish();
}

fn bench_extractor(c: &mut Criterion) {
    let mut extractor = FeatureExtractor::from_config(&SonicConfig::default()).unwrap();
    let samples = tone(1024, 44100);
    let mut index = 0u64;
    c.bench_function("extract_1024_12_bands_onset", |b| {
        b.iter(|| {
            let block = AudioBlock::new(index, samples.clone());
            index += 1;
            black_box(extractor.process(&block).unwrap())
        });
    });
}

fn bench_band_table(c: &mut Criterion) {
    c.bench_function("band_table_build_4096", |b| {
        b.iter(|| BandTable::build(black_box(24), 4096, 48000, 20.0, None).unwrap());
    });
}

criterion_group!(benches, bench_analyze, bench_extractor, bench_band_table);
criterion_main!(benches);
