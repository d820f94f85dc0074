//! Benchmarks for the transform and the HVS metric.
//!
//! Run with: cargo bench -p vst-eval

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vst_eval::metrics::hvs::hvs_scores;
use vst_eval::noise::{apply_speckle, NoiseSeed};
use vst_eval::plane::synthetic_scene;
use vst_eval::transform::{forward, inverse, VstParams};

const SIZES: [usize; 3] = [256, 512, 1024];

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("vst");
    let params = VstParams::default();

    for size in SIZES {
        let scene = synthetic_scene(size, size).unwrap();
        let transformed = forward(scene.as_ref(), params).unwrap();
        group.throughput(Throughput::Elements((size * size) as u64));

        group.bench_with_input(BenchmarkId::new("forward", format!("{size}x{size}")), &scene, |b, img| {
            b.iter(|| forward(black_box(img.as_ref()), params).unwrap());
        });
        group.bench_with_input(
            BenchmarkId::new("inverse", format!("{size}x{size}")),
            &transformed,
            |b, img| {
                b.iter(|| inverse(black_box(img.as_ref()), params).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_psnr_hvs_m(c: &mut Criterion) {
    let mut group = c.benchmark_group("psnr_hvs_m");

    for size in SIZES {
        let clean = synthetic_scene(size, size).unwrap();
        let noisy = apply_speckle(clean.as_ref(), 0.1, NoiseSeed::Fixed(1)).unwrap();
        group.throughput(Throughput::Elements((size * size) as u64));

        group.bench_with_input(
            BenchmarkId::new("hvs_scores", format!("{size}x{size}")),
            &(clean, noisy),
            |b, (clean, noisy)| {
                b.iter(|| hvs_scores(black_box(clean.as_ref()), black_box(noisy.as_ref()), 255.0).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_transform, bench_psnr_hvs_m);
criterion_main!(benches);
