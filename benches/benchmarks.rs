// benches/benchmarks.rs — CPU-side benchmarks.
//
//   cargo bench --bench benchmarks
//
// The Mat transforms are the reference the GPU kernels are checked against;
// gpu_benchmarks.rs runs the same shapes on the device for comparison.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mvs_gpu::consistency;
use mvs_gpu::Mat;

// ============================================================
// Shared helpers
// ============================================================

/// Consistency mask with roughly `density` of its entries set.
fn make_mask(w: usize, h: usize, n: usize, density: f64) -> Mat<u8> {
    let mut rng = StdRng::seed_from_u64(42);
    let data = (0..w * h * n).map(|_| rng.gen_bool(density) as u8).collect();
    Mat::from_vec(w, h, n, data)
}

fn make_volume(w: usize, h: usize, d: usize) -> Mat<f32> {
    Mat::from_vec(w, h, d, (0..w * h * d).map(|i| i as f32).collect())
}

// ============================================================
// Consistency encoding
// ============================================================

fn bench_consistency(c: &mut Criterion) {
    let ids: Vec<i32> = (0..20).collect();
    let mut group = c.benchmark_group("consistency_encode");

    for density in [0.0, 0.05, 0.5] {
        let mask = make_mask(640, 480, ids.len(), density);
        group.bench_with_input(
            BenchmarkId::new("640x480x20", density),
            &mask,
            |b, mask| b.iter(|| consistency::encode(mask, &ids)),
        );
    }

    let encoded = consistency::encode(&make_mask(640, 480, ids.len(), 0.05), &ids);
    group.bench_function("decode_640x480x20_5pct", |b| {
        b.iter(|| consistency::decode(&encoded).filter(|r| r.is_ok()).count())
    });

    group.finish();
}

// ============================================================
// Reference transforms
// ============================================================

fn bench_transforms(c: &mut Criterion) {
    let vol = make_volume(640, 480, 3);
    let mut group = c.benchmark_group("mat_transform");

    group.bench_function("transpose_640x480x3", |b| b.iter(|| vol.transposed()));
    group.bench_function("flip_640x480x3", |b| b.iter(|| vol.flipped_horizontal()));
    group.bench_function("rotate_640x480x3", |b| b.iter(|| vol.rotated()));

    group.finish();
}

// ============================================================
// Register
// ============================================================

criterion_group!(benches, bench_consistency, bench_transforms);
criterion_main!(benches);
