use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pagestitch::{compute_scale, export_filename, plan_grid, CaptureOptions, PageMetrics};
use std::time::Duration;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn benchmark_grid_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry");
    configure_fast_group(&mut group);

    let metrics = PageMetrics {
        scroll_width: 3840,
        scroll_height: 45_000,
        viewport_width: 1280,
        viewport_height: 800,
        device_pixel_ratio: 1.0,
    };

    group.bench_function("plan_grid_tall_page", |b| {
        b.iter(|| {
            let grid = plan_grid(black_box(&metrics)).unwrap();
            black_box(grid);
        });
    });

    group.finish();
}

fn benchmark_scale_computation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compositor");
    configure_fast_group(&mut group);

    group.bench_function("compute_scale_oversized", |b| {
        b.iter(|| {
            let scale = compute_scale(black_box(60_000), black_box(60_000)).unwrap();
            black_box(scale);
        });
    });

    group.finish();
}

fn benchmark_export_filename(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");
    configure_fast_group(&mut group);

    let timestamp = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();

    group.bench_function("filename_generation", |b| {
        b.iter(|| {
            let name = export_filename(black_box("png"), black_box(timestamp));
            black_box(name);
        });
    });

    group.finish();
}

fn benchmark_options_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("options");
    configure_fast_group(&mut group);

    group.bench_function("creation", |b| {
        b.iter(|| {
            let options = CaptureOptions::default();
            black_box(options);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_grid_planning,
    benchmark_scale_computation,
    benchmark_export_filename,
    benchmark_options_creation
);
criterion_main!(benches);
