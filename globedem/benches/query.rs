use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use globedem::{DatasetLayout, DatasetReader, TileShape};
use tempfile::NamedTempFile;

const SAMPLES: usize = 1201;

/// Global dataset of 1201×1201 chunks with a simple elevation gradient.
fn create_dataset() -> (NamedTempFile, DatasetReader) {
    let layout =
        DatasetLayout::viewfinder_15().with_shape(TileShape::new(SAMPLES, SAMPLES).unwrap());
    let mut chunk = Vec::with_capacity(SAMPLES * SAMPLES * 2);
    for row in 0..SAMPLES {
        for col in 0..SAMPLES {
            chunk.extend_from_slice(&(((row + col) % 4000) as u16).to_be_bytes());
        }
    }

    let mut file = NamedTempFile::new().unwrap();
    for _ in layout.codes() {
        file.write_all(&chunk).unwrap();
    }
    file.flush().unwrap();

    let reader = DatasetReader::open(file.path(), layout).unwrap();
    (file, reader)
}

fn bench_single_nearest(c: &mut Criterion) {
    let (_file, dataset) = create_dataset();

    c.bench_function("single_nearest", |b| {
        b.iter(|| {
            black_box(
                dataset
                    .query(black_box(35.3606), black_box(138.7274))
                    .unwrap(),
            );
        });
    });
}

fn bench_single_interpolated(c: &mut Criterion) {
    let (_file, dataset) = create_dataset();

    c.bench_function("single_interpolated", |b| {
        b.iter(|| {
            black_box(
                dataset
                    .query_interpolated(black_box(35.3606), black_box(138.7274))
                    .unwrap(),
            );
        });
    });
}

fn bench_batch_one_chunk(c: &mut Criterion) {
    let (_file, dataset) = create_dataset();

    // 1000 coords within chunk J
    let coords: Vec<(f64, f64)> = (0..1000)
        .map(|i| {
            let frac = i as f64 / 1000.0;
            (1.0 + frac * 43.0, 1.0 + frac * 58.0)
        })
        .collect();

    c.bench_function("batch_1000_one_chunk", |b| {
        b.iter(|| {
            for &(lat, lon) in black_box(&coords) {
                black_box(dataset.query(lat, lon).unwrap());
            }
        });
    });
}

fn bench_batch_global(c: &mut Criterion) {
    let (_file, dataset) = create_dataset();

    // 1000 coords spread over every chunk
    let coords: Vec<(f64, f64)> = (0..1000)
        .map(|i| {
            let frac = i as f64 / 1000.0;
            (89.0 - frac * 178.0, (i * 37 % 360) as f64 - 180.0)
        })
        .collect();

    c.bench_function("batch_1000_global", |b| {
        b.iter(|| {
            for &(lat, lon) in black_box(&coords) {
                black_box(dataset.query(lat, lon).unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_single_nearest,
    bench_single_interpolated,
    bench_batch_one_chunk,
    bench_batch_global,
);
criterion_main!(benches);
