//! Benchmarks for the calibration store.
//!
//! Run with: cargo bench --package calib-store
//!
//! ## Benchmark Categories
//!
//! - **Retrieval**: `get_item` over a populated folder tree, with and
//!   without the range cache
//! - **Insertion**: right-open appends
//! - **Snapshot Codec**: encode/decode of a full snapshot

use calib_store::backend::SyncMode;
use calib_store::snapshot::file::{decode, encode};
use calib_store::{
    AddMode, CachePolicy, CalibrationSnapshot, CalibrationStore, PointId, StoreConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

const T0: i64 = 1_561_680_000;
const RUN_LENGTH: i64 = 3600;
const NAME: &str = "CB_Energy";

/// Typical energy calibration: one gain per crystal plus a few fit
/// parameters on a subset of channels.
fn generate_snapshot(first: PointId, last: PointId, channels: u32) -> CalibrationSnapshot {
    let mut snapshot = CalibrationSnapshot::new(NAME, first, last).with_author("bench");
    for channel in 0..channels {
        snapshot = snapshot.with_value(channel, 1.0 + (channel as f64 * 0.1).sin() * 0.05);
        if channel % 16 == 0 {
            snapshot = snapshot.with_fit_parameters(channel, vec![0.0, 1.0, 0.01, 1e-4]);
        }
    }
    snapshot
}

fn populate(policy: CachePolicy, runs: i64) -> (TempDir, CalibrationStore) {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("calibration"))
        .with_sync_mode(SyncMode::None)
        .with_cache_policy(policy);
    let mut store = CalibrationStore::open(&config).unwrap();
    for run in 0..runs {
        let first = PointId::new(T0 + run * RUN_LENGTH, 0);
        store
            .add(generate_snapshot(first, PointId::OPEN, 64), AddMode::RightOpen)
            .unwrap();
    }
    (temp_dir, store)
}

fn bench_get_item(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_item");

    for runs in [10i64, 100].iter() {
        for (policy_name, policy) in [
            ("uncached", CachePolicy::Disabled),
            ("cached", CachePolicy::PerCalibration),
        ] {
            let (_temp_dir, mut store) = populate(policy, *runs);
            let probes: Vec<PointId> = (0..*runs)
                .map(|run| PointId::new(T0 + run * RUN_LENGTH + RUN_LENGTH / 2, 0))
                .collect();

            group.throughput(Throughput::Elements(probes.len() as u64));
            group.bench_function(BenchmarkId::new(policy_name, runs), |b| {
                b.iter(|| {
                    for probe in &probes {
                        black_box(store.get_item(NAME, black_box(*probe)).unwrap());
                    }
                })
            });
        }
    }

    group.finish();
}

fn bench_change_points(c: &mut Criterion) {
    let (_temp_dir, mut store) = populate(CachePolicy::Disabled, 100);

    c.bench_function("change_points_100_ranges", |b| {
        b.iter(|| store.change_points(black_box(NAME)).unwrap())
    });
}

fn bench_right_open_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("right_open_append");
    group.sample_size(10);

    for runs in [10i64, 50].iter() {
        group.throughput(Throughput::Elements(*runs as u64));
        group.bench_with_input(BenchmarkId::from_parameter(runs), runs, |b, &runs| {
            b.iter(|| populate(CachePolicy::PerCalibration, runs))
        });
    }

    group.finish();
}

fn bench_snapshot_codec(c: &mut Criterion) {
    let snapshot = generate_snapshot(
        PointId::new(T0, 0),
        PointId::new(T0 + RUN_LENGTH, 0),
        720,
    );
    let bytes = encode(&snapshot).unwrap();

    c.bench_function("snapshot_encode_720ch", |b| {
        b.iter(|| encode(black_box(&snapshot)).unwrap())
    });
    c.bench_function("snapshot_decode_720ch", |b| {
        b.iter(|| decode(black_box(&bytes)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_get_item,
    bench_change_points,
    bench_right_open_append,
    bench_snapshot_codec,
);
criterion_main!(benches);
