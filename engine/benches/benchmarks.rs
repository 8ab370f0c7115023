//! Performance benchmarks for verlog-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use verlog_engine::{
    diff, EngineConfig, LogData, PendingUpgrade, Query, Record, Session, State,
};

fn user_state(i: u64) -> State {
    serde_json::from_value(json!({
        "name": format!("User {}", i % 7),
        "email": format!("user{}@test.com", i % 3),
        "age": 20 + i % 50,
        "visits": i,
    }))
    .unwrap()
}

fn record_with_history(size: u64, config: EngineConfig) -> Record {
    let session = Session::new();
    let mut record = Record::new(config);
    for i in 0..size {
        let _ = record.update(user_state(i), 1000 + i, &session);
    }
    record
}

fn bench_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("writes");

    group.bench_function("diff_small_state", |b| {
        let old = user_state(1);
        let new = user_state(2);
        b.iter(|| diff(black_box(&old), black_box(&new)))
    });

    group.bench_function("update", |b| {
        let session = Session::new();
        let mut record = Record::new(EngineConfig::default().with_history_limit(100));
        let mut i = 0u64;

        b.iter(|| {
            i += 1;
            record.update(black_box(user_state(i)), black_box(1000 + i), &session)
        })
    });

    group.bench_function("update_full_snapshot", |b| {
        let session = Session::new();
        let mut record = Record::new(EngineConfig::default().with_history_limit(100));
        let _full = session.full_snapshot();
        let mut i = 0u64;

        b.iter(|| {
            i += 1;
            record.update(black_box(user_state(i)), black_box(1000 + i), &session)
        })
    });

    group.finish();
}

fn bench_reconstruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruction");

    for size in [10u64, 100, 1000].iter() {
        let plain = record_with_history(*size, EngineConfig::default());
        group.bench_with_input(BenchmarkId::new("at_first", size), size, |b, _| {
            b.iter(|| plain.at(black_box(Query::Version(1))))
        });
        group.bench_with_input(BenchmarkId::new("at_head", size), size, |b, &size| {
            b.iter(|| plain.at(black_box(Query::Version(size))))
        });

        let checkpointed =
            record_with_history(*size, EngineConfig::default().with_snapshot_interval(10));
        group.bench_with_input(
            BenchmarkId::new("at_head_snapshot_every_10", size),
            size,
            |b, &size| b.iter(|| checkpointed.at(black_box(Query::Version(size)))),
        );

        group.bench_with_input(BenchmarkId::new("at_time", size), size, |b, &size| {
            b.iter(|| plain.at(black_box(Query::Time(1000 + size / 2))))
        });

        group.bench_with_input(BenchmarkId::new("diff_from_first", size), size, |b, _| {
            b.iter(|| plain.diff_from(black_box(Query::Version(1))))
        });
    }

    group.finish();
}

fn bench_persistence(c: &mut Criterion) {
    let mut group = c.benchmark_group("persistence");

    for size in [100u64, 1000].iter() {
        let record = record_with_history(*size, EngineConfig::default());
        let data = record.log_data().unwrap();
        let json = data.to_json().unwrap();

        group.bench_with_input(BenchmarkId::new("to_json", size), size, |b, _| {
            b.iter(|| black_box(&data).to_json())
        });

        group.bench_with_input(BenchmarkId::new("from_json", size), size, |b, _| {
            b.iter(|| LogData::from_json(black_box(&json)))
        });

        let value: Value = serde_json::from_str(&json).unwrap();
        group.bench_with_input(BenchmarkId::new("load", size), size, |b, _| {
            b.iter(|| {
                let config = EngineConfig::default().with_pending_upgrade(PendingUpgrade::Raise);
                Record::load(record.state().clone(), Some(black_box(value.clone())), config)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_writes,
    bench_reconstruction,
    bench_persistence,
);
criterion_main!(benches);
