use chrono::TimeZone;
use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use backup_ranges::model::CheckpointKind;
use backup_ranges::ranges;
use backup_ranges::BackupDescriptor;
use backup_ranges::BackupIdentifier;
use backup_ranges::BackupRangeMarker;
use backup_ranges::RangeIndex;

fn descriptor(previous: Option<i64>) -> BackupDescriptor {
    BackupDescriptor {
        previous_backup: previous.map(|checkpoint| BackupIdentifier::new(1, 1, checkpoint)),
        next_backup: None,
        snapshot_id: None,
        first_log_position: None,
        checkpoint_position: 0,
        partition_count: 1,
        broker_version: "8.7.0".to_owned(),
        checkpoint_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        checkpoint_kind: CheckpointKind::Scheduled,
    }
}

fn chain_inserts(n: i64) -> RangeIndex {
    let mut index = RangeIndex::new();
    for checkpoint in 1..=n {
        let previous = (checkpoint > 1).then(|| checkpoint - 1);
        index
            .add(BackupIdentifier::new(1, 1, checkpoint), &descriptor(previous))
            .unwrap();
    }
    index
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_index");
    for n in [1_000i64, 10_000] {
        group.bench_function(BenchmarkId::new("chain_insert", n), |b| {
            b.iter(|| chain_inserts(n));
        });
        let index = chain_inserts(n);
        group.bench_function(BenchmarkId::new("lookup", n), |b| {
            b.iter(|| index.lookup(n / 2));
        });
    }
    group.finish();

    let markers: Vec<BackupRangeMarker> = (0..1_000)
        .flat_map(|range| {
            let start = range * 100;
            [
                BackupRangeMarker::Start(start),
                BackupRangeMarker::End(start + 50),
                BackupRangeMarker::Deletion(start + 25),
            ]
        })
        .collect();
    c.bench_function("from_markers_1000_ranges", |b| {
        b.iter(|| ranges::from_markers(markers.iter().copied()));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
