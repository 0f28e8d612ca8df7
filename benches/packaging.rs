//! Benchmarks for content packaging and conflict detection

use std::collections::BTreeMap;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cursor_sync::packaging::{decode_content, fingerprint, package_bytes};
use cursor_sync::sync::ConflictDetector;
use cursor_sync::types::{SyncDirection, SyncState};

fn settings_json(size: usize) -> Vec<u8> {
    let mut out = String::from("{\n");
    let mut i = 0;
    while out.len() < size {
        out.push_str(&format!("  \"editor.option{}\": {},\n", i, i % 7));
        i += 1;
    }
    out.push_str("  \"end\": true\n}\n");
    out.into_bytes()
}

fn binary_blob(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 256) as u8).collect()
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [1024, 64 * 1024, 512 * 1024] {
        let data = settings_json(size);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| fingerprint(black_box(data)))
        });
    }

    group.finish();
}

fn bench_package(c: &mut Criterion) {
    let mut group = c.benchmark_group("package_bytes");

    let text = settings_json(64 * 1024);
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("text", |b| b.iter(|| package_bytes(black_box(&text))));

    let binary = binary_blob(64 * 1024);
    group.throughput(Throughput::Bytes(binary.len() as u64));
    group.bench_function("binary", |b| b.iter(|| package_bytes(black_box(&binary))));

    let packed = package_bytes(&binary);
    group.bench_function("decode_binary", |b| {
        b.iter(|| decode_content(black_box(&packed.content), packed.encoding).unwrap())
    });

    group.finish();
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("conflict_detect");

    for count in [10, 100, 1000] {
        let base: BTreeMap<String, String> = (0..count)
            .map(|i| (format!("dot-cursor/rules/r{}.mdc", i), format!("base{}", i)))
            .collect();
        let local: BTreeMap<String, String> = base
            .iter()
            .map(|(k, v)| (k.clone(), if k.ends_with("0.mdc") { "local".into() } else { v.clone() }))
            .collect();
        let remote: BTreeMap<String, String> = base
            .iter()
            .map(|(k, v)| (k.clone(), if k.ends_with("5.mdc") || k.ends_with("0.mdc") { "remote".into() } else { v.clone() }))
            .collect();
        let state = SyncState {
            last_sync_timestamp: Utc::now(),
            last_sync_direction: SyncDirection::Push,
            remote_document_id: "bench".into(),
            local_fingerprints: base.clone(),
            remote_fingerprints: base,
        };
        let detector = ConflictDetector::new();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| detector.detect(Some(black_box(&state)), &local, &remote))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_package, bench_detect);
criterion_main!(benches);
