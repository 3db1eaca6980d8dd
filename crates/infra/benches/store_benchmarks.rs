use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use datalink_core::YearMonth;
use datalink_infra::seed::ensure_defaults;
use datalink_infra::{IdentityStore, InMemoryStore, QualityStore, load_principal};
use datalink_quality::QaEntryInput;

fn month_of_entries(lines: usize) -> Vec<QaEntryInput> {
    (0..lines)
        .flat_map(|l| {
            (1..=28).map(move |day| QaEntryInput {
                line: format!("L{l}"),
                day,
                month: 3,
                year: 2024,
                value: day as f64,
                scrap: false,
            })
        })
        .collect()
}

fn bench_qa_upsert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("qa_upsert");
    for lines in [1usize, 10, 40] {
        let entries = month_of_entries(lines);
        group.throughput(Throughput::Elements(entries.len() as u64));
        group.bench_with_input(BenchmarkId::new("fresh_store", lines), &entries, |b, entries| {
            b.iter(|| {
                let store = InMemoryStore::new();
                rt.block_on(store.upsert_qa(black_box(entries.clone()))).unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("overwrite", lines), &entries, |b, entries| {
            let store = InMemoryStore::new();
            rt.block_on(store.upsert_qa(entries.clone())).unwrap();
            b.iter(|| rt.block_on(store.upsert_qa(black_box(entries.clone()))).unwrap())
        });
    }
    group.finish();
}

fn bench_qa_month_listing(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = InMemoryStore::new();
    for month in 1..=12 {
        let entries = month_of_entries(20)
            .into_iter()
            .map(|e| QaEntryInput { month, ..e })
            .collect();
        rt.block_on(store.upsert_qa(entries)).unwrap();
    }
    let period = YearMonth { year: 2024, month: 6 };
    c.bench_function("qa_list_month", |b| {
        b.iter(|| rt.block_on(store.list_qa(black_box(period), None)).unwrap())
    });
}

fn bench_principal_resolution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = InMemoryStore::new();
    rt.block_on(ensure_defaults(&store, Some("bench-password"))).unwrap();
    let admin = rt
        .block_on(store.find_user_by_name("admin"))
        .unwrap()
        .unwrap();
    c.bench_function("load_principal", |b| {
        b.iter(|| rt.block_on(load_principal(&store, black_box(admin.id))).unwrap())
    });
}

criterion_group!(benches, bench_qa_upsert, bench_qa_month_listing, bench_principal_resolution);
criterion_main!(benches);
