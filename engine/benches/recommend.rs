//! Benchmarks for the recommendation path
//!
//! - vectorize: single workload
//! - similarity search: brute-force scan of the in-memory history log
//! - recommend: vectorize + search + weighted vote

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use planck_engine::history::{ExecutionOutcome, ExecutionRecord, HistoryStore, InMemoryHistoryStore};
use planck_engine::recommender::{Recommender, RecommenderConfig};
use planck_engine::workload::{Algorithm, Backend, ErrorMitigation, WorkloadDescriptor};
use planck_engine::vectorize;
use std::sync::Arc;
use tokio::runtime::Runtime;

const ALGORITHMS: [Algorithm; 5] = [
    Algorithm::Bell,
    Algorithm::Grover,
    Algorithm::Shor,
    Algorithm::Vqe,
    Algorithm::Qaoa,
];

/// Deterministic spread of workloads
fn workload(i: usize) -> WorkloadDescriptor {
    WorkloadDescriptor {
        qubits: (i % 60) as u32 + 1,
        depth: ((i * 7) % 400) as u32 + 1,
        gate_count: ((i * 13) % 5_000) as u32 + 1,
        algorithm: ALGORITHMS[i % ALGORITHMS.len()],
        data_size: ((i * 31) % 100_000) as u64,
        data_complexity: (i % 10) as f64 / 10.0,
        target_latency_ms: ((i % 20) * 250) as f64,
        error_mitigation: match i % 4 {
            0 => ErrorMitigation::None,
            1 => ErrorMitigation::Low,
            2 => ErrorMitigation::Medium,
            _ => ErrorMitigation::High,
        },
        user_historical_accuracy: 0.5,
    }
}

fn seeded_store(rt: &Runtime, records: usize) -> Arc<InMemoryHistoryStore> {
    let store = Arc::new(InMemoryHistoryStore::new());
    rt.block_on(async {
        for i in 0..records {
            let w = workload(i);
            let outcome = ExecutionOutcome {
                shots_used: 500 + (i % 40) as u32 * 100,
                backend_used: Backend::ALL[i % Backend::ALL.len()],
                error_mitigation: Some(w.error_mitigation),
                success_rate: 60.0 + (i % 40) as f64,
                runtime_ms: 100.0 + (i % 50) as f64 * 20.0,
                predicted_fidelity: 80.0,
            };
            let _ = store
                .append(ExecutionRecord::new(vectorize(&w), &w, &outcome, (i % 120) as f64))
                .await;
        }
    });
    store
}

fn bench_vectorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("vectorize");
    group.throughput(Throughput::Elements(1));

    let w = workload(42);
    group.bench_function("single", |b| b.iter(|| vectorize(black_box(&w))));

    group.finish();
}

fn bench_similarity_search(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("similarity_search");

    for size in [1_000, 10_000, 50_000] {
        let store = seeded_store(&rt, size);
        let query = vectorize(&workload(7));
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                rt.block_on(store.find_similar(black_box(&query), 0.6, 80))
                    .map(|hits| hits.len())
            });
        });
    }

    group.finish();
}

fn bench_recommend(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("recommend");

    for size in [0, 10_000] {
        let store = seeded_store(&rt, size);
        let recommender = Recommender::new(store, RecommenderConfig::default());
        let w = workload(7);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| rt.block_on(recommender.recommend(black_box(&w))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_vectorize, bench_similarity_search, bench_recommend);
criterion_main!(benches);
