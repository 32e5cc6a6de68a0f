// Quota Registry Benchmarks
//
// Key metrics:
// - Refill pass time over large registries (lock hold time per tick)
// - use_token throughput from many threads across many keys
//
// Usage:
//   cargo bench --bench registry

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use quota_tracker::{QuotaRegistry, Rule};
use std::hint::black_box;
use std::thread;
use std::time::Duration;

fn populated_registry(keys: usize, window: Duration) -> QuotaRegistry {
    let registry = QuotaRegistry::default();
    for i in 0..keys {
        registry
            .add_rule(&i.to_string(), Rule::new(1.0, window))
            .unwrap();
    }
    registry
}

/// Benchmark: one refill pass over N keys
fn bench_refill_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("refill_pass");
    group.sample_size(20);

    for keys in [10_000usize, 100_000, 1_000_000] {
        let registry = populated_registry(keys, Duration::from_secs(30));
        // Drain one token per key so the pass does real work on the first iteration
        for i in 0..keys {
            let _ = registry.use_token(&i.to_string());
        }

        group.bench_with_input(BenchmarkId::from_parameter(keys), &registry, |b, registry| {
            b.iter(|| black_box(registry.refill_all()));
        });
    }

    group.finish();
}

/// Benchmark: use_token from a pool of threads, each walking its own slice of keys
fn bench_contended_use(c: &mut Criterion) {
    const KEYS: usize = 100_000;
    let registry = populated_registry(KEYS, Duration::from_secs(5));
    let names: Vec<String> = (0..KEYS).map(|i| i.to_string()).collect();

    let mut group = c.benchmark_group("contended_use");
    group.sample_size(10);

    for threads in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                thread::scope(|scope| {
                    for group_id in 0..threads {
                        let registry = &registry;
                        let names = &names;
                        scope.spawn(move || {
                            let mut accepted = 0usize;
                            for j in (group_id..KEYS).step_by(threads) {
                                if let Ok(decision) = registry.use_token(&names[j]) {
                                    accepted += decision.is_accepted() as usize;
                                }
                            }
                            black_box(accepted)
                        });
                    }
                });
                registry.refill_all();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_refill_pass, bench_contended_use);
criterion_main!(benches);
