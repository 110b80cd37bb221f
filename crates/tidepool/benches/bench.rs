use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::thread;
use std::time::Instant;
use tidepool::Pool;

// Total number of jobs pushed through the pool per benchmark iteration
const TOTAL_JOBS: usize = 4096;

/// Benchmark synchronous handoff throughput across pool sizes.
fn bench_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/process");

    let max_workers = num_cpus::get().max(2);
    for num_workers in [1, 2, 4, 8] {
        if num_workers > max_workers {
            break;
        }
        group.throughput(Throughput::Elements(TOTAL_JOBS as u64));
        group.bench_function(
            format!("jobs/{}/workers/{}", TOTAL_JOBS, num_workers),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let pool = Pool::from_fn(num_workers, |n: usize| n);
                        for i in 0..TOTAL_JOBS {
                            black_box(pool.process(i));
                        }
                        pool.close();
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Benchmark contended handoff: more callers than workers.
fn bench_process_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/process/contended");

    const CALLERS: usize = 8;
    group.throughput(Throughput::Elements(TOTAL_JOBS as u64));
    group.bench_function(format!("jobs/{}/callers/{}", TOTAL_JOBS, CALLERS), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let pool = Pool::from_fn(num_cpus::get().max(2), |n: usize| n);
                thread::scope(|s| {
                    for _ in 0..CALLERS {
                        let pool = &pool;
                        s.spawn(move || {
                            for i in 0..TOTAL_JOBS / CALLERS {
                                black_box(pool.process(i));
                            }
                        });
                    }
                });
                pool.close();
            }

            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_process, bench_process_contended);
criterion_main!(benches);
