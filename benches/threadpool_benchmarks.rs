use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use elastic_pool::{builder, ThreadPool, ThreadPoolBuilder};
use std::{
    hint::black_box,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

const KEEP_ALIVE: Duration = Duration::from_secs(60);

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn run_counting(pool: &ThreadPool, tasks: usize) {
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..tasks {
        let counter = counter.clone();
        pool.execute(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    }
    while counter.load(Ordering::Relaxed) < tasks {
        std::thread::yield_now();
    }
}

// Benchmark 1: queue-first vs scale-first приём задач
fn bench_admission_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission_mode");
    let threads = num_cpus::get().max(2);

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("queue_first", size), &size, |b, &size| {
            let pool = builder()
                .elastic_size(threads / 2, threads)
                .keep_alive(KEEP_ALIVE)
                .queue_first()
                .bounded_queue(size)
                .build()
                .unwrap();
            b.iter(|| run_counting(&pool, size));
            pool.shutdown_timeout(Duration::from_secs(5));
        });

        group.bench_with_input(BenchmarkId::new("scale_first", size), &size, |b, &size| {
            let pool = builder()
                .elastic_size(threads / 2, threads)
                .keep_alive(KEEP_ALIVE)
                .scale_first()
                .bounded_queue(size)
                .build()
                .unwrap();
            b.iter(|| run_counting(&pool, size));
            pool.shutdown_timeout(Duration::from_secs(5));
        });
    }

    group.finish();
}

// Benchmark 2: тип очереди
fn bench_queue_kind(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_kind");
    let tasks = 5000;
    let threads = num_cpus::get();
    group.throughput(Throughput::Elements(tasks as u64));

    group.bench_function("rendezvous", |b| {
        let pool = builder().fixed_size(threads).scale_first().without_queue().build().unwrap();
        b.iter(|| run_counting(&pool, tasks));
        pool.shutdown_timeout(Duration::from_secs(5));
    });

    group.bench_function("bounded", |b| {
        let pool = builder().fixed_size(threads).bounded_queue(256).build().unwrap();
        b.iter(|| run_counting(&pool, tasks.min(256)));
        pool.shutdown_timeout(Duration::from_secs(5));
    });

    group.bench_function("unbounded", |b| {
        let pool = builder().fixed_size(threads).unbounded_queue().build().unwrap();
        b.iter(|| run_counting(&pool, tasks));
        pool.shutdown_timeout(Duration::from_secs(5));
    });

    group.finish();
}

// Benchmark 3: число потоков
fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    group.sample_size(20);

    let tasks = 5000;
    group.throughput(Throughput::Elements(tasks as u64));

    for threads in [2, 4, 8, 16] {
        if threads <= num_cpus::get() * 2 {
            group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
                let pool = builder()
                    .fixed_size(threads)
                    .unbounded_queue()
                    .prestart_core_threads(true)
                    .build()
                    .unwrap();
                b.iter(|| run_counting(&pool, tasks));
                pool.shutdown_timeout(Duration::from_secs(5));
            });
        }
    }

    group.finish();
}

// Benchmark 4: задачи с результатом
fn bench_submit_handles(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_handles");

    for size in [100, 1000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("join", size), &size, |b, &size| {
            let pool = ThreadPoolBuilder::cpu_bound().build().unwrap();
            b.iter(|| {
                let handles: Vec<_> = (0..size)
                    .map(|i| pool.submit(move || black_box(i * 2)).unwrap())
                    .collect();
                for handle in handles {
                    black_box(handle.join().unwrap());
                }
            });
            pool.shutdown_timeout(Duration::from_secs(5));
        });

        group.bench_with_input(BenchmarkId::new("await", size), &size, |b, &size| {
            let rt = create_runtime();
            let pool = ThreadPoolBuilder::io_bound().build().unwrap();
            b.to_async(&rt).iter(|| {
                let pool = &pool;
                async move {
                    let handles: Vec<_> = (0..size)
                        .map(|i| pool.submit(move || black_box(i * 2)).unwrap())
                        .collect();
                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                }
            });
            pool.shutdown_timeout(Duration::from_secs(5));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_admission_mode,
    bench_queue_kind,
    bench_thread_scaling,
    bench_submit_handles,
);
criterion_main!(benches);
