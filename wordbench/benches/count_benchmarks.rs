use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use wordbench::{
    device::{AcceleratorPlatform, HostPlatform},
    Counter, KernelCounter, ResourceCache, SerialCounter, WorkerPoolCounter,
};

fn corpus(words: usize) -> String {
    let vocabulary = ["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog"];
    (0..words)
        .map(|i| vocabulary[(i * 7 + i / 3) % vocabulary.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_serial(c: &mut Criterion) {
    let mut group = c.benchmark_group("serial");
    for words in [1_000, 100_000] {
        let text = corpus(words);
        group.bench_with_input(BenchmarkId::from_parameter(words), &text, |b, text| {
            let counter = SerialCounter::new();
            b.iter(|| counter.count("bench", black_box(text), black_box("fox")))
        });
    }
    group.finish();
}

fn bench_worker_pool(c: &mut Criterion) {
    let text = corpus(100_000);
    let mut group = c.benchmark_group("worker_pool");
    for threads in [1, 2, 4, 8] {
        let counter = WorkerPoolCounter::new(threads).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(threads), &text, |b, text| {
            b.iter(|| counter.count("bench", black_box(text), black_box("fox")))
        });
    }
    group.finish();
}

fn bench_kernels(c: &mut Criterion) {
    let text = corpus(20_000);
    let platform: Arc<dyn AcceleratorPlatform> = Arc::new(HostPlatform::new());
    let cache = Arc::new(ResourceCache::new());

    let mut group = c.benchmark_group("host_kernels");
    let naive = KernelCounter::naive(platform.clone(), cache.clone());
    group.bench_function("naive", |b| {
        b.iter(|| naive.count("bench", black_box(&text), black_box("fox")))
    });
    for group_size in [64, 256] {
        let reduced = KernelCounter::reduced(platform.clone(), cache.clone())
            .with_group_size(group_size)
            .unwrap();
        group.bench_with_input(
            BenchmarkId::new("reduced", group_size),
            &text,
            |b, text| b.iter(|| reduced.count("bench", black_box(text), black_box("fox"))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_serial, bench_worker_pool, bench_kernels);
criterion_main!(benches);
