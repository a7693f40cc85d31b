use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use osalloc::OsAlloc;

const OPS: u64 = 100_000;

static ALLOCATOR: OsAlloc = OsAlloc::new();

/// osalloc alloc/free throughput.
fn osalloc_malloc_free(size: usize) {
    for _ in 0..OPS {
        unsafe {
            let ptr = ALLOCATOR.malloc(size);
            black_box(ptr);
            ALLOCATOR.free(ptr);
        }
    }
}

/// libc alloc/free throughput.
fn libc_malloc_free(size: usize) {
    for _ in 0..OPS {
        unsafe {
            let ptr = libc::malloc(size);
            black_box(ptr);
            libc::free(ptr);
        }
    }
}

fn benchmark_malloc_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("malloc_throughput");

    for size in [16, 64, 256, 1024, 4096] {
        group.throughput(Throughput::Elements(OPS));

        group.bench_with_input(BenchmarkId::new("osalloc", size), &size, |b, &size| {
            b.iter(|| osalloc_malloc_free(size))
        });

        group.bench_with_input(BenchmarkId::new("libc", size), &size, |b, &size| {
            b.iter(|| libc_malloc_free(size))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_malloc_throughput);
criterion_main!(benches);
