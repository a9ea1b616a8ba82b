use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use layerfs::Range;
use rand::Rng;

fn random_ranges(count: usize, span: u64) -> Vec<Range> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let lo = rng.gen_range(0..span);
            let hi = lo + rng.gen_range(1..span.max(2));
            Range::new(lo, hi)
        })
        .collect()
}

fn bench_overlap(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_overlap");

    for &count in &[10usize, 100, 1000] {
        let ranges = random_ranges(count, 10_000);
        let query = Range::new(4_000, 6_000);

        group.bench_with_input(BenchmarkId::from_parameter(count), &ranges, |b, ranges| {
            b.iter(|| {
                let matched = ranges.iter().filter(|r| r.overlaps(black_box(&query))).count();
                black_box(matched)
            })
        });
    }

    group.finish();
}

fn bench_intersect(c: &mut Criterion) {
    let ranges = random_ranges(1000, 10_000);
    let query = Range::new(4_000, 6_000);

    c.bench_function("range_intersect_1000", |b| {
        b.iter(|| {
            let total: u64 = ranges
                .iter()
                .filter_map(|r| r.intersect(black_box(&query)))
                .map(|r| r.width())
                .sum();
            black_box(total)
        })
    });
}

criterion_group!(benches, bench_overlap, bench_intersect);
criterion_main!(benches);
