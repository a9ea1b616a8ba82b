use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use layerfs::memtable::ActiveLayer;
use rand::Rng;

fn bench_sequential_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("memtable_append_sequential");

    for &chunk_size in &[64usize, 1024, 8192] {
        let data = vec![0xABu8; chunk_size];

        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &data, |b, data| {
            b.iter(|| {
                let mut layer = ActiveLayer::default();
                for i in 0..100 {
                    layer.append_data((i * data.len()) as u64, black_box(data));
                }
                black_box(layer.size())
            })
        });
    }

    group.finish();
}

fn bench_sparse_append_with_padding(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let gaps: Vec<u64> = (0..100).map(|_| rng.gen_range(1..512)).collect();

    c.bench_function("memtable_append_sparse_100_writes", |b| {
        b.iter(|| {
            let mut layer = ActiveLayer::default();
            let mut offset = 0u64;
            for gap in &gaps {
                let target = offset + gap;
                if target > layer.file_end() {
                    layer.append_zero_pad(layer.file_end(), target);
                }
                layer.append_data(target, black_box(b"payload"));
                offset = target + 7;
            }
            black_box(layer.size())
        })
    });
}

criterion_group!(benches, bench_sequential_append, bench_sparse_append_with_padding);
criterion_main!(benches);
