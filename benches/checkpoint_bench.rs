use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use layerfs::{MemoryObjectStore, SqliteCatalog, StorageManager};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn bench_checkpoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint");
    let rt = Runtime::new().unwrap();

    for &write_count in &[8usize, 64, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(write_count),
            &write_count,
            |b, &write_count| {
                b.iter(|| {
                    rt.block_on(async {
                        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
                        let object_store = MemoryObjectStore::new();
                        let manager = StorageManager::new(catalog, object_store);
                        let token = CancellationToken::new();

                        manager.insert_file("bench").unwrap();
                        for i in 0..write_count {
                            let offset = (i * 16) as u64;
                            manager
                                .write(&token, "bench", black_box(b"0123456789ABCDEF"), offset)
                                .await
                                .unwrap();
                        }

                        manager.checkpoint(&token, "bench", "v1").await.unwrap();
                        black_box(())
                    })
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_checkpoint);
criterion_main!(benches);
