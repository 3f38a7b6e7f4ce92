use std::sync::Arc;

use criterion::{black_box, BatchSize, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};

use daylog::{DayGroup, Deadline, FetchParsePool, MemoryStore, ObjectRef, PoolOptions};

const OBJECTS: usize = 200;
const LINES_PER_OBJECT: usize = 50;

fn day_store() -> (MemoryStore, DayGroup) {
    let mut store = MemoryStore::new();
    let mut objects = Vec::with_capacity(OBJECTS);
    for object in 0..OBJECTS {
        let key = format!("logs/2019-02-06-{object:05}");
        let mut body = String::new();
        for line in 0..LINES_PER_OBJECT {
            let second = (object * LINES_PER_OBJECT + line) % 86_400;
            body.push_str(&format!(
                "owner bucket [06/Feb/2019:{:02}:{:02}:{:02} +0000] 192.0.2.3 - R{object}-{line} REST.GET.OBJECT \"GET / HTTP/1.1\" 200\n",
                second / 3600,
                (second / 60) % 60,
                second % 60
            ));
        }
        objects.push(ObjectRef::new(key.clone(), body.len() as u64));
        store.insert("bucket", key, body.into_bytes());
    }
    let group = DayGroup {
        token: "2019-02-06".to_string(),
        objects,
    };
    (store, group)
}

fn bench_read_day(c: &mut Criterion) {
    let (store, group) = day_store();
    let store = Arc::new(store);
    let mut bench = c.benchmark_group("read_day");
    for &workers in &[1_usize, 4, 8] {
        bench.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter_batched(
                || {
                    let options = PoolOptions {
                        workers,
                        ..PoolOptions::default()
                    };
                    FetchParsePool::new(store.clone(), "bucket", options)
                },
                |pool| {
                    let day = pool.read_day(black_box(&group), &Deadline::never()).expect("day");
                    assert_eq!(day.lines.len(), OBJECTS * LINES_PER_OBJECT);
                },
                BatchSize::SmallInput,
            );
        });
    }
    bench.finish();
}

criterion_group!(benches, bench_read_day);
criterion_main!(benches);
