use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use criterion::{criterion_group, criterion_main};

use daylog::scanner::tokenize;
use daylog::timestamp::sort_lines;

fn access_log(lines: usize) -> Vec<u8> {
    let mut out = String::new();
    for n in 0..lines {
        out.push_str(&format!(
            "79a59df900b9 bucket [06/Feb/2019:{:02}:{:02}:{:02} +0000] 192.0.2.3 79a59df900b9 REQ{n:08} REST.GET.OBJECT key \"GET /bucket/key HTTP/1.1\" 200 - 113 - 7 - \"-\" \"S3Console/0.4\" - hostid SigV2 ECDHE-RSA-AES128-GCM-SHA256 AuthHeader bucket.s3.amazonaws.com TLSV1.1\n",
            (n / 3600) % 24,
            (n / 60) % 60,
            59 - (n % 60)
        ));
    }
    out.into_bytes()
}

fn bench_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenize");
    for &lines in &[100_usize, 10_000] {
        let input = access_log(lines);
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &input, |b, input| {
            b.iter(|| {
                let count = tokenize(black_box(input))
                    .filter(|line| line.is_ok())
                    .count();
                assert_eq!(count, lines);
            });
        });
    }
    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let input = access_log(10_000);
    let parsed: Vec<_> = tokenize(&input).map(|line| line.expect("line")).collect();
    c.bench_function("sort_lines/10000", |b| {
        b.iter(|| sort_lines(black_box(parsed.clone())).expect("sort"));
    });
}

criterion_group!(benches, bench_tokenize, bench_sort);
criterion_main!(benches);
