use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strided_store::{dtypes, ArrayView, Chunk, Order, Resolved, Value};

fn make(size: usize, order: Order) -> ArrayView {
    match ArrayView::from_fn(&[size, size], dtypes::float64(), order, |ix| {
        Value::Float((ix[0] * size + ix[1]) as f64)
    }) {
        Ok(a) => a,
        Err(err) => panic!("from_fn failed: {err}"),
    }
}

fn bench_iter_offsets(c: &mut Criterion) {
    let mut group = c.benchmark_group("iter_offsets");
    for size in [64usize, 256, 1024] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let a = make(size, Order::C);
        let t = a.transpose().unwrap();

        group.bench_with_input(BenchmarkId::new("contiguous", size), &size, |b, _| {
            b.iter(|| {
                let (it, _) = a.create_iter(None, false).unwrap();
                it.offsets().fold(0usize, |acc, o| acc ^ black_box(o))
            })
        });
        group.bench_with_input(BenchmarkId::new("transposed", size), &size, |b, _| {
            b.iter(|| {
                let (it, _) = t.create_iter(None, false).unwrap();
                it.offsets().fold(0usize, |acc, o| acc ^ black_box(o))
            })
        });
    }
    group.finish();
}

fn bench_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy");
    for size in [64usize, 256] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let a = make(size, Order::C);
        let t = a.transpose().unwrap();

        group.bench_with_input(BenchmarkId::new("contiguous", size), &size, |b, _| {
            b.iter(|| a.copy().unwrap())
        });
        group.bench_with_input(BenchmarkId::new("transposed", size), &size, |b, _| {
            b.iter(|| t.copy().unwrap())
        });
    }
    group.finish();
}

fn bench_setslice(c: &mut Criterion) {
    let mut group = c.benchmark_group("setslice");
    for size in [64usize, 256] {
        group.throughput(Throughput::Elements((size * size / 2) as u64));
        let src = make(size, Order::F);
        let dst = ArrayView::zeros(&[size, size], dtypes::float64(), Order::C).unwrap();
        let half = match dst
            .resolve(&[Chunk::Slice { start: None, stop: None, step: 2 }, Chunk::full()])
            .unwrap()
        {
            Resolved::View(v) => v,
            Resolved::Offset(_) => unreachable!(),
        };
        let row = match src.resolve(&[Chunk::Index(0)]).unwrap() {
            Resolved::View(v) => v,
            Resolved::Offset(_) => unreachable!(),
        };

        group.bench_with_input(BenchmarkId::new("broadcast_row", size), &size, |b, _| {
            b.iter(|| half.setslice(&row).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("fill", size), &size, |b, _| {
            b.iter(|| half.fill(&Value::Float(1.5)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_iter_offsets, bench_copy, bench_setslice);
criterion_main!(benches);
