use criterion::{black_box, criterion_group, criterion_main, Criterion};
use replikit::prelude::*;

fn bench_gcounter_merge(c: &mut Criterion) {
    let counters: Vec<GCounter> = (0..100)
        .map(|i| {
            let mut counter = GCounter::new();
            counter.increment(&format!("node-{i}"), 100);
            counter
        })
        .collect();

    c.bench_function("GCounter::merge 100 replicas", |b| {
        b.iter(|| {
            let mut merged = counters[0].clone();
            for other in &counters[1..] {
                merged.merge(other);
            }
            black_box(merged.value())
        })
    });
}

fn bench_vector_clock_compare(c: &mut Criterion) {
    let mut a = VectorClock::new();
    let mut b = VectorClock::new();
    for i in 0..64 {
        let replica = format!("node-{i}");
        for _ in 0..=(i % 7) {
            a.increment(&replica);
        }
        for _ in 0..=(i % 5) {
            b.increment(&replica);
        }
    }

    c.bench_function("VectorClock::compare 64 components", |bench| {
        bench.iter(|| black_box(a.compare(&b)))
    });

    c.bench_function("VectorClock::merge 64 components", |bench| {
        bench.iter(|| {
            let mut merged = a.clone();
            merged.merge(&b);
            black_box(merged.len())
        })
    });
}

fn bench_tombstone_set_merge(c: &mut Criterion) {
    let build = |replica: &str, base: i64| {
        let mut set = TombstoneSet::new();
        for i in 0..500 {
            set.insert(format!("id-{i}"), i, base + i as i64, replica);
        }
        for i in (0..500).step_by(3) {
            set.remove(format!("id-{i}"), base + 1000 + i as i64, replica);
        }
        set
    };
    let s1 = build("a", 0);
    let s2 = build("b", 250);

    c.bench_function("TombstoneSet::merge 500 ids", |b| {
        b.iter(|| {
            let mut merged = s1.clone();
            merged.merge(&s2);
            black_box(merged.len())
        })
    });
}

fn bench_rga_insert_and_merge(c: &mut Criterion) {
    c.bench_function("Rga::append x500", |b| {
        b.iter(|| {
            let mut rga = Rga::new();
            for i in 0..500 {
                rga.append(i, i as i64, "bench");
            }
            black_box(rga.len())
        })
    });

    let build = |replica: &str| {
        let mut rga = Rga::new();
        for i in 0..250 {
            rga.append(i, i as i64, replica);
        }
        rga
    };
    let r1 = build("a");
    let r2 = build("b");

    c.bench_function("Rga::merge 2x250", |b| {
        b.iter(|| {
            let mut merged = r1.clone();
            merged.merge(&r2);
            black_box(merged.len())
        })
    });
}

criterion_group!(
    benches,
    bench_gcounter_merge,
    bench_vector_clock_compare,
    bench_tombstone_set_merge,
    bench_rga_insert_and_merge
);
criterion_main!(benches);
