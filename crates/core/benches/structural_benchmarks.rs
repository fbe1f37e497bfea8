use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use domainkit_core::{IdentityHandle, Value, deep_clone, deep_equals, deep_freeze};

/// Balanced tree of records `depth` levels deep, `width` children per level,
/// each node also carrying a short list of scalars.
fn tree(depth: usize, width: usize) -> Value {
    let mut fields = vec![
        ("depth".to_string(), Value::from(depth as i64)),
        ("tags".to_string(), Value::list(["alpha", "beta", "gamma"])),
    ];
    if depth > 0 {
        for i in 0..width {
            fields.push((format!("child_{i}"), tree(depth - 1, width)));
        }
    }
    Value::Record(fields.into_iter().collect())
}

fn bench_deep_clone(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_clone");
    for depth in [2, 4, 6] {
        let value = tree(depth, 3);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &value, |b, v| {
            b.iter(|| deep_clone(black_box(v)));
        });
    }
    group.finish();
}

fn bench_deep_equals(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_equals");
    for depth in [2, 4, 6] {
        let left = tree(depth, 3);
        let right = deep_clone(&left);
        group.bench_with_input(
            BenchmarkId::from_parameter(depth),
            &(left, right),
            |b, (l, r)| {
                b.iter(|| deep_equals(black_box(l), black_box(r)));
            },
        );
    }
    group.finish();
}

fn bench_clone_then_freeze(c: &mut Criterion) {
    let value = tree(4, 3);
    c.bench_function("clone_then_freeze", |b| {
        b.iter(|| {
            let sealed = deep_clone(black_box(&value));
            deep_freeze(&sealed);
            sealed
        });
    });
}

fn bench_identity_reconciliation(c: &mut Criterion) {
    let mut a = IdentityHandle::<u64>::create();
    let mut b = IdentityHandle::<u64>::create();
    let _ = a.set_primary_key(42);
    let _ = b.set_secondary_key(42);

    c.bench_function("identity_same_as_cross_match", |bench| {
        bench.iter(|| black_box(&a).same_as(black_box(&b)));
    });
}

criterion_group!(
    benches,
    bench_deep_clone,
    bench_deep_equals,
    bench_clone_then_freeze,
    bench_identity_reconciliation
);
criterion_main!(benches);
