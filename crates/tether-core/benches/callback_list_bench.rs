//! Benchmarks for weak callback list notification.
//!
//! Run with: cargo bench -p tether-core -- callback_list

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use tether_core::WeakCallbackList;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counter {
    hits: Cell<u64>,
}

impl Counter {
    fn bump(&self, delta: &u64) {
        self.hits.set(self.hits.get().wrapping_add(*delta));
    }
}

fn populated(count: usize) -> (WeakCallbackList<u64>, Vec<Rc<Counter>>) {
    let list = WeakCallbackList::new();
    let targets: Vec<_> = (0..count).map(|_| Rc::new(Counter::default())).collect();
    for t in &targets {
        list.register_bound(t, Counter::bump);
    }
    (list, targets)
}

// ---------------------------------------------------------------------------
// 1. Notify with all targets alive
// ---------------------------------------------------------------------------

fn bench_notify_live(c: &mut Criterion) {
    let mut group = c.benchmark_group("callback_list/notify_live");

    for count in [1usize, 16, 256] {
        group.throughput(Throughput::Elements(count as u64));
        let (list, _targets) = populated(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &(), |b, _| {
            b.iter(|| black_box(list.notify(black_box(&1))))
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Lazy invocation with half the targets dropped
// ---------------------------------------------------------------------------

fn bench_invoke_half_dead(c: &mut Criterion) {
    let mut group = c.benchmark_group("callback_list/invoke_half_dead");

    for count in [16usize, 256] {
        group.throughput(Throughput::Elements(count as u64));
        let (list, mut targets) = populated(count);
        // Dead entries stay registered because invoke_all never prunes.
        targets.retain({
            let mut keep = false;
            move |_| {
                keep = !keep;
                keep
            }
        });
        group.bench_with_input(BenchmarkId::from_parameter(count), &(), |b, _| {
            b.iter(|| black_box(list.invoke_all(black_box(&1)).count()))
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Register then unregister
// ---------------------------------------------------------------------------

fn bench_register_unregister(c: &mut Criterion) {
    let target = Rc::new(Counter::default());
    let (list, _targets) = populated(64);
    c.bench_function("callback_list/register_unregister", |b| {
        b.iter(|| {
            let id = list.register_bound(&target, Counter::bump);
            black_box(list.unregister(id))
        })
    });
}

criterion_group!(
    benches,
    bench_notify_live,
    bench_invoke_half_dead,
    bench_register_unregister
);
criterion_main!(benches);
