//! Throughput of the step-dispatch loop itself, isolated from any tube work:
//! an identity chain of varying depth driven synchronously end to end.
//!
//! Builds a fixed pipeline shape once, then measures repeated end-to-end
//! calls through it under `criterion`.

use std::sync::{Arc, OnceLock};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tubeline_core::{Action, Engine, Tube, TubeCloner, TubelineError};

struct Identity;

impl Tube<u64> for Identity {
    fn process_request(&self, packet: u64) -> Action<u64> {
        Action::return_with(packet)
    }

    fn process_response(&self, packet: u64) -> Action<u64> {
        Action::return_with(packet)
    }

    fn process_exception(&self, error: TubelineError) -> Action<u64> {
        Action::throw(error)
    }

    fn copy(&self, _handle: &Arc<dyn Tube<u64>>, _cloner: &mut TubeCloner<u64>) -> Arc<dyn Tube<u64>> {
        Arc::new(Identity)
    }
}

/// `next` is a `OnceLock` so `copy` can register this tube's own copy with
/// the cloner before recursing into the child, per `Tube::copy`'s
/// two-phase-construction contract.
struct PassThrough {
    next: OnceLock<Arc<dyn Tube<u64>>>,
}

impl PassThrough {
    fn new(next: Arc<dyn Tube<u64>>) -> Arc<Self> {
        let cell = OnceLock::new();
        cell.set(next).ok();
        Arc::new(Self { next: cell })
    }

    fn next(&self) -> Arc<dyn Tube<u64>> {
        Arc::clone(self.next.get().expect("PassThrough::next used before it was set"))
    }
}

impl Tube<u64> for PassThrough {
    fn process_request(&self, packet: u64) -> Action<u64> {
        Action::invoke(self.next(), packet)
    }

    fn process_response(&self, packet: u64) -> Action<u64> {
        Action::return_with(packet)
    }

    fn process_exception(&self, error: TubelineError) -> Action<u64> {
        Action::throw(error)
    }

    fn copy(&self, handle: &Arc<dyn Tube<u64>>, cloner: &mut TubeCloner<u64>) -> Arc<dyn Tube<u64>> {
        let concrete = Arc::new(PassThrough {
            next: OnceLock::new(),
        });
        let erased: Arc<dyn Tube<u64>> = concrete.clone();
        cloner.add(handle, Arc::clone(&erased));
        let next_copy = cloner.copy(&self.next());
        concrete
            .next
            .set(next_copy)
            .ok()
            .expect("PassThrough::copy set next twice");
        erased
    }
}

fn build_chain(depth: usize) -> Arc<dyn Tube<u64>> {
    let mut tubeline: Arc<dyn Tube<u64>> = Arc::new(Identity);
    for _ in 0..depth {
        tubeline = PassThrough::new(tubeline);
    }
    tubeline
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("fiber_dispatch");
    for depth in [1usize, 8, 32] {
        let tubeline = build_chain(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                let fiber = Engine::new("bench").create_fiber::<u64>();
                let result = fiber.run_sync(Arc::clone(&tubeline), 0).unwrap();
                black_box(result);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
