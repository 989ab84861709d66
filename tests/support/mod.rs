//! Shared tube fixtures for the integration test suites.
//!
//! Lives under `tests/support/` rather than `tests/support.rs` so Cargo's
//! test auto-discovery doesn't also build it as its own (empty) test binary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Once};
use std::time::Duration;

use tubeline_core::{Action, Tube, TubeCloner, TubelineError};

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing-subscriber` fmt layer once per test binary, so the
/// suspend/resume and interceptor trace events are visible under
/// `cargo test -- --nocapture`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Default)]
pub struct Counters {
    pub req: AtomicUsize,
    pub resp: AtomicUsize,
    pub exc: AtomicUsize,
    pub copy: AtomicUsize,
}

impl Counters {
    pub fn snapshot(&self) -> (usize, usize, usize, usize) {
        (
            self.req.load(Ordering::SeqCst),
            self.resp.load(Ordering::SeqCst),
            self.exc.load(Ordering::SeqCst),
            self.copy.load(Ordering::SeqCst),
        )
    }
}

/// A terminal tube: returns whatever it's asked to process, unmodified.
#[derive(Default)]
pub struct Leaf {
    pub counters: Counters,
}

impl Tube<String> for Leaf {
    fn process_request(&self, packet: String) -> Action<String> {
        self.counters.req.fetch_add(1, Ordering::SeqCst);
        Action::return_with(packet)
    }

    fn process_response(&self, packet: String) -> Action<String> {
        self.counters.resp.fetch_add(1, Ordering::SeqCst);
        Action::return_with(packet)
    }

    fn process_exception(&self, error: TubelineError) -> Action<String> {
        self.counters.exc.fetch_add(1, Ordering::SeqCst);
        Action::throw(error)
    }

    fn copy(&self, handle: &Arc<dyn Tube<String>>, cloner: &mut TubeCloner<String>) -> Arc<dyn Tube<String>> {
        let _ = (handle, cloner);
        self.counters.copy.fetch_add(1, Ordering::SeqCst);
        Arc::new(Leaf::default())
    }
}

/// A non-terminal tube: invokes `next` on request, then passes the response
/// straight back through. `next` is a `OnceLock` so `copy` can register this
/// tube's own copy with the cloner before recursing into the child, per
/// `Tube::copy`'s two-phase-construction contract.
pub struct Forwarder {
    pub counters: Counters,
    next: OnceLock<Arc<dyn Tube<String>>>,
}

impl Forwarder {
    pub fn new(next: Arc<dyn Tube<String>>) -> Arc<Self> {
        let cell = OnceLock::new();
        cell.set(next).ok();
        Arc::new(Self {
            counters: Counters::default(),
            next: cell,
        })
    }

    pub fn next(&self) -> Arc<dyn Tube<String>> {
        Arc::clone(self.next.get().expect("Forwarder::next used before it was set"))
    }
}

impl Tube<String> for Forwarder {
    fn process_request(&self, packet: String) -> Action<String> {
        self.counters.req.fetch_add(1, Ordering::SeqCst);
        Action::invoke(self.next(), packet)
    }

    fn process_response(&self, packet: String) -> Action<String> {
        self.counters.resp.fetch_add(1, Ordering::SeqCst);
        Action::return_with(packet)
    }

    fn process_exception(&self, error: TubelineError) -> Action<String> {
        self.counters.exc.fetch_add(1, Ordering::SeqCst);
        Action::throw(error)
    }

    fn copy(&self, handle: &Arc<dyn Tube<String>>, cloner: &mut TubeCloner<String>) -> Arc<dyn Tube<String>> {
        self.counters.copy.fetch_add(1, Ordering::SeqCst);
        let concrete = Arc::new(Forwarder {
            counters: Counters::default(),
            next: OnceLock::new(),
        });
        let erased: Arc<dyn Tube<String>> = concrete.clone();
        cloner.add(handle, Arc::clone(&erased));
        let next_copy = cloner.copy(&self.next());
        concrete
            .next
            .set(next_copy)
            .ok()
            .expect("Forwarder::copy set next twice");
        erased
    }
}

/// A tube that suspends on its first request and resumes itself from a
/// background thread shortly after, deliberately racing the scheduler's own
/// suspend bookkeeping.
#[derive(Default)]
pub struct RacingSuspender {
    pub counters: Counters,
}

impl Tube<String> for RacingSuspender {
    fn process_request(&self, packet: String) -> Action<String> {
        self.counters.req.fetch_add(1, Ordering::SeqCst);
        let fiber = tubeline_core::Fiber::<String>::current().expect("called from within a tube");
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            fiber.resume(packet);
        });
        Action::suspend()
    }

    fn process_response(&self, packet: String) -> Action<String> {
        self.counters.resp.fetch_add(1, Ordering::SeqCst);
        Action::return_with(packet)
    }

    fn process_exception(&self, error: TubelineError) -> Action<String> {
        self.counters.exc.fetch_add(1, Ordering::SeqCst);
        Action::throw(error)
    }

    fn copy(&self, handle: &Arc<dyn Tube<String>>, cloner: &mut TubeCloner<String>) -> Arc<dyn Tube<String>> {
        let _ = (handle, cloner);
        Arc::new(RacingSuspender::default())
    }
}
