//! Coverage for the ambient context save/restore around a driving pass: an
//! interceptor installs a context mid-pass, a tube observes it, and the
//! fiber's ambient context reverts once the pass returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod support;

use tubeline_core::{
    Action, AmbientContext, Engine, Fiber, FiberContextSwitchInterceptor, InterceptorOutcome,
    Tube, TubeCloner, TubelineError,
};

struct AmbientInstaller;

impl FiberContextSwitchInterceptor<String> for AmbientInstaller {
    fn around(
        &self,
        fiber: &Fiber<String>,
        _packet: Option<&String>,
        work: &mut dyn FnMut() -> InterceptorOutcome,
    ) -> InterceptorOutcome {
        fiber.set_ambient_context(AmbientContext::new(7u32));
        work()
    }
}

#[derive(Default)]
struct Recorder {
    observed_marker: AtomicBool,
}

impl Tube<String> for Recorder {
    fn process_request(&self, packet: String) -> Action<String> {
        let fiber = Fiber::<String>::current().expect("called from within a tube");
        let seen = fiber.ambient_context().downcast_ref::<u32>().copied() == Some(7);
        self.observed_marker.store(seen, Ordering::SeqCst);
        Action::return_with(packet)
    }

    fn process_response(&self, packet: String) -> Action<String> {
        Action::return_with(packet)
    }

    fn process_exception(&self, error: TubelineError) -> Action<String> {
        Action::throw(error)
    }

    fn copy(
        &self,
        _handle: &Arc<dyn Tube<String>>,
        _cloner: &mut TubeCloner<String>,
    ) -> Arc<dyn Tube<String>> {
        unimplemented!("not exercised by this suite")
    }
}

#[test]
fn ambient_context_is_restored_after_the_driving_pass() {
    support::init_tracing();

    let recorder = Arc::new(Recorder::default());
    let fiber = Engine::new("ambient-test").create_fiber::<String>();
    fiber.add_interceptor(
        Arc::new(AmbientInstaller) as Arc<dyn FiberContextSwitchInterceptor<String>>
    );

    assert!(!fiber.ambient_context().is_set());
    let result = fiber.run_sync(recorder.clone(), "hi".to_string()).unwrap();
    assert_eq!(result, "hi");

    assert!(
        recorder.observed_marker.load(Ordering::SeqCst),
        "the tube should have observed the interceptor's installed context"
    );
    assert!(
        !fiber.ambient_context().is_set(),
        "ambient context must be restored once the driving pass returns"
    );
}
