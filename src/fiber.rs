//! The cooperative execution core: the fiber and its scheduling loop.
//!
//! A mutable-state owner guarded by a single lock, with atomic/epoch
//! bookkeeping for the hot suspend/resume path, and completion-callback /
//! executor-resubmission conventions familiar from task-handle designs. The
//! step dispatch, the LIFO continuation discipline, and the −1/0/1 suspend
//! counter are the core continuation-passing scheduling algorithm this crate
//! exists to implement.
//!
//! Packets must be cheaply `Clone`: a driving pass snapshots the in-flight
//! packet to hand to interceptors without holding the fiber's lock across
//! their callbacks.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::context::AmbientContext;
use crate::error::{codes, TubelineError};
use crate::executor::Executor;
use crate::interceptor::{run_chain, FiberContextSwitchInterceptor, InterceptorOutcome};
use crate::observability;
use crate::tube::Tube;
use crate::{action::Action, configuration::Configuration};

/// Invoked exactly once when a fiber terminates, with the final packet or
/// the unconverted error.
pub type CompletionCallback<P> = Box<dyn FnOnce(Result<P, TubelineError>) + Send>;

static NEXT_FIBER_ID: AtomicU64 = AtomicU64::new(1);

/// The direction a step is driven in, and therefore which tube method to call.
enum StepOutcome {
    /// The step ran to completion; keep looping within the current
    /// interceptor wrapping.
    Continue,
    /// An interceptor-list mutation during the step requires exiting and
    /// re-entering the interceptor chain before the next step.
    NeedsReenter,
    /// The fiber parked; the driving pass should return.
    Suspended,
    /// The continuation stack and `next` are both empty; the fiber is done.
    Completed,
}

/// Everything about a fiber that is mutated either by the unique driving
/// thread or, for a handful of fields, by `resume`/`add_interceptor` from any
/// thread — all behind the fiber's own monitor.
struct Inner<P> {
    next: Option<Arc<dyn Tube<P>>>,
    continuations: Vec<Arc<dyn Tube<P>>>,
    packet: Option<P>,
    error: Option<TubelineError>,
    /// The resume/suspend race counter. Stays in {-1, 0, 1} at every
    /// observation point between steps.
    suspended_count: i8,
    completed: bool,
    synchronous: bool,
    started: bool,
    interrupted: bool,
    ambient_context: AmbientContext,
    interceptors: Vec<Arc<dyn FiberContextSwitchInterceptor<P>>>,
    needs_to_reenter: bool,
    completion_callback: Option<CompletionCallback<P>>,
}

impl<P> Inner<P> {
    fn fresh() -> Self {
        Self {
            next: None,
            continuations: Vec::new(),
            packet: None,
            error: None,
            suspended_count: 0,
            completed: false,
            synchronous: false,
            started: false,
            interrupted: false,
            ambient_context: AmbientContext::none(),
            interceptors: Vec::new(),
            needs_to_reenter: false,
            completion_callback: None,
        }
    }

    fn is_terminal_state(&self) -> bool {
        self.next.is_none() && self.continuations.is_empty()
    }
}

/// Saved mutable fields, used to isolate a re-entrant `run_sync` call on the
/// same fiber from the outer activation that's driving it: a re-entrant
/// synchronous run from within a tube must not disturb the outer fiber's
/// continuations.
struct NestedSnapshot<P> {
    next: Option<Arc<dyn Tube<P>>>,
    continuations: Vec<Arc<dyn Tube<P>>>,
    packet: Option<P>,
    error: Option<TubelineError>,
    synchronous: bool,
}

/// A cooperative task driving one request/response through a tubeline.
///
/// A `Fiber` is created suspended via [`crate::engine::Engine::create_fiber`]
/// and becomes runnable via [`Fiber::start`] or [`Fiber::run_sync`]. It
/// executes tubes one at a time, interpreting each returned [`Action`] to
/// decide what to call next, until the continuation stack and pending `next`
/// tube are both empty.
pub struct Fiber<P> {
    id: u64,
    executor: Arc<dyn Executor>,
    state: Mutex<Inner<P>>,
    condvar: Condvar,
}

thread_local! {
    static CURRENT: RefCell<Vec<Box<dyn Any>>> = RefCell::new(Vec::new());
}

/// Restores a fiber's ambient context to its pre-pass value on every exit
/// from [`Fiber::drive_pass`], including an early return or a tube panic
/// unwinding past it.
struct AmbientContextGuard<'a, P> {
    fiber: &'a Fiber<P>,
    saved: AmbientContext,
}

impl<'a, P> Drop for AmbientContextGuard<'a, P> {
    fn drop(&mut self) {
        self.fiber.state.lock().ambient_context = self.saved.clone();
    }
}

impl<P: Send + Clone + 'static> Fiber<P> {
    pub(crate) fn new(executor: Arc<dyn Executor>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_FIBER_ID.fetch_add(1, Ordering::Relaxed),
            executor,
            state: Mutex::new(Inner::fresh()),
            condvar: Condvar::new(),
        })
    }

    /// A stable identifier for observability purposes; not part of any
    /// cross-process protocol.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Starts driving `tubeline` with `request` on the engine's executor.
    /// `callback` fires exactly once when the fiber terminates.
    pub fn start(
        self: &Arc<Self>,
        tubeline: Arc<dyn Tube<P>>,
        request: P,
        callback: CompletionCallback<P>,
    ) {
        {
            let mut state = self.state.lock();
            state.next = Some(tubeline);
            state.packet = Some(request);
            state.started = true;
            state.synchronous = false;
            state.completion_callback = Some(callback);
        }
        self.submit_drive();
    }

    /// Drives `tubeline` with `request` on the calling thread to completion,
    /// blocking across any suspensions. Re-raises the unconverted error, if
    /// any, as `Err`.
    pub fn run_sync(self: &Arc<Self>, tubeline: Arc<dyn Tube<P>>, request: P) -> Result<P, TubelineError> {
        let snapshot = {
            let mut state = self.state.lock();
            if state.started {
                return Err(TubelineError::new(
                    codes::ALREADY_STARTED,
                    "fiber already started asynchronously; a synchronous and \
                     asynchronous activation cannot share one fiber",
                ));
            }
            let snapshot = NestedSnapshot {
                next: state.next.take(),
                continuations: std::mem::take(&mut state.continuations),
                packet: state.packet.take(),
                error: state.error.take(),
                synchronous: state.synchronous,
            };
            state.next = Some(tubeline);
            state.packet = Some(request);
            state.synchronous = true;
            snapshot
        };

        Self::push_current(self);
        let result = self.drive_synchronously();
        Self::pop_current();

        let mut state = self.state.lock();
        let interrupted = state.interrupted;
        state.interrupted = false;
        state.next = snapshot.next;
        state.continuations = snapshot.continuations;
        state.packet = snapshot.packet;
        state.error = snapshot.error;
        state.synchronous = snapshot.synchronous;
        drop(state);

        self.completion_check();
        if interrupted {
            // Captured during a wait, never acted on; re-raised here rather
            // than cancelling the fiber.
            tracing::warn!(fiber_id = self.id, "tubeline.fiber.interrupt_reraised");
        }
        result
    }

    /// Delivers a return packet to a suspended fiber in a race-free way.
    pub fn resume(self: &Arc<Self>, response: P) {
        let (resubmit, synchronous) = {
            let mut state = self.state.lock();
            if state.completed {
                observability::trace_resume_after_completion(self.id);
                return;
            }
            state.packet = Some(response);
            state.suspended_count -= 1;
            let reached_zero = state.suspended_count == 0;
            observability::trace_resume(self.id, state.suspended_count < -1);
            (reached_zero, state.synchronous)
        };
        if !resubmit {
            return;
        }
        if synchronous {
            self.condvar.notify_all();
        } else {
            self.submit_drive();
        }
    }

    /// Records a cooperative interrupt request against a fiber currently
    /// blocked in [`Fiber::run_sync`]'s wait. Rust has no portable
    /// thread-interrupt primitive, so this stands in for the OS-level
    /// `Thread.interrupt()` a synchronous caller would otherwise issue: it
    /// does not cancel the fiber or unblock the wait early, it only
    /// causes the interruption to be remembered and re-raised on the
    /// driving thread once the call returns.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        drop(state);
        self.condvar.notify_all();
    }

    /// Adds an interceptor to the end of the chain. Takes effect at the next
    /// tube boundary.
    pub fn add_interceptor(&self, interceptor: Arc<dyn FiberContextSwitchInterceptor<P>>) {
        let mut state = self.state.lock();
        state.interceptors.push(interceptor);
        state.needs_to_reenter = true;
    }

    /// Removes the first interceptor for which `Arc::ptr_eq` holds. Returns
    /// whether one was found.
    pub fn remove_interceptor(&self, interceptor: &Arc<dyn FiberContextSwitchInterceptor<P>>) -> bool {
        let mut state = self.state.lock();
        let position = state
            .interceptors
            .iter()
            .position(|existing| Arc::ptr_eq(existing, interceptor));
        match position {
            Some(index) => {
                state.interceptors.remove(index);
                state.needs_to_reenter = true;
                true
            }
            None => false,
        }
    }

    /// Whether the fiber has not yet reached its terminal state.
    pub fn is_alive(&self) -> bool {
        !self.state.lock().completed
    }

    /// The current in-flight packet, if any.
    pub fn packet(&self) -> Option<P> {
        self.state.lock().packet.clone()
    }

    pub fn ambient_context(&self) -> AmbientContext {
        self.state.lock().ambient_context.clone()
    }

    pub fn set_ambient_context(&self, context: AmbientContext) {
        self.state.lock().ambient_context = context;
    }

    /// The fiber driving the calling thread's current tube invocation, if
    /// any. Valid only from within a tube method.
    pub fn current() -> Option<Arc<Fiber<P>>> {
        CURRENT.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|boxed| boxed.downcast_ref::<Arc<Fiber<P>>>())
                .cloned()
        })
    }

    /// Whether the fiber driving the calling thread's current tube
    /// invocation is being driven synchronously.
    pub fn is_synchronous() -> bool {
        Self::current()
            .map(|fiber| fiber.state.lock().synchronous)
            .unwrap_or(false)
    }

    fn push_current(self_arc: &Arc<Self>) {
        CURRENT.with(|stack| stack.borrow_mut().push(Box::new(Arc::clone(self_arc))));
    }

    fn pop_current() {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }

    fn submit_drive(self: &Arc<Self>) {
        let fiber = Arc::clone(self);
        self.executor.execute(Box::new(move || {
            Self::push_current(&fiber);
            fiber.drive_asynchronously();
            Self::pop_current();
        }));
    }

    /// One asynchronous driving pass: runs until suspended or completed,
    /// then performs the completion check.
    fn drive_asynchronously(self: &Arc<Self>) {
        let _serialize_guard = Self::acquire_serialization_lock();
        self.drive_pass();
        self.completion_check();
    }

    /// Drives synchronously, parking the calling thread on the condvar
    /// across suspensions, until the nested activation reaches its terminal
    /// state.
    fn drive_synchronously(self: &Arc<Self>) -> Result<P, TubelineError> {
        loop {
            {
                let _serialize_guard = Self::acquire_serialization_lock();
                self.drive_pass();
            }
            let mut state = self.state.lock();
            while state.suspended_count == 1 {
                observability::trace_suspend(self.id, state.suspended_count);
                self.condvar.wait(&mut state);
            }
            if state.is_terminal_state() {
                let result = match state.error.take() {
                    Some(error) => Err(error),
                    None => Ok(state.packet.take().expect(
                        "a fiber reaching its terminal state without an error must have a packet",
                    )),
                };
                return result;
            }
            // Not terminal and not suspended: a raced resume landed while we
            // were between driving passes. Loop around and keep driving.
        }
    }

    /// Runs the interceptor-wrapped step loop until the fiber suspends or
    /// completes, re-entering the interceptor chain whenever it was mutated
    /// mid-pass.
    fn drive_pass(self: &Arc<Self>) {
        let _ambient_guard = AmbientContextGuard {
            fiber: self,
            saved: self.state.lock().ambient_context.clone(),
        };
        loop {
            let (chain, packet_snapshot) = {
                let mut state = self.state.lock();
                state.needs_to_reenter = false;
                (state.interceptors.clone(), state.packet.clone())
            };
            let mut blocked = false;
            run_chain(&chain, self, packet_snapshot.as_ref(), &mut || loop {
                match self.run_one_step() {
                    StepOutcome::Continue => continue,
                    StepOutcome::NeedsReenter => return InterceptorOutcome::Continue,
                    StepOutcome::Suspended | StepOutcome::Completed => {
                        blocked = true;
                        return InterceptorOutcome::Continue;
                    }
                }
            });
            if blocked {
                return;
            }
            observability::trace_interceptor_reentry(self.id);
            // fall through: rebuild the chain from the now-current
            // interceptor list and keep driving.
        }
    }

    /// Executes exactly one tube call and interprets its action.
    fn run_one_step(self: &Arc<Self>) -> StepOutcome {
        enum Dispatch<P> {
            Request(Arc<dyn Tube<P>>, P),
            Response(Arc<dyn Tube<P>>, P),
            Exception(Arc<dyn Tube<P>>, TubelineError),
        }

        let dispatch = {
            let mut state = self.state.lock();
            if let Some(error) = state.error.take() {
                match state.continuations.pop() {
                    Some(last) => Dispatch::Exception(last, error),
                    None => {
                        state.error = Some(error);
                        return StepOutcome::Completed;
                    }
                }
            } else if let Some(next) = state.next.take() {
                let packet = state
                    .packet
                    .take()
                    .expect("next tube set without a packet to pass it");
                Dispatch::Request(next, packet)
            } else {
                match state.continuations.pop() {
                    Some(last) => {
                        let packet = state
                            .packet
                            .take()
                            .expect("response dispatch without a packet");
                        Dispatch::Response(last, packet)
                    }
                    None => return StepOutcome::Completed,
                }
            }
        };

        let step_kind = match &dispatch {
            Dispatch::Request(..) => "request",
            Dispatch::Response(..) => "response",
            Dispatch::Exception(..) => "exception",
        };
        observability::trace_step(self.id, step_kind);

        let (last, action) = match dispatch {
            Dispatch::Request(tube, packet) => {
                let action = call_guarded(|| tube.process_request(packet));
                (tube, action)
            }
            Dispatch::Response(tube, packet) => {
                let action = call_guarded(|| tube.process_response(packet));
                (tube, action)
            }
            Dispatch::Exception(tube, error) => {
                let action = call_guarded(|| tube.process_exception(error));
                (tube, action)
            }
        };

        let mut state = self.state.lock();
        match action {
            Action::Invoke { next, packet } => {
                state.continuations.push(last);
                state.next = Some(next);
                state.packet = Some(packet);
            }
            Action::InvokeAndForget { next, packet } => {
                state.next = Some(next);
                state.packet = Some(packet);
            }
            Action::Return(packet) => {
                state.next = None;
                state.packet = Some(packet);
                state.error = None;
            }
            Action::Throw(error) => {
                state.next = None;
                state.packet = None;
                state.error = Some(error);
            }
            Action::Suspend => {
                state.continuations.push(last);
                state.next = None;
                state.suspended_count += 1;
                let count = state.suspended_count;
                observability::trace_suspend(self.id, count);
                if count == 1 {
                    return StepOutcome::Suspended;
                }
                // Raced resume already brought the count back to zero before
                // this SUSPEND was processed; fall through and keep driving.
                return StepOutcome::Continue;
            }
        }
        if state.needs_to_reenter {
            return StepOutcome::NeedsReenter;
        }
        if state.is_terminal_state() {
            return StepOutcome::Completed;
        }
        StepOutcome::Continue
    }

    /// Marks the fiber completed and fires its completion callback exactly
    /// once, when reached from a top-level (non-nested) activation.
    fn completion_check(self: &Arc<Self>) {
        let (callback, result) = {
            let mut state = self.state.lock();
            if state.completed || !state.is_terminal_state() {
                return;
            }
            state.completed = true;
            let result = match state.error.take() {
                Some(error) => Err(error),
                None => match state.packet.take() {
                    Some(packet) => Ok(packet),
                    None => return,
                },
            };
            (state.completion_callback.take(), result)
        };
        self.condvar.notify_all();
        match (&result, callback.is_some()) {
            (Ok(_), _) => observability::trace_completed(self.id, None),
            (Err(error), _) => observability::trace_completed(self.id, Some(error)),
        }
        if let Some(callback) = callback {
            callback(result);
        }
    }

    fn acquire_serialization_lock() -> Option<parking_lot::MutexGuard<'static, ()>> {
        if Configuration::global().serialize_execution() {
            Some(crate::configuration::serialization_lock().lock())
        } else {
            None
        }
    }
}

fn call_guarded<P>(f: impl FnOnce() -> Action<P>) -> Action<P> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(action) => action,
        Err(payload) => Action::Throw(TubelineError::from_panic_payload(payload)),
    }
}
