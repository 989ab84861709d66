//! Interceptor chain wrapping each fiber driving pass.
//!
//! An ordered list of wrappers, each given an opaque continuation to invoke
//! exactly once, composed around the "install ambient state / restore it"
//! shape this scheduler needs.

use crate::fiber::Fiber;

/// What a driving pass produced, threaded back out through the interceptor
/// chain untouched. Interceptors observe this only to decide cleanup, never
/// to alter it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterceptorOutcome {
    /// The pass ran a step (or more) and the fiber is still runnable,
    /// suspended, or completed — the chain should simply unwind.
    Continue,
}

/// A wrapper around a fiber's driving pass.
///
/// Implementations receive an opaque `work` closure representing "run the
/// next interceptor, or the raw driving call if this is the innermost one."
/// They must invoke `work` exactly once, typically from within a scoped
/// resource acquisition (a privileged context, a transaction boundary).
///
/// # Contract
/// - `work` must be called exactly once per `around` invocation.
/// - Any ambient state installed before calling `work` must be restored
///   after it returns, on every exit path (including if `work` panics —
///   use a guard/`Drop` type for cleanup rather than code after the call).
pub trait FiberContextSwitchInterceptor<P>: Send + Sync {
    /// Wrap one driving pass.
    ///
    /// `packet` is the in-flight packet as of entry to this pass (a snapshot,
    /// not a live view of every step taken while `work` runs).
    fn around(
        &self,
        fiber: &Fiber<P>,
        packet: Option<&P>,
        work: &mut dyn FnMut() -> InterceptorOutcome,
    ) -> InterceptorOutcome;
}

/// Runs `innermost` wrapped by `chain`, interceptor 0 outermost.
///
/// Builds the chain so interceptor 0 wraps interceptor 1 wraps … wraps the
/// raw driving call.
pub(crate) fn run_chain<P>(
    chain: &[std::sync::Arc<dyn FiberContextSwitchInterceptor<P>>],
    fiber: &Fiber<P>,
    packet: Option<&P>,
    innermost: &mut dyn FnMut() -> InterceptorOutcome,
) -> InterceptorOutcome {
    match chain.split_first() {
        None => innermost(),
        Some((head, rest)) => {
            let mut continuation = || run_chain(rest, fiber, packet, innermost);
            head.around(fiber, packet, &mut continuation)
        }
    }
}
