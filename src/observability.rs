//! Structured logging for scheduler boundaries.
//!
//! Uses the `tracing` crate directly rather than a hand-rolled
//! `Logger`/`TraceContext` facade — this crate targets `std`, so there's no
//! `no_std` constraint to work around. Installing a subscriber is left to
//! the host (or, in this crate's own tests, `tests/support::init_tracing`).

use tracing::{debug, trace, warn};

use crate::error::{codes, TubelineError};

/// Emits a `tracing` event for one scheduler step dispatch.
pub(crate) fn trace_step(fiber_id: u64, kind: &str) {
    trace!(fiber_id, kind, "tubeline.fiber.step");
}

/// Emits a `tracing` event when a fiber suspends.
pub(crate) fn trace_suspend(fiber_id: u64, suspended_count: i8) {
    debug!(fiber_id, suspended_count, "tubeline.fiber.suspend");
}

/// Emits a `tracing` event when a fiber resumes (including a raced resume).
pub(crate) fn trace_resume(fiber_id: u64, raced: bool) {
    debug!(fiber_id, raced, "tubeline.fiber.resume");
}

/// Emits a `tracing` event when `resume` is called on a fiber that has
/// already reached its terminal state. The resume is ignored.
pub(crate) fn trace_resume_after_completion(fiber_id: u64) {
    warn!(
        fiber_id,
        code = codes::RESUME_AFTER_COMPLETION,
        "tubeline.fiber.resume_after_completion"
    );
}

/// Emits a `tracing` event when the interceptor chain needs re-entry.
pub(crate) fn trace_interceptor_reentry(fiber_id: u64) {
    trace!(fiber_id, "tubeline.fiber.interceptor_reentry");
}

/// Emits a `tracing` event on terminal completion.
pub(crate) fn trace_completed(fiber_id: u64, error: Option<&TubelineError>) {
    match error {
        Some(err) => warn!(fiber_id, code = err.code(), message = %err, "tubeline.fiber.completed_with_error"),
        None => debug!(fiber_id, "tubeline.fiber.completed"),
    }
}
