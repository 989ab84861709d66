//! Unified causal error type for the scheduler.
//!
//! A stable code, a human message, and an optional boxed cause, derived via
//! `thiserror::Error` rather than hand-written `Display`/`Error` impls.

use thiserror::Error;

/// A programmatic error produced by a tube, delivered to the scheduler via a
/// `Throw` action or by unwinding out of a tube method.
#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct TubelineError {
    code: &'static str,
    message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl TubelineError {
    /// Creates a new error with a stable code and a human-readable message.
    ///
    /// `code` should follow the `domain.reason` convention used by the
    /// constants in [`codes`].
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches an underlying cause, forming an error chain.
    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Converts a caught panic payload into a `TubelineError`.
    ///
    /// Payloads are typically `&'static str` or `String`; anything else is
    /// reported with an opaque message rather than lost.
    pub fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "tube panicked with a non-string payload".to_string()
        };
        Self::new(codes::TUBE_PANIC, message)
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

/// Stable error codes.
pub mod codes {
    /// A tube unwound via Rust panic instead of returning a `Throw` action.
    pub const TUBE_PANIC: &str = "tubeline.tube_panic";
    /// A fiber was resumed after it had already completed.
    pub const RESUME_AFTER_COMPLETION: &str = "tubeline.resume_after_completion";
    /// `run_sync` was called on a fiber that had already been started asynchronously.
    pub const ALREADY_STARTED: &str = "tubeline.already_started";
}
