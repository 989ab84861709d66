//! A cooperative, continuation-based scheduler for chains of message-processing
//! stages ("tubes").
//!
//! A [`tube::Tube`] consumes a packet and returns an [`action::Action`]
//! telling the scheduler what to do next: invoke another tube, flip direction
//! and return a value, flip direction and raise an error, or suspend until
//! externally resumed. A [`fiber::Fiber`] drives one packet through a chain of
//! tubes by repeatedly dispatching to whichever tube is due next, maintaining
//! a LIFO stack of tubes awaiting a response so that processing can unwind
//! back through them in reverse order.
//!
//! Tubelines may be graphs rather than simple chains — including cyclic ones
//! — so duplicating one for concurrent use goes through [`cloner::TubeCloner`],
//! which preserves both cycles and shared sub-structure.

pub mod action;
pub mod cloner;
pub mod configuration;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fiber;
pub mod interceptor;
mod observability;
pub mod tube;

pub use action::Action;
pub use cloner::TubeCloner;
pub use configuration::Configuration;
pub use context::AmbientContext;
pub use engine::Engine;
pub use error::TubelineError;
pub use executor::{Executor, FixedThreadPool, Runnable};
pub use fiber::{CompletionCallback, Fiber};
pub use interceptor::{FiberContextSwitchInterceptor, InterceptorOutcome};
pub use tube::Tube;
