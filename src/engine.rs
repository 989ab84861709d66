//! The fiber factory: owns the executor fibers are submitted to.
//!
//! A small named-instance owner that lazily builds a default collaborator
//! (here, [`crate::executor::FixedThreadPool`]) unless the host supplies its
//! own.

use std::sync::Arc;

use crate::executor::{default_executor, Executor};
use crate::fiber::Fiber;

/// Creates fibers that all share one executor.
///
/// An `Engine` is deliberately thin: it holds no tubeline state of its own
/// and is safe to share across threads via `Arc<Engine>` (or simply cloned,
/// since it wraps an `Arc<dyn Executor>` internally).
pub struct Engine {
    id: String,
    executor: Arc<dyn Executor>,
}

impl Engine {
    /// Creates an engine named `id` backed by the crate's default
    /// [`crate::executor::FixedThreadPool`], sized from
    /// [`crate::configuration::Configuration::default_pool_size`].
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_executor(id, default_executor())
    }

    /// Creates an engine named `id` backed by a host-supplied executor.
    pub fn with_executor(id: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        Self {
            id: id.into(),
            executor,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Replaces this engine's executor. Fibers already created against the
    /// old executor keep using it; only subsequent `create_fiber` calls see
    /// the replacement.
    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.executor = executor;
    }

    /// Creates a fresh, suspended fiber bound to this engine's executor.
    ///
    /// `P: Clone` because a fiber's driving pass snapshots its in-flight
    /// packet to hand to interceptors without holding its lock across their
    /// callbacks (see `Fiber`'s module documentation).
    pub fn create_fiber<P: Send + Clone + 'static>(&self) -> Arc<Fiber<P>> {
        Fiber::new(Arc::clone(&self.executor))
    }
}
