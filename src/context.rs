//! The generalized "context class loader" ambient slot.
//!
//! A single opaque, `Arc`-shared value the driving thread installs on entry
//! to a step and restores on every exit path. What that value *is* (a
//! classloader, a security context, a transaction handle) is left to the
//! host; interceptors are the extension point that acts on it.

use std::sync::Arc;

/// An ambient value installed around a fiber's driving pass.
///
/// Cloning an `AmbientContext` is cheap (it clones an `Arc`): fibers and
/// interceptors pass contexts by value freely without worrying about
/// deep-copy cost.
#[derive(Clone)]
pub struct AmbientContext {
    inner: Option<Arc<dyn std::any::Any + Send + Sync>>,
}

impl AmbientContext {
    /// The empty ambient context, installed on a fiber until something sets one.
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// Wraps an arbitrary ambient value (a classloader handle, a security
    /// context, a transaction token, ...).
    pub fn new(value: impl std::any::Any + Send + Sync + 'static) -> Self {
        Self {
            inner: Some(Arc::new(value)),
        }
    }

    /// Attempts to downcast the ambient value to a concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.as_deref().and_then(|v| v.downcast_ref::<T>())
    }

    pub fn is_set(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for AmbientContext {
    fn default() -> Self {
        Self::none()
    }
}
