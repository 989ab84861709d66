//! The tube contract — the stage interface external collaborators implement.
//!
//! A single trait with request/response/exception methods rather than a
//! split inbound/outbound handler pair. Concrete tubes are external
//! collaborators — this crate only defines the contract.

use std::sync::Arc;

use crate::cloner::TubeCloner;
use crate::{action::Action, error::TubelineError};

/// A stage in a tubeline.
///
/// Implementations must be non-reentrant on a single instance: at most one
/// fiber may be executing within a given tube instance at a time. They need
/// not be thread-safe across distinct instances — concurrent use of the same
/// logical tubeline requires cloning it first via [`TubeCloner`].
///
/// All three processing methods are expected to be infallible at the
/// interface level: a failure is reported by returning [`Action::Throw`], not
/// by propagating a `Result::Err` or (other than as a last resort) panicking.
pub trait Tube<P>: Send + Sync {
    /// Consume the forward packet; produce an action.
    fn process_request(&self, packet: P) -> Action<P>;

    /// Consume the return packet; produce an action.
    ///
    /// Called on tubes that previously returned [`Action::Invoke`], in LIFO
    /// order relative to their `process_request` calls.
    fn process_response(&self, packet: P) -> Action<P>;

    /// Consume the current error; produce an action.
    ///
    /// Typically `Throw` to continue unwinding, or `Return`/`Invoke` to
    /// convert the error into a normal value and resume forward processing.
    fn process_exception(&self, error: TubelineError) -> Action<P>;

    /// Called once on one copy of the tubeline when it is being retired.
    fn pre_destroy(&self) {}

    /// Produce an isomorphic deep copy of this tube.
    ///
    /// `handle` is the same tube `self` is the body of, erased to
    /// `Arc<dyn Tube<P>>` — the cloner always calls `handle.copy(handle,
    /// cloner)`. Implementations that own references to other tubes must
    /// call [`TubeCloner::add`] with `handle` and their own freshly allocated
    /// copy *before* recursing into [`TubeCloner::copy`] on those references;
    /// this is what lets the cloner break cycles and preserve shared
    /// subgraphs. Leaf tubes with no owned tube
    /// references may construct a plain copy of themselves and return it
    /// without touching the cloner at all.
    fn copy(&self, handle: &Arc<dyn Tube<P>>, cloner: &mut TubeCloner<P>) -> Arc<dyn Tube<P>>;
}
