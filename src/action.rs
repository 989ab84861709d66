//! The action protocol tubes use to direct the fiber scheduler.
//!
//! A small tagged value interpreted only by the scheduling core. `Action` is
//! a plain owned enum with no aliasing hazards — nothing reuses a single
//! mutable action object across calls.

use std::sync::Arc;

use crate::error::TubelineError;
use crate::tube::Tube;

/// What a tube wants the scheduler to do next.
pub enum Action<P> {
    /// Call `next.process_request(packet)`, then resume this tube's
    /// `process_response` once that returns.
    Invoke {
        next: Arc<dyn Tube<P>>,
        packet: P,
    },
    /// Call `next.process_request(packet)`; the caller does not want the
    /// response delivered back to it. No continuation is pushed, so this
    /// tube will also never see `process_exception` for anything the callee
    /// throws.
    InvokeAndForget {
        next: Arc<dyn Tube<P>>,
        packet: P,
    },
    /// Flip direction and begin response processing with this packet.
    Return(P),
    /// Flip direction and begin exception processing with this error.
    Throw(TubelineError),
    /// Park the fiber until externally resumed.
    Suspend,
}

impl<P> Action<P> {
    pub fn invoke(next: Arc<dyn Tube<P>>, packet: P) -> Self {
        Action::Invoke { next, packet }
    }

    pub fn invoke_and_forget(next: Arc<dyn Tube<P>>, packet: P) -> Self {
        Action::InvokeAndForget { next, packet }
    }

    pub fn return_with(packet: P) -> Self {
        Action::Return(packet)
    }

    pub fn throw(error: TubelineError) -> Self {
        Action::Throw(error)
    }

    pub fn suspend() -> Self {
        Action::Suspend
    }
}
