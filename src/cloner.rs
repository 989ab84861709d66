//! The isomorphism-preserving cloner for tubelines.
//!
//! Tubelines may be cyclic, so a naive recursive copy would not terminate.
//! The fix is a pointer-identity-keyed map, the same technique copy-on-write
//! snapshot structures use: a tube registers its own copy with the cloner
//! *before* recursing into the tubes it owns.

use std::collections::HashMap;
use std::sync::Arc;

use crate::tube::Tube;

/// A one-shot graph isomorphism map used when duplicating a tubeline.
///
/// One instance is created per top-level [`TubeCloner::clone_tubeline`] call
/// and discarded once that call returns; it has no life beyond that single
/// cloning episode.
pub struct TubeCloner<P> {
    copies: HashMap<usize, Arc<dyn Tube<P>>>,
}

impl<P> TubeCloner<P> {
    fn new() -> Self {
        Self {
            copies: HashMap::new(),
        }
    }

    /// Entry point: clones a whole tubeline reachable from `root`.
    ///
    /// Creates a fresh mapping and recurses from `root`; shared sub-tubes
    /// reachable from multiple paths are copied exactly once, and cycles do
    /// not cause unbounded recursion.
    pub fn clone_tubeline(root: &Arc<dyn Tube<P>>) -> Arc<dyn Tube<P>> {
        let mut cloner = Self::new();
        cloner.copy(root)
    }

    /// Returns the copy of `original`, creating it (and registering it) if
    /// this is the first time this cloner has seen it.
    pub fn copy(&mut self, original: &Arc<dyn Tube<P>>) -> Arc<dyn Tube<P>> {
        let key = identity_key(original);
        if let Some(existing) = self.copies.get(&key) {
            return Arc::clone(existing);
        }
        let copy = original.copy(original, self);
        if let Some(registered) = self.copies.get(&key) {
            debug_assert!(
                Arc::ptr_eq(registered, &copy),
                "Tube::copy() registered a different copy than the one it returned",
            );
        } else {
            // Leaf tube: never called `add`, which is fine as long as it has
            // no owned tube references to recurse into (and therefore no
            // cycle through it to break).
            self.copies.insert(key, Arc::clone(&copy));
        }
        copy
    }

    /// Registers `copy` as the image of `original` under this cloner.
    ///
    /// Must be called by a [`Tube::copy`] implementation before it recurses
    /// into any tube references it owns. Panics if `original` has already
    /// been registered — that would mean the same tube tried to run its own
    /// `copy()` twice within one cloning episode, which indicates a cloner
    /// implementation bug (a forgotten early return) rather than a
    /// recoverable condition.
    pub fn add(&mut self, original: &Arc<dyn Tube<P>>, copy: Arc<dyn Tube<P>>) {
        let key = identity_key(original);
        assert!(
            self.copies.insert(key, copy).is_none(),
            "tube already registered with this TubeCloner episode"
        );
    }
}

fn identity_key<P>(tube: &Arc<dyn Tube<P>>) -> usize {
    Arc::as_ptr(tube) as *const () as usize
}
