//! Reactive Context
//!
//! The runtime keeps two context slots: the node currently pulling (reads
//! made while it is set become dependencies of that node) and the scope
//! currently collecting new nodes.
//!
//! # Implementation
//!
//! Both slots are plain `Cell`s on the runtime. Entering a context swaps
//! the new value in and returns a guard holding the old one; dropping the
//! guard swaps it back. Guards drop on every exit path, unwinding included,
//! so a panicking closure cannot leave a stale subscriber behind.
//!
//! Nesting falls out of the swap: a memo read inside an effect enters its
//! own pulling context and restores the effect's when it returns.

use crate::graph::{NodeId, ScopeId};

use super::runtime::RuntimeInner;

/// Restores the pulling slot when dropped.
pub(crate) struct PullGuard<'a> {
    runtime: &'a RuntimeInner,
    prev: Option<NodeId>,
}

impl<'a> PullGuard<'a> {
    /// Make `node` the pulling node. `None` suspends tracking.
    pub(crate) fn enter(runtime: &'a RuntimeInner, node: Option<NodeId>) -> Self {
        let prev = runtime.pulling.replace(node);
        Self { runtime, prev }
    }
}

impl Drop for PullGuard<'_> {
    fn drop(&mut self) {
        self.runtime.pulling.set(self.prev);
    }
}

/// Restores the current-scope slot when dropped.
pub(crate) struct ScopeGuard<'a> {
    runtime: &'a RuntimeInner,
    prev: ScopeId,
}

impl<'a> ScopeGuard<'a> {
    pub(crate) fn enter(runtime: &'a RuntimeInner, scope: ScopeId) -> Self {
        let prev = runtime.current_scope.replace(scope);
        Self { runtime, prev }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.runtime.current_scope.set(self.prev);
    }
}

/// Keeps a batch open until dropped.
///
/// Only the depth is restored here. Flushing what the batch collected runs
/// user code, so it happens on the normal return path in
/// [`Runtime::batch`](crate::Runtime::batch), never during unwinding.
pub(crate) struct BatchGuard<'a> {
    runtime: &'a RuntimeInner,
}

impl<'a> BatchGuard<'a> {
    pub(crate) fn enter(runtime: &'a RuntimeInner) -> Self {
        runtime.batch_depth.set(runtime.batch_depth.get() + 1);
        Self { runtime }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let depth = self.runtime.batch_depth.get();
        self.runtime.batch_depth.set(depth.saturating_sub(1));
    }
}
