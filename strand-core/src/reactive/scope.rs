//! Public handle over an ownership scope.

use std::fmt;
use std::rc::Weak;

use crate::graph::ScopeId;

use super::runtime::{Runtime, RuntimeInner};

/// An ownership group of cells, released together.
///
/// ```rust
/// use strand_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// let scope = rt.create_scope();
/// let effect = scope.run(|| {
///     let count = count.clone();
///     rt.effect(move || {
///         count.get();
///     })
/// });
///
/// assert_eq!(scope.len(), 1);
/// scope.release();
/// assert!(effect.is_disposed());
/// assert!(count.dependents().is_empty());
/// ```
#[derive(Clone)]
pub struct Scope {
    id: ScopeId,
    runtime: Weak<RuntimeInner>,
}

impl Scope {
    /// A new scope nested under the runtime's current scope.
    pub fn new(runtime: &Runtime) -> Self {
        Self::from_parts(runtime.inner().create_scope(), runtime.downgrade())
    }

    pub(crate) fn from_parts(id: ScopeId, runtime: Weak<RuntimeInner>) -> Self {
        Self { id, runtime }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Run `f` with this scope current: every cell created inside belongs
    /// to it.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.runtime.upgrade() {
            Some(runtime) if runtime.graph.borrow().scope(self.id).is_some() => {
                runtime.with_scope(self.id, f)
            }
            _ => f(),
        }
    }

    /// Dispose every member and child scope. Returns how many nodes went.
    /// The scope stays usable afterwards.
    pub fn release(&self) -> usize {
        self.runtime
            .upgrade()
            .map_or(0, |runtime| runtime.release_scope(self.id))
    }

    /// Members plus child scopes.
    pub fn len(&self) -> usize {
        self.runtime.upgrade().map_or(0, |runtime| {
            runtime.graph.borrow().scope(self.id).map_or(0, |scope| scope.len())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_land_in_current_scope() {
        let rt = Runtime::new();
        let scope = rt.create_scope();
        assert!(scope.is_empty());

        let signal = scope.run(|| rt.signal(1));
        assert_eq!(scope.len(), 1);
        assert_eq!(rt.inner().current_scope(), rt.root_scope().id());

        scope.release();
        assert!(signal.is_disposed());
        assert!(scope.is_empty());
    }

    #[test]
    fn nested_scope_is_released_with_parent() {
        let rt = Runtime::new();
        let outer = rt.create_scope();
        let (inner, memo) = outer.run(|| {
            let inner = rt.create_scope();
            let memo = inner.run(|| rt.memo(|| 3));
            (inner, memo)
        });
        assert_eq!(memo.get(), 3);

        assert_eq!(outer.release(), 1);
        assert!(memo.is_disposed());
        // The child scope itself is gone; running in it falls back.
        let later = inner.run(|| rt.signal(0));
        assert!(!later.is_disposed());
        assert_eq!(inner.len(), 0);
    }

    #[test]
    fn releasing_root_disposes_everything() {
        let rt = Runtime::new();
        let a = rt.signal(1);
        let a2 = a.clone();
        let effect = rt.effect(move || {
            a2.get();
        });
        assert_eq!(rt.root_scope().release(), 2);
        assert!(effect.is_disposed());
        assert_eq!(rt.node_count(), 0);
    }
}
