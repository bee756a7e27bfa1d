//! Deep Reactive Collections
//!
//! Collections that sit on top of the graph and make individual entries
//! reactive without wrapping every element by hand.
//!
//! # Model
//!
//! - The plain structure (`Vec` or `IndexMap`) is kept as the source of
//!   truth, so it can always be inspected without touching the graph.
//! - One cell per entry is created lazily, the first time that entry is
//!   read. A write to an entry only wakes readers of that entry.
//! - One extra `shape` cell per collection is bumped by every structural
//!   change (insertion, removal, reordering). Reads that depend on the
//!   structure as a whole (length, iteration, search) also read `shape`.
//!
//! Entry cells belong to the scope that was current when the collection
//! was built, not to whichever effect happened to read them first.
//!
//! Every mutation runs inside a runtime batch, so one structural change
//! produces one flush no matter how many entry cells it touches.

mod map;
mod vec;

pub use map::ReactiveMap;
pub use vec::ReactiveVec;

use std::rc::{Rc, Weak};

use crate::graph::ScopeId;
use crate::reactive::{Runtime, RuntimeInner, Signal};

/// State shared by both collection kinds.
struct Shape {
    runtime: Weak<RuntimeInner>,
    scope: ScopeId,
    shape: Signal<u64>,
}

impl Shape {
    fn new(runtime: &Runtime) -> Self {
        let shape = runtime.signal(0);
        Self {
            runtime: runtime.downgrade(),
            scope: runtime.inner().current_scope(),
            shape,
        }
    }

    fn runtime(&self) -> Option<Rc<RuntimeInner>> {
        self.runtime.upgrade()
    }

    /// Create an entry cell in the collection's scope.
    fn cell<T: 'static>(&self, value: T) -> Option<Signal<T>> {
        let runtime = self.runtime()?;
        Some(Signal::new_in(&runtime, self.scope, value))
    }

    /// Depend on the structure as a whole.
    fn track(&self) {
        self.shape.with(|_| ());
    }

    fn bump(&self) {
        self.shape.update(|n| *n = n.wrapping_add(1));
    }

    /// Run a mutation as one batch.
    fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.runtime() {
            Some(runtime) => runtime.batch(f),
            None => f(),
        }
    }
}
