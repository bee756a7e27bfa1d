//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! is the only kind of node that can be written directly.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a memo or effect is pulling, the runtime
//!    links the signal to that node.
//!
//! 2. When a signal is set to a value that differs from the current one,
//!    the runtime bumps the global version and marks every dependent.
//!
//! 3. Setting a signal to the value it already holds does nothing at all:
//!    no version bump, no marking, no flush.
//!
//! # Memory Layout
//!
//! The graph only knows the signal's `NodeId`. The value sits in an
//! `Rc<RefCell<T>>` shared by every clone of the handle.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::graph::{NodeId, NodeKind, ScopeId};
use crate::schedule::SchedulerKey;

use super::runtime::{Runtime, RuntimeInner};

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use strand_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
///
/// count.update(|n| *n += 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T> {
    id: NodeId,
    value: Rc<RefCell<T>>,
    runtime: Weak<RuntimeInner>,
}

impl<T: 'static> Signal<T> {
    /// Create a signal in the runtime's current scope.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        let id = runtime
            .inner()
            .create_node(NodeKind::Source, SchedulerKey::SYNC, None);
        Self {
            id,
            value: Rc::new(RefCell::new(value)),
            runtime: runtime.downgrade(),
        }
    }

    /// Create a signal owned by `scope` rather than the current scope.
    pub(crate) fn new_in(runtime: &Rc<RuntimeInner>, scope: ScopeId, value: T) -> Self {
        let id = runtime.create_node_in(NodeKind::Source, SchedulerKey::SYNC, None, scope);
        Self {
            id,
            value: Rc::new(RefCell::new(value)),
            runtime: Rc::downgrade(runtime),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Borrow the value, registering a dependency if a node is pulling.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track(self.id);
        }
        f(&self.value.borrow())
    }

    /// Borrow the value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Remove the signal from propagation. Dependents keep their edges but
    /// never hear from it again, and later writes are ignored.
    pub fn dispose(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose(self.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.runtime
            .upgrade()
            .is_some_and(|runtime| !runtime.is_live(self.id))
    }

    /// Nodes that read this signal in their latest run.
    pub fn dependents(&self) -> Vec<NodeId> {
        self.runtime
            .upgrade()
            .map(|runtime| runtime.dependents(self.id))
            .unwrap_or_default()
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value, registering a dependency if a node is pulling.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Store a new value and propagate if it differs from the current one.
    pub fn set(&self, value: T) {
        let Some(runtime) = self.runtime.upgrade() else {
            *self.value.borrow_mut() = value;
            return;
        };
        if !runtime.is_live(self.id) {
            return;
        }
        {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        runtime.commit_write(self.id);
    }
}

impl<T: Clone + PartialEq + 'static> Signal<T> {
    /// Modify the value in place through `f`, then set it.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get_untracked();
        f(&mut next);
        self.set(next);
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: self.value.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*self.value.borrow())
            .finish()
    }
}

impl Runtime {
    /// Shorthand for [`Signal::new`].
    pub fn signal<T: 'static>(&self, value: T) -> Signal<T> {
        Signal::new(self, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_get_and_set() {
        let rt = Runtime::new();
        let signal = rt.signal(42);
        assert_eq!(signal.get(), 42);

        signal.set(100);
        assert_eq!(signal.get(), 100);
    }

    #[test]
    fn signal_update() {
        let rt = Runtime::new();
        let signal = rt.signal(10);
        signal.update(|x| *x *= 2);
        assert_eq!(signal.get(), 20);
    }

    #[test]
    fn signal_clone_shares_value() {
        let rt = Runtime::new();
        let signal1 = rt.signal(1);
        let signal2 = signal1.clone();

        signal1.set(2);
        assert_eq!(signal2.get(), 2);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_with_borrows_without_clone() {
        let rt = Runtime::new();
        let names = rt.signal(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(names.with(|v| v.len()), 2);
    }

    #[test]
    fn disposed_signal_ignores_writes() {
        let rt = Runtime::new();
        let signal = rt.signal(1);
        signal.dispose();
        assert!(signal.is_disposed());

        signal.set(2);
        assert_eq!(signal.get(), 1);
        assert_eq!(rt.version(), 0);
    }

    #[test]
    fn signal_reports_dependents() {
        let rt = Runtime::new();
        let a = rt.signal(1);
        let a2 = a.clone();
        let memo = rt.memo(move || a2.get() * 10);
        assert!(a.dependents().is_empty());

        assert_eq!(memo.get(), 10);
        assert_eq!(a.dependents(), vec![memo.id()]);
    }
}
