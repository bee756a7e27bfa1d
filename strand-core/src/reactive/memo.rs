//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. Creating a memo runs nothing. The first read computes and caches.
//!
//! 2. A write upstream marks the memo `DIRTY` (direct input) or `UNKNOWN`
//!    (somewhere farther up). Nothing is recomputed yet.
//!
//! 3. The next read validates: ancestors are brought up to date first, and
//!    the memo recomputes only if one of its direct inputs really changed.
//!
//! 4. A recomputation that lands on an equal value counts as no change, so
//!    the memo's own dependents are left alone.
//!
//! # Why This Matters
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually read will recompute
//! - Memos that are never read stay stale (no wasted work)
//!
//! # Failures
//!
//! [`Memo::try_new`] takes a fallible closure. A failed run is logged and
//! the last good value is kept. Under [`PullErrorPolicy::Surface`] the
//! failure is also reported by [`Memo::try_get`] until a later run succeeds.
//!
//! [`PullErrorPolicy::Surface`]: crate::PullErrorPolicy::Surface

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{PullError, ReactiveError, Result};
use crate::graph::{Compute, NodeId, NodeKind};
use crate::schedule::SchedulerKey;

use super::runtime::{Runtime, RuntimeInner};

type Pull<T> = Box<dyn Fn() -> std::result::Result<T, PullError>>;

struct MemoState<T> {
    value: RefCell<Option<T>>,
    pull: Pull<T>,
}

impl<T: PartialEq> Compute for MemoState<T> {
    fn compute(&self) -> std::result::Result<bool, PullError> {
        let next = (self.pull)()?;
        let mut value = self.value.borrow_mut();
        if value.as_ref() == Some(&next) {
            return Ok(false);
        }
        *value = Some(next);
        Ok(true)
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The `PartialEq` bound is what lets a recomputation that lands on the same
/// value stop propagation.
///
/// # Example
///
/// ```rust
/// use strand_core::Runtime;
///
/// let rt = Runtime::new();
/// let a = rt.signal(2);
/// let doubled = {
///     let a = a.clone();
///     rt.memo(move || a.get() * 2)
/// };
///
/// assert_eq!(doubled.get(), 4);
/// a.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T> {
    id: NodeId,
    state: Rc<MemoState<T>>,
    runtime: Weak<RuntimeInner>,
}

impl<T: PartialEq + 'static> Memo<T> {
    /// Create a memo in the runtime's current scope.
    pub fn new(runtime: &Runtime, pull: impl Fn() -> T + 'static) -> Self {
        Self::try_new(runtime, move || Ok(pull()))
    }

    /// Create a memo from a closure that may fail.
    pub fn try_new(
        runtime: &Runtime,
        pull: impl Fn() -> std::result::Result<T, PullError> + 'static,
    ) -> Self {
        let state = Rc::new(MemoState {
            value: RefCell::new(None),
            pull: Box::new(pull),
        });
        let compute: Rc<dyn Compute> = state.clone();
        let id = runtime
            .inner()
            .create_node(NodeKind::Derived, SchedulerKey::SYNC, Some(compute));
        Self {
            id,
            state,
            runtime: runtime.downgrade(),
        }
    }
}

impl<T> Memo<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Validate, then borrow the value.
    ///
    /// Registers a dependency if a node is pulling.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.refresh()?;
        match self.state.value.borrow().as_ref() {
            Some(value) => Ok(f(value)),
            None => Err(self.missing()),
        }
    }

    /// Whether the memo has produced a value yet.
    pub fn has_value(&self) -> bool {
        self.state.value.borrow().is_some()
    }

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

    /// Nodes this memo read in its latest run, in read order.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.runtime
            .upgrade()
            .map(|runtime| runtime.dependencies(self.id))
            .unwrap_or_default()
    }

    pub fn dependents(&self) -> Vec<NodeId> {
        self.runtime
            .upgrade()
            .map(|runtime| runtime.dependents(self.id))
            .unwrap_or_default()
    }

    fn refresh(&self) -> Result<()> {
        let Some(runtime) = self.runtime.upgrade() else {
            return Ok(());
        };
        runtime.track(self.id);
        runtime.validate(self.id);
        match runtime.failure(self.id) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn missing(&self) -> ReactiveError {
        if self.runtime.strong_count() == 0 {
            ReactiveError::RuntimeDropped
        } else {
            ReactiveError::Uninitialized(self.id)
        }
    }
}

impl<T: Clone> Memo<T> {
    /// Validate and return the value.
    ///
    /// # Panics
    ///
    /// Panics if the memo never produced a value, which only happens when
    /// every run so far has failed. Use [`Memo::try_get`] for fallible memos.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Validate and return the value, or the reason there is none.
    pub fn try_get(&self) -> Result<T> {
        self.with(T::clone)
    }

    /// The cached value, without validating or tracking.
    pub fn get_untracked(&self) -> Option<T> {
        self.state.value.borrow().clone()
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: self.state.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id)
            .field("value", &*self.state.value.borrow())
            .finish()
    }
}

impl Runtime {
    /// Shorthand for [`Memo::new`].
    pub fn memo<T: PartialEq + 'static>(&self, pull: impl Fn() -> T + 'static) -> Memo<T> {
        Memo::new(self, pull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::config::{PullErrorPolicy, RuntimeConfig};
    use crate::graph::DirtyState;

    fn counter() -> (Rc<Cell<i32>>, Rc<Cell<i32>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn memo_computes_on_first_access() {
        let rt = Runtime::new();
        let (count, c) = counter();
        let memo = rt.memo(move || {
            c.set(c.get() + 1);
            42
        });

        assert_eq!(count.get(), 0);
        assert!(!memo.has_value());
        assert_eq!(memo.get(), 42);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let rt = Runtime::new();
        let a = rt.signal(1);
        let (count, c) = counter();
        let a2 = a.clone();
        let memo = rt.memo(move || {
            c.set(c.get() + 1);
            a2.get() + 1
        });

        for _ in 0..3 {
            assert_eq!(memo.get(), 2);
        }
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn memo_recomputes_when_dependency_changes() {
        let rt = Runtime::new();
        let a = rt.signal(1);
        let a2 = a.clone();
        let memo = rt.memo(move || a2.get() * 3);
        assert_eq!(memo.get(), 3);

        a.set(2);
        let state = rt.inner().graph.borrow().node(memo.id()).unwrap().dirty_state();
        assert!(state.contains(DirtyState::DIRTY));
        assert_eq!(memo.get(), 6);
    }

    #[test]
    fn memo_chain_skips_unchanged_middle() {
        let rt = Runtime::new();
        let a = rt.signal(2);
        let a2 = a.clone();
        let even = rt.memo(move || a2.get() % 2 == 0);
        let (count, c) = counter();
        let e2 = even.clone();
        let label = rt.memo(move || {
            c.set(c.get() + 1);
            if e2.get() { "even" } else { "odd" }
        });

        assert_eq!(label.get(), "even");
        a.set(4);
        assert_eq!(label.get(), "even");
        assert_eq!(count.get(), 1);

        a.set(5);
        assert_eq!(label.get(), "odd");
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn memo_clone_shares_state() {
        let rt = Runtime::new();
        let memo1 = rt.memo(|| 7);
        let memo2 = memo1.clone();
        assert_eq!(memo1.get(), 7);
        assert!(memo2.has_value());
        assert_eq!(memo1.id(), memo2.id());
    }

    #[test]
    fn failed_run_keeps_last_value() {
        let rt = Runtime::new();
        let input = rt.signal(1);
        let i2 = input.clone();
        let memo = Memo::try_new(&rt, move || {
            let n = i2.get();
            if n < 0 {
                return Err("negative input".into());
            }
            Ok(n * 10)
        });
        assert_eq!(memo.get(), 10);

        input.set(-1);
        assert_eq!(memo.try_get().unwrap(), 10);
        // The edge survives the failure, so recovery is observed.
        input.set(2);
        assert_eq!(memo.get(), 20);
    }

    #[test]
    fn surface_policy_reports_failure_until_recovery() {
        let config = RuntimeConfig {
            pull_errors: PullErrorPolicy::Surface,
            ..RuntimeConfig::default()
        };
        let rt = Runtime::with_config(config);
        let input = rt.signal(1);
        let i2 = input.clone();
        let memo = Memo::try_new(&rt, move || {
            let n = i2.get();
            if n == 0 {
                Err("division by zero".into())
            } else {
                Ok(100 / n)
            }
        });
        assert_eq!(memo.try_get().unwrap(), 100);

        input.set(0);
        match memo.try_get() {
            Err(ReactiveError::PullFailed { node, message }) => {
                assert_eq!(node, memo.id());
                assert_eq!(message, "division by zero");
            }
            other => panic!("expected PullFailed, got {other:?}"),
        }

        input.set(4);
        assert_eq!(memo.try_get().unwrap(), 25);
    }

    #[test]
    fn first_run_failure_is_uninitialized() {
        let rt = Runtime::new();
        let memo: Memo<i32> = Memo::try_new(&rt, || Err("never".into()));
        assert!(matches!(memo.try_get(), Err(ReactiveError::Uninitialized(_))));
    }

    #[test]
    fn disposed_memo_stops_tracking() {
        let rt = Runtime::new();
        let a = rt.signal(1);
        let a2 = a.clone();
        let memo = rt.memo(move || a2.get());
        assert_eq!(memo.get(), 1);

        memo.dispose();
        assert!(memo.is_disposed());
        assert!(a.dependents().is_empty());
        a.set(2);
        assert_eq!(memo.get_untracked(), Some(1));
        // Disposal is not an error: reads keep returning the last value.
        assert!(matches!(memo.try_get(), Ok(1)));
    }
}
