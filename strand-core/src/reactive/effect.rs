//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When a write reaches the effect, it is handed to the scheduler named
//!    in its [`EffectOptions`]. The scheduler decides when the flush runs.
//!
//! 3. At flush time the effect re-validates its inputs and re-runs only if
//!    one of them actually changed. Dependencies are rebuilt during the run.
//!
//! # Ownership
//!
//! Every effect owns a scope. Cells and effects created while it runs land
//! in that scope and are disposed right before the next run, so an effect
//! that builds child effects never accumulates stale ones.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos are read by other nodes; effects are always terminal.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::PullError;
use crate::graph::{Compute, NodeId, NodeKind};
use crate::schedule::SchedulerKey;

use super::runtime::{Runtime, RuntimeInner};

type Run = Box<dyn FnMut() -> Result<(), PullError>>;

struct EffectState {
    run: RefCell<Run>,
    runs: Cell<usize>,
}

impl Compute for EffectState {
    fn compute(&self) -> Result<bool, PullError> {
        let Ok(mut run) = self.run.try_borrow_mut() else {
            tracing::warn!("effect re-entered its own run; skipping");
            return Ok(false);
        };
        self.runs.set(self.runs.get() + 1);
        run()?;
        Ok(true)
    }
}

/// Options for [`Effect::with_options`].
#[derive(Debug, Clone, Default)]
pub struct EffectOptions {
    /// Scheduler that flushes the effect after a write. Defaults to `sync`.
    pub scheduler: SchedulerKey,
}

/// A side-effecting computation that runs when dependencies change.
///
/// The handle is also the effect's disposer. Dropping it does not stop
/// the effect; [`Effect::dispose`] or releasing its scope does.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use strand_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let effect = {
///     let (count, seen) = (count.clone(), seen.clone());
///     rt.effect(move || seen.set(count.get()))
/// };
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
///
/// effect.dispose();
/// count.set(6);
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    id: NodeId,
    state: Rc<EffectState>,
    runtime: Weak<RuntimeInner>,
}

impl Effect {
    /// Create an effect on the `sync` scheduler and run it once.
    pub fn new(runtime: &Runtime, mut run: impl FnMut() + 'static) -> Self {
        Self::try_new(runtime, move || {
            run();
            Ok(())
        })
    }

    pub fn with_options(
        runtime: &Runtime,
        options: EffectOptions,
        mut run: impl FnMut() + 'static,
    ) -> Self {
        Self::try_with_options(runtime, options, move || {
            run();
            Ok(())
        })
    }

    /// Create an effect whose run may fail. Failures are logged and the
    /// effect stays subscribed to whatever it read before failing.
    pub fn try_new(runtime: &Runtime, run: impl FnMut() -> Result<(), PullError> + 'static) -> Self {
        Self::try_with_options(runtime, EffectOptions::default(), run)
    }

    pub fn try_with_options(
        runtime: &Runtime,
        options: EffectOptions,
        run: impl FnMut() -> Result<(), PullError> + 'static,
    ) -> Self {
        Self::build(runtime, options.scheduler, true, Box::new(run))
    }

    fn build(runtime: &Runtime, scheduler: SchedulerKey, release_on_rerun: bool, run: Run) -> Self {
        let state = Rc::new(EffectState {
            run: RefCell::new(run),
            runs: Cell::new(0),
        });
        let compute: Rc<dyn Compute> = state.clone();
        let inner = runtime.inner();
        let id = inner.create_node(NodeKind::Effect, scheduler, Some(compute));
        if !release_on_rerun {
            inner.keep_owned_scope(id);
        }
        inner.validate(id);
        Self {
            id,
            state,
            runtime: runtime.downgrade(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Re-run now, whether or not an input changed.
    pub fn run(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.force_run(self.id);
        }
    }

    /// Detach the effect's inputs and stop it for good, along with every
    /// cell and effect its runs created. Idempotent.
    pub fn dispose(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose(self.id);
        }
    }

    /// A zero-argument callable that disposes this effect.
    pub fn disposer(&self) -> impl Fn() + 'static {
        let effect = self.clone();
        move || effect.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.runtime
            .upgrade()
            .map_or(true, |runtime| !runtime.is_live(self.id))
    }

    /// Number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.state.runs.get()
    }

    /// Nodes read in the latest run, in read order.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.runtime
            .upgrade()
            .map(|runtime| runtime.dependencies(self.id))
            .unwrap_or_default()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("runs", &self.state.runs.get())
            .finish()
    }
}

impl Runtime {
    /// Shorthand for [`Effect::new`].
    pub fn effect(&self, run: impl FnMut() + 'static) -> Effect {
        Effect::new(self, run)
    }
}

// ----------------------------------------------------------------------------
// Watch
// ----------------------------------------------------------------------------

/// Old and new value of one watched dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDiff<T> {
    /// `None` on the immediate first call.
    pub old: Option<T>,
    pub new: T,
}

/// Options for [`watch_with`].
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Also call back on the mount run. Always on when there are no
    /// dependencies.
    pub immediate: bool,
    pub scheduler: SchedulerKey,
}

/// Call `callback` whenever any of `deps` produces a different value.
///
/// See [`watch_with`].
pub fn watch<T, D, C>(runtime: &Runtime, deps: Vec<D>, callback: C) -> Effect
where
    T: Clone + PartialEq + 'static,
    D: Fn() -> T + 'static,
    C: Fn(&[ValueDiff<T>]) + 'static,
{
    watch_with(runtime, deps, callback, WatchOptions::default())
}

/// Build an effect that re-reads every dependency closure on each run and,
/// after the mount run, calls `callback` with one [`ValueDiff`] per
/// dependency whenever the values differ from the previous run.
///
/// The callback runs untracked. Cells it creates belong to the watch and
/// are disposed right before the next call.
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use strand_core::{watch, Runtime};
///
/// let rt = Runtime::new();
/// let name = rt.signal("ada");
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let _watch = {
///     let (name, log) = (name.clone(), log.clone());
///     watch(&rt, vec![move || name.get()], move |diffs| {
///         log.borrow_mut().push((diffs[0].old, diffs[0].new));
///     })
/// };
///
/// name.set("grace");
/// assert_eq!(*log.borrow(), vec![(Some("ada"), "grace")]);
/// ```
pub fn watch_with<T, D, C>(runtime: &Runtime, deps: Vec<D>, callback: C, options: WatchOptions) -> Effect
where
    T: Clone + PartialEq + 'static,
    D: Fn() -> T + 'static,
    C: Fn(&[ValueDiff<T>]) + 'static,
{
    let immediate = options.immediate || deps.is_empty();
    let weak = runtime.downgrade();
    let mut previous: Option<Vec<T>> = None;

    let run = move || {
        let values: Vec<T> = deps.iter().map(|dep| dep()).collect();
        let old = previous.replace(values.clone());
        let fire = match &old {
            None => immediate,
            Some(old) => *old != values,
        };
        if !fire {
            return Ok(());
        }

        let diffs: Vec<ValueDiff<T>> = match old {
            Some(old) => old
                .into_iter()
                .zip(values)
                .map(|(old, new)| ValueDiff { old: Some(old), new })
                .collect(),
            None => values
                .into_iter()
                .map(|new| ValueDiff { old: None, new })
                .collect(),
        };
        match weak.upgrade() {
            Some(runtime) => {
                runtime.release_current_scope();
                runtime.untrack(|| callback(&diffs));
            }
            None => callback(&diffs),
        }
        Ok(())
    };
    Effect::build(runtime, options.scheduler, false, Box::new(run))
}
