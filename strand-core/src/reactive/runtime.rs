//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph, the global version counter and
//! the context slots, and it runs both halves of the evaluation protocol.
//!
//! # How It Works
//!
//! 1. **Write.** A signal whose value actually changed bumps the global
//!    version once, then the graph is marked downstream: direct dependents
//!    become `DIRTY`, farther ones `UNKNOWN`. Eager terminals reached by the
//!    walk are grouped by scheduler key and handed to their schedulers.
//!    Nothing recomputes during marking.
//!
//! 2. **Read.** Reading a memo (or flushing an effect) first links it to
//!    the node currently pulling, then validates it:
//!    a. With no incoming edges, the node recomputes unless it was already
//!       validated in the current epoch.
//!    b. With incoming edges, an upstream walk completes stale ancestors
//!       first. A `DIRTY` node recomputes, and only a changed value makes
//!       its direct dependents `DIRTY`. An `UNKNOWN` node whose inputs all
//!       came back unchanged is settled without recomputing.
//!
//! 3. **Rebuild.** A recomputation resets the node's edge cursor, and every
//!    read it makes re-links or reuses an edge. Edges the run did not touch
//!    are pruned afterwards.
//!
//! # Single-threaded
//!
//! Everything here lives behind `Rc`, `Cell` and `RefCell`. The graph is
//! never borrowed while user code runs, so pull closures may freely read,
//! write and create other cells.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::config::{DriverKind, PullErrorPolicy, RuntimeConfig};
use crate::error::{ReactiveError, Result};
use crate::graph::{
    walk_upstream, Buckets, Compute, DirtyState, Graph, GraphSnapshot, NodeId, NodeKind, ScopeId,
    NEVER,
};
use crate::schedule::{self, Batch, Driver, EventLoop, Scheduler, SchedulerKey, SyncScheduler, TokioDriver};

use super::context::{BatchGuard, PullGuard, ScopeGuard};
use super::scope::Scope;

/// Shared state behind every [`Runtime`] handle.
///
/// Cell handles hold a `Weak` to this, so dropping the last `Runtime`
/// frees the graph even while handles are still around.
pub struct RuntimeInner {
    weak_self: Weak<RuntimeInner>,
    pub(crate) graph: RefCell<Graph>,
    version: Cell<u64>,
    pub(crate) pulling: Cell<Option<NodeId>>,
    pub(crate) current_scope: Cell<ScopeId>,
    root_scope: ScopeId,
    schedulers: RefCell<IndexMap<SchedulerKey, Rc<dyn Scheduler>>>,
    event_loop: Rc<EventLoop>,
    config: RuntimeConfig,
    pub(crate) batch_depth: Cell<usize>,
    pending: RefCell<Buckets>,
}

/// The reactive runtime.
///
/// Cloning is cheap and yields another handle to the same graph. Closures
/// stored in the graph should capture cell handles rather than a `Runtime`,
/// since a captured `Runtime` keeps the graph alive through itself.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let event_loop = Rc::new(EventLoop::new());
        let driver: Rc<dyn Driver> = match config.driver {
            DriverKind::EventLoop => event_loop.clone(),
            DriverKind::Tokio => Rc::new(TokioDriver::new(config.frame_interval())),
        };

        let mut graph = Graph::new();
        let root_scope = graph.create_scope(None, None);
        let schedulers = schedule::builtin(driver).into_iter().collect();

        let inner = Rc::new_cyclic(|weak_self| RuntimeInner {
            weak_self: weak_self.clone(),
            graph: RefCell::new(graph),
            version: Cell::new(0),
            pulling: Cell::new(None),
            current_scope: Cell::new(root_scope),
            root_scope,
            schedulers: RefCell::new(schedulers),
            event_loop,
            config,
            batch_depth: Cell::new(0),
            pending: RefCell::new(Buckets::new()),
        });
        tracing::debug!(driver = ?inner.config.driver, "runtime created");
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &RuntimeInner {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The global version counter. It moves once per committed write.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// The host-pumped loop behind the built-in deferred schedulers.
    ///
    /// With [`DriverKind::Tokio`] nothing is ever armed here.
    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    /// Register or replace the scheduler for `key`.
    pub fn register_scheduler(&self, key: impl Into<SchedulerKey>, scheduler: impl Scheduler + 'static) {
        let key = key.into();
        tracing::debug!(scheduler = %key, "scheduler registered");
        self.inner
            .schedulers
            .borrow_mut()
            .insert(key, Rc::new(scheduler));
    }

    /// Look up the scheduler registered under `key`.
    pub fn scheduler(&self, key: &SchedulerKey) -> Result<Rc<dyn Scheduler>> {
        self.inner.scheduler(key)
    }

    /// Run `f` and hand everything it scheduled to the schedulers once, when
    /// the outermost batch returns.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.batch(f)
    }

    /// Run `f` without recording any dependency for the pulling node.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.untrack(f)
    }

    /// The scope every node lands in when no other scope is active.
    pub fn root_scope(&self) -> Scope {
        Scope::from_parts(self.inner.root_scope, self.downgrade())
    }

    /// A new scope nested under the current one.
    pub fn create_scope(&self) -> Scope {
        Scope::new(self)
    }

    /// Serializable copy of the graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::capture(&self.inner.graph.borrow(), self.version())
    }

    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.graph.borrow().edge_count()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("version", &self.inner.version.get())
            .field("graph", &*self.inner.graph.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Construction
// ----------------------------------------------------------------------------

impl RuntimeInner {
    /// Add a node to the current scope.
    pub(crate) fn create_node(
        &self,
        kind: NodeKind,
        scheduler: SchedulerKey,
        compute: Option<Rc<dyn Compute>>,
    ) -> NodeId {
        self.create_node_in(kind, scheduler, compute, self.current_scope.get())
    }

    pub(crate) fn create_node_in(
        &self,
        kind: NodeKind,
        scheduler: SchedulerKey,
        compute: Option<Rc<dyn Compute>>,
        scope: ScopeId,
    ) -> NodeId {
        let mut graph = self.graph.borrow_mut();
        let id = graph.add_node(kind, scheduler, Some(scope));
        // Effects own the scope their runs create cells in.
        let owned_scope = kind
            .is_eager()
            .then(|| graph.create_scope(None, Some(id)));
        if let Some(node) = graph.node_mut(id) {
            node.compute = compute;
            node.owned_scope = owned_scope;
        }
        id
    }

    /// Let the node's owned scope survive re-runs.
    pub(crate) fn keep_owned_scope(&self, id: NodeId) {
        if let Some(node) = self.graph.borrow_mut().node_mut(id) {
            node.release_on_rerun = false;
        }
    }

    pub(crate) fn create_scope(&self) -> ScopeId {
        let parent = self.current_scope.get();
        self.graph.borrow_mut().create_scope(Some(parent), None)
    }

    pub(crate) fn current_scope(&self) -> ScopeId {
        self.current_scope.get()
    }

    pub(crate) fn with_scope<R>(&self, scope: ScopeId, f: impl FnOnce() -> R) -> R {
        let _guard = ScopeGuard::enter(self, scope);
        f()
    }

    pub(crate) fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = PullGuard::enter(self, None);
        f()
    }

    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        self.graph
            .borrow()
            .node(id)
            .is_some_and(|node| !node.is_disabled())
    }
}

// ----------------------------------------------------------------------------
// Write protocol
// ----------------------------------------------------------------------------

impl RuntimeInner {
    /// Record a committed change to a source node and propagate it.
    ///
    /// The caller has already stored the new value and established that it
    /// differs from the old one.
    pub(crate) fn commit_write(&self, id: NodeId) {
        let version = self.version.get() + 1;
        self.version.set(version);

        let mut buckets = Buckets::new();
        {
            let mut graph = self.graph.borrow_mut();
            if let Some(node) = graph.node_mut(id) {
                node.version = version;
            }
            graph.mark_downstream(id, &mut buckets);
        }
        tracing::debug!(node = %id, version, terminals = buckets.values().map(Vec::len).sum::<usize>(), "write committed");

        self.dispatch(buckets);
    }

    /// Hand collected terminals to their schedulers, or park them while a
    /// batch is open.
    fn dispatch(&self, buckets: Buckets) {
        if buckets.is_empty() {
            return;
        }
        if self.batch_depth.get() > 0 {
            let mut pending = self.pending.borrow_mut();
            for (key, members) in buckets {
                pending.entry(key).or_default().extend(members);
            }
            return;
        }

        for (key, members) in buckets {
            tracing::debug!(scheduler = %key, members = members.len(), "dispatching batch");
            let batch = Batch::new(self.weak_self.clone(), members);
            match self.scheduler(&key) {
                Ok(scheduler) => scheduler.schedule(batch),
                Err(err) => {
                    tracing::warn!(%err, "flushing synchronously");
                    SyncScheduler.schedule(batch);
                }
            }
        }
    }

    pub(crate) fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = {
            let _guard = BatchGuard::enter(self);
            f()
        };
        if self.batch_depth.get() == 0 {
            self.flush_pending();
        }
        result
    }

    fn flush_pending(&self) {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        self.dispatch(pending);
    }

    fn scheduler(&self, key: &SchedulerKey) -> Result<Rc<dyn Scheduler>> {
        self.schedulers
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| ReactiveError::UnknownScheduler(key.clone()))
    }
}

// ----------------------------------------------------------------------------
// Read protocol
// ----------------------------------------------------------------------------

impl RuntimeInner {
    /// Record that the pulling node (if any) read `id`.
    pub(crate) fn track(&self, id: NodeId) {
        let Some(pulling) = self.pulling.get() else {
            return;
        };
        let mut graph = self.graph.borrow_mut();
        if graph.node(id).is_some_and(|node| !node.is_disabled()) {
            graph.link(id, pulling);
        }
    }

    /// Bring a derived or effect node up to date.
    pub(crate) fn validate(&self, id: NodeId) {
        let (has_dependencies, version, dirty) = {
            let graph = self.graph.borrow();
            let Some(node) = graph.node(id) else {
                return;
            };
            if node.is_disabled() || node.kind() == NodeKind::Source {
                return;
            }
            (node.has_dependencies(), node.version(), node.dirty_state())
        };

        if has_dependencies {
            if !dirty.is_clean() {
                self.deep_pull(id);
            }
        } else if version == NEVER || version != self.version.get() {
            self.recompute(id);
            let mut graph = self.graph.borrow_mut();
            if let Some(node) = graph.node_mut(id) {
                node.dirty.remove(DirtyState::STALE);
            }
        }
    }

    /// Upstream walk from `id`, completing stale ancestors first.
    fn deep_pull(&self, id: NodeId) {
        let mut buckets = Buckets::new();
        walk_upstream(&self.graph, id, |node| self.complete(node, &mut buckets));
        self.dispatch(buckets);
    }

    fn complete(&self, id: NodeId, buckets: &mut Buckets) {
        let dirty = match self.graph.borrow().node(id) {
            Some(node) => node.dirty_state(),
            None => return,
        };
        if dirty.contains(DirtyState::DIRTY) && self.recompute(id) {
            self.graph.borrow_mut().mark_dependents_dirty(id, buckets);
        }
        self.graph.borrow_mut().settle(id, self.version.get());
    }

    /// Run the node's computation. Returns whether its value changed.
    fn recompute(&self, id: NodeId) -> bool {
        let (compute, owned_scope) = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.node(id) else {
                return false;
            };
            let Some(compute) = node.compute.clone() else {
                return false;
            };
            let owned_scope = node.owned_scope;
            if let Some(scope) = owned_scope.filter(|_| node.release_on_rerun) {
                graph.release_scope(scope);
            }
            graph.reset_cursor(id);
            (compute, owned_scope)
        };
        self.bury();

        let result = {
            let _pull = PullGuard::enter(self, Some(id));
            let _scope = owned_scope.map(|scope| ScopeGuard::enter(self, scope));
            compute.compute()
        };

        let changed = {
            let mut graph = self.graph.borrow_mut();
            let pruned = graph.prune_stale(id);
            if pruned > 0 {
                tracing::trace!(node = %id, pruned, "stale dependencies pruned");
            }
            let version = self.version.get();
            match (result, graph.node_mut(id)) {
                (Ok(changed), Some(node)) => {
                    node.failure = None;
                    node.version = version;
                    changed
                }
                (Err(err), Some(node)) => {
                    tracing::error!(node = %id, error = %err, "recomputation failed; keeping last value");
                    node.failure = Some(err.to_string());
                    false
                }
                (_, None) => false,
            }
        };
        self.bury();
        changed
    }

    /// Flush entry point for one batch member.
    pub(crate) fn run_if_dirty(&self, id: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.node_mut(id) else {
                return;
            };
            node.dirty.remove(DirtyState::RECOMPUTE);
            if node.is_disabled() || node.dirty.is_clean() {
                return;
            }
        }
        let _guard = PullGuard::enter(self, None);
        self.validate(id);
    }

    /// Re-run a node regardless of its inputs.
    pub(crate) fn force_run(&self, id: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.node_mut(id) else {
                return;
            };
            if node.is_disabled() {
                return;
            }
            node.dirty.insert(DirtyState::DIRTY);
            node.version = NEVER;
        }
        let _guard = PullGuard::enter(self, None);
        self.validate(id);
    }

    /// The failure recorded by the node's last recomputation, if it failed.
    pub(crate) fn failure(&self, id: NodeId) -> Option<ReactiveError> {
        if self.config.pull_errors != PullErrorPolicy::Surface {
            return None;
        }
        let graph = self.graph.borrow();
        let message = graph.node(id)?.failure.clone()?;
        Some(ReactiveError::PullFailed { node: id, message })
    }
}

// ----------------------------------------------------------------------------
// Disposal
// ----------------------------------------------------------------------------

impl RuntimeInner {
    pub(crate) fn dispose(&self, id: NodeId) -> bool {
        let disposed = self.graph.borrow_mut().dispose_node(id);
        self.bury();
        disposed
    }

    pub(crate) fn release_scope(&self, scope: ScopeId) -> usize {
        let released = self.graph.borrow_mut().release_scope(scope);
        self.bury();
        released
    }

    /// Release the scope that is current right now.
    pub(crate) fn release_current_scope(&self) -> usize {
        self.release_scope(self.current_scope.get())
    }

    /// Drop closures of freed nodes with the graph unborrowed.
    fn bury(&self) {
        let dead = self.graph.borrow_mut().take_graveyard();
        drop(dead);
    }

    pub(crate) fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.graph.borrow().dependencies(id)
    }

    pub(crate) fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.graph.borrow().dependents(id)
    }
}
