//! Graph Nodes
//!
//! This module defines the node records that live in the dependency graph,
//! along with their dirty-state bitmask.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use super::arena::arena_key;
use super::edge::EdgeId;
use super::scope::ScopeId;
use crate::error::PullError;
use crate::schedule::SchedulerKey;

arena_key!(
    /// Unique identifier for a node in the dependency graph.
    NodeId,
    "n"
);

/// Version stamp of a node that has never been validated.
pub(crate) const NEVER: u64 = u64::MAX;

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (memo). Lazy: recomputes only when read.
    Derived,

    /// An effect node. Eager: flushed by its scheduler when it goes stale.
    Effect,
}

impl NodeKind {
    /// Whether stale nodes of this kind are handed to a scheduler.
    pub fn is_eager(self) -> bool {
        matches!(self, NodeKind::Effect)
    }
}

/// Dirty state of a node, as a bitmask.
///
/// `UNKNOWN` and `DIRTY` are the persistent states set by write propagation
/// and cleared by validation. `CHECK` brackets a single visit of the
/// upstream walk. `RECOMPUTE` marks a node already sitting in a flush batch.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DirtyState(u8);

impl DirtyState {
    pub const CLEAN: Self = Self(0);
    /// An ancestor changed; this node's inputs are not yet proven changed.
    pub const UNKNOWN: Self = Self(1 << 0);
    /// A direct input changed; must recompute.
    pub const DIRTY: Self = Self(1 << 1);
    /// Currently being visited by an upstream walk.
    pub const CHECK: Self = Self(1 << 2);
    /// Queued in a flush batch.
    pub const RECOMPUTE: Self = Self(1 << 3);
    /// Either persistent stale bit.
    pub const STALE: Self = Self(Self::UNKNOWN.0 | Self::DIRTY.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// True when neither `UNKNOWN` nor `DIRTY` is set.
    pub fn is_clean(self) -> bool {
        !self.intersects(Self::STALE)
    }

    /// Names of the set bits, for snapshots and debug output.
    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::UNKNOWN, "unknown"),
            (Self::DIRTY, "dirty"),
            (Self::CHECK, "check"),
            (Self::RECOMPUTE, "recompute"),
        ]
        .into_iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|(_, name)| name)
        .collect()
    }
}

impl std::ops::BitOr for DirtyState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for DirtyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            f.write_str("Clean")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Type-erased recomputation of a derived or effect node.
///
/// Implementations run the user's pull closure, store the result in their
/// typed cache and report whether the cached value actually changed.
pub(crate) trait Compute {
    fn compute(&self) -> Result<bool, PullError>;
}

/// A node in the dependency graph.
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) dirty: DirtyState,

    /// Epoch at which this node was last validated or recomputed.
    pub(crate) version: u64,

    pub(crate) scheduler: SchedulerKey,

    /// Set once disposed. Disabled nodes never propagate or recompute.
    pub(crate) disabled: bool,

    /// Incoming chain: edges where this node is downstream.
    pub(crate) rec_head: Option<EdgeId>,
    pub(crate) rec_tail: Option<EdgeId>,

    /// Last incoming edge confirmed by the running recomputation.
    /// `None` means "before the head".
    pub(crate) rec_cursor: Option<EdgeId>,

    /// Outgoing chain: edges where this node is upstream.
    pub(crate) emit_head: Option<EdgeId>,
    pub(crate) emit_tail: Option<EdgeId>,

    /// Scope this node was attributed to at construction.
    pub(crate) scope: Option<ScopeId>,

    /// Scope owning cells created while this node runs (effects only).
    pub(crate) owned_scope: Option<ScopeId>,

    /// Release `owned_scope` before every re-run.
    pub(crate) release_on_rerun: bool,

    /// Message of the last failed recomputation, cleared on success.
    pub(crate) failure: Option<String>,

    pub(crate) compute: Option<Rc<dyn Compute>>,
}

impl Node {
    /// Create a new node with the given kind.
    pub(crate) fn new(kind: NodeKind, scheduler: SchedulerKey) -> Self {
        Self {
            kind,
            dirty: DirtyState::CLEAN,
            version: NEVER,
            scheduler,
            disabled: false,
            rec_head: None,
            rec_tail: None,
            rec_cursor: None,
            emit_head: None,
            emit_tail: None,
            scope: None,
            owned_scope: None,
            release_on_rerun: true,
            failure: None,
            compute: None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn has_dependencies(&self) -> bool {
        self.rec_head.is_some()
    }

    pub fn has_dependents(&self) -> bool {
        self.emit_head.is_some()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("dirty", &self.dirty)
            .field("version", &self.version)
            .field("scheduler", &self.scheduler)
            .field("disabled", &self.disabled)
            .finish()
    }
}
