//! Dependency Graph
//!
//! This module implements the graph that tracks read relationships between
//! reactive nodes.
//!
//! # Overview
//!
//! - Nodes represent plain values (signals) or computations (memos, effects).
//! - Edges represent dependencies: if A reads B, there is an edge from B to A.
//!
//! Nodes, edges and scopes live in generational arenas and point at each
//! other by key. Each node heads two intrusive edge chains (see [`edge`]),
//! which keeps attach, reuse and detach O(1) while a recomputation rebuilds
//! its dependency list in place.
//!
//! The graph itself never runs user code. Walks that need to recompute
//! (see [`walk`]) hand control back to the runtime between steps.

pub(crate) mod arena;
mod edge;
mod node;
mod scope;
mod snapshot;
mod walk;

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

pub use edge::{Edge, EdgeId};
pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use scope::{ScopeData, ScopeId};
pub use snapshot::{GraphSnapshot, NodeSnapshot};

pub(crate) use node::{Compute, NEVER};
pub(crate) use walk::{walk_upstream, Buckets};

use arena::Arena;
use crate::schedule::SchedulerKey;

/// Arena-backed storage for nodes, edges and scopes.
#[derive(Default)]
pub struct Graph {
    pub(crate) nodes: Arena<NodeId, Node>,
    pub(crate) edges: Arena<EdgeId, Edge>,
    pub(crate) scopes: Arena<ScopeId, ScopeData>,

    /// Upstreams already read by nodes whose recomputation is running,
    /// once a read has missed the rec cursor.
    pub(crate) confirmed: IndexMap<NodeId, IndexSet<NodeId>>,

    /// Closures of freed nodes, dropped once the graph is no longer borrowed.
    graveyard: Vec<Rc<dyn Compute>>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node attributed to `scope`.
    pub(crate) fn add_node(
        &mut self,
        kind: NodeKind,
        scheduler: SchedulerKey,
        scope: Option<ScopeId>,
    ) -> NodeId {
        let scope = scope.filter(|&s| self.scopes.contains(s));
        let mut node = Node::new(kind, scheduler);
        node.scope = scope;
        let id = self.nodes.insert(node);
        if let Some(data) = scope.and_then(|s| self.scopes.get_mut(s)) {
            data.members.insert(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Upstream nodes of `id`, in read order.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut at = self.nodes.get(id).and_then(|node| node.rec_head);
        while let Some(edge) = at.and_then(|e| self.edges.get(e)) {
            out.push(edge.upstream);
            at = edge.next_rec;
        }
        out
    }

    /// Downstream nodes of `id`, in link order.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut at = self.nodes.get(id).and_then(|node| node.emit_head);
        while let Some(edge) = at.and_then(|e| self.edges.get(e)) {
            out.push(edge.downstream);
            at = edge.next_emit;
        }
        out
    }

    /// Free a disposed node once nothing links to or from it.
    pub(crate) fn free_if_orphaned(&mut self, id: NodeId) {
        let orphaned = self.nodes.get(id).is_some_and(|node| {
            node.disabled && node.rec_head.is_none() && node.emit_head.is_none()
        });
        if !orphaned {
            return;
        }
        if let Some(compute) = self.nodes.remove(id).and_then(|node| node.compute) {
            self.graveyard.push(compute);
        }
    }

    pub(crate) fn take_graveyard(&mut self) -> Vec<Rc<dyn Compute>> {
        std::mem::take(&mut self.graveyard)
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("scopes", &self.scopes.len())
            .finish()
    }
}
