//! Dependency Edges
//!
//! An edge records that a downstream node read an upstream node during its
//! latest recomputation. Every edge sits in two doubly linked chains at once:
//!
//! - the upstream's *emit* chain, in the order the edges were created, and
//! - the downstream's *rec* chain, in the order of the downstream's reads.
//!
//! All links are arena keys, so splicing and unlinking are index rewrites.
//!
//! # Rebuilding during a recomputation
//!
//! Before a node recomputes, its `rec_cursor` is reset to "before the head".
//! Each read then calls [`Graph::link`]: if the edge right after the cursor
//! already comes from the same upstream it is reused and the cursor moves
//! forward; otherwise a fresh edge is spliced in right after the cursor.
//! Whatever remains after the cursor when the recomputation ends was not
//! read this time and is removed by [`Graph::prune_stale`].
//!
//! A read that misses the cursor may repeat an earlier read of the same run.
//! The first miss records the upstreams of the confirmed prefix in a set
//! that lives until the run ends, so every later check is a lookup.

use indexmap::IndexSet;
use serde::Serialize;

use super::arena::arena_key;
use super::node::NodeId;
use super::Graph;

arena_key!(
    /// Identifier of an edge in the dependency graph.
    EdgeId,
    "e"
);

/// A directed link from an upstream node to a downstream node.
#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub(crate) upstream: NodeId,
    pub(crate) downstream: NodeId,

    /// Siblings in the upstream's emit chain.
    pub(crate) prev_emit: Option<EdgeId>,
    pub(crate) next_emit: Option<EdgeId>,

    /// Siblings in the downstream's rec chain.
    pub(crate) prev_rec: Option<EdgeId>,
    pub(crate) next_rec: Option<EdgeId>,
}

impl Edge {
    pub fn upstream(&self) -> NodeId {
        self.upstream
    }

    pub fn downstream(&self) -> NodeId {
        self.downstream
    }
}

impl Graph {
    /// Record that `downstream`'s running recomputation read `upstream`.
    pub(crate) fn link(&mut self, upstream: NodeId, downstream: NodeId) {
        if upstream == downstream || !self.nodes.contains(upstream) {
            return;
        }
        let Some(down) = self.nodes.get(downstream) else {
            return;
        };
        if down.disabled {
            return;
        }

        let cursor = down.rec_cursor;
        let next = match cursor {
            Some(at) => self.edges.get(at).and_then(|edge| edge.next_rec),
            None => down.rec_head,
        };

        // Same read order as last time: reuse.
        if let Some(candidate) = next {
            if self
                .edges
                .get(candidate)
                .is_some_and(|edge| edge.upstream == upstream)
            {
                if let Some(seen) = self.confirmed.get_mut(&downstream) {
                    // Already confirmed earlier in this run; the stale
                    // duplicate stays past the cursor and gets pruned.
                    if !seen.insert(upstream) {
                        return;
                    }
                }
                if let Some(down) = self.nodes.get_mut(downstream) {
                    down.rec_cursor = Some(candidate);
                }
                return;
            }
        }

        // Repeated read within one recomputation.
        if !self.confirmed_reads(downstream).insert(upstream) {
            return;
        }

        let prev_emit = self.nodes.get(upstream).and_then(|node| node.emit_tail);
        let edge = self.edges.insert(Edge {
            upstream,
            downstream,
            prev_emit,
            next_emit: None,
            prev_rec: cursor,
            next_rec: next,
        });

        match prev_emit.and_then(|tail| self.edges.get_mut(tail)) {
            Some(tail) => tail.next_emit = Some(edge),
            None => {
                if let Some(up) = self.nodes.get_mut(upstream) {
                    up.emit_head = Some(edge);
                }
            }
        }
        if let Some(up) = self.nodes.get_mut(upstream) {
            up.emit_tail = Some(edge);
        }

        match cursor.and_then(|at| self.edges.get_mut(at)) {
            Some(before) => before.next_rec = Some(edge),
            None => {
                if let Some(down) = self.nodes.get_mut(downstream) {
                    down.rec_head = Some(edge);
                }
            }
        }
        match next.and_then(|after| self.edges.get_mut(after)) {
            Some(after) => after.prev_rec = Some(edge),
            None => {
                if let Some(down) = self.nodes.get_mut(downstream) {
                    down.rec_tail = Some(edge);
                }
            }
        }
        if let Some(down) = self.nodes.get_mut(downstream) {
            down.rec_cursor = Some(edge);
        }

        tracing::trace!(%upstream, %downstream, %edge, "linked");
    }

    /// Upstreams read so far by `downstream`'s running recomputation,
    /// collected from the confirmed prefix on first use.
    fn confirmed_reads(&mut self, downstream: NodeId) -> &mut IndexSet<NodeId> {
        let Self {
            nodes,
            edges,
            confirmed,
            ..
        } = self;
        confirmed.entry(downstream).or_insert_with(|| {
            let mut seen = IndexSet::new();
            let Some(down) = nodes.get(downstream) else {
                return seen;
            };
            let Some(cursor) = down.rec_cursor else {
                return seen;
            };
            let mut at = down.rec_head;
            while let Some(id) = at {
                let Some(edge) = edges.get(id) else {
                    break;
                };
                seen.insert(edge.upstream);
                if id == cursor {
                    break;
                }
                at = edge.next_rec;
            }
            seen
        })
    }

    /// Remove an edge from both of its chains.
    ///
    /// Only the removed edge's neighbours are touched, so a walk that has
    /// already captured its next edge can keep going.
    pub(crate) fn unlink(&mut self, id: EdgeId) {
        let Some(edge) = self.edges.remove(id) else {
            return;
        };
        let Edge {
            upstream,
            downstream,
            prev_emit,
            next_emit,
            prev_rec,
            next_rec,
        } = edge;

        match prev_emit.and_then(|prev| self.edges.get_mut(prev)) {
            Some(prev) => prev.next_emit = next_emit,
            None => {
                if let Some(up) = self.nodes.get_mut(upstream) {
                    up.emit_head = next_emit;
                }
            }
        }
        match next_emit.and_then(|next| self.edges.get_mut(next)) {
            Some(next) => next.prev_emit = prev_emit,
            None => {
                if let Some(up) = self.nodes.get_mut(upstream) {
                    up.emit_tail = prev_emit;
                }
            }
        }

        match prev_rec.and_then(|prev| self.edges.get_mut(prev)) {
            Some(prev) => prev.next_rec = next_rec,
            None => {
                if let Some(down) = self.nodes.get_mut(downstream) {
                    down.rec_head = next_rec;
                }
            }
        }
        match next_rec.and_then(|next| self.edges.get_mut(next)) {
            Some(next) => next.prev_rec = prev_rec,
            None => {
                if let Some(down) = self.nodes.get_mut(downstream) {
                    down.rec_tail = prev_rec;
                }
            }
        }
        if let Some(down) = self.nodes.get_mut(downstream) {
            if down.rec_cursor == Some(id) {
                down.rec_cursor = prev_rec;
            }
        }

        tracing::trace!(%upstream, %downstream, edge = %id, "unlinked");

        self.free_if_orphaned(upstream);
        self.free_if_orphaned(downstream);
    }

    /// Reset the rec cursor ahead of a recomputation.
    pub(crate) fn reset_cursor(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.rec_cursor = None;
        }
        self.confirmed.swap_remove(&id);
    }

    /// Unlink every incoming edge after the cursor, returning how many went.
    /// Ends the node's recomputation.
    pub(crate) fn prune_stale(&mut self, id: NodeId) -> usize {
        self.confirmed.swap_remove(&id);
        let Some(node) = self.nodes.get(id) else {
            return 0;
        };
        let mut at = match node.rec_cursor {
            Some(cursor) => self.edges.get(cursor).and_then(|edge| edge.next_rec),
            None => node.rec_head,
        };
        let mut pruned = 0;
        while let Some(edge) = at {
            at = self.edges.get(edge).and_then(|e| e.next_rec);
            self.unlink(edge);
            pruned += 1;
        }
        pruned
    }

    /// Unlink every incoming edge of a node.
    pub(crate) fn detach_incoming(&mut self, id: NodeId) {
        self.reset_cursor(id);
        self.prune_stale(id);
    }
}
