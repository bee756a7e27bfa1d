//! Graph Walks
//!
//! Two traversals drive the engine, one per direction:
//!
//! 1. **Downstream marking** ([`Graph::mark_downstream`]) runs on every
//!    committed write. Direct dependents of the written node become `DIRTY`,
//!    everything farther becomes `UNKNOWN`, and eager terminal nodes are
//!    collected into per-scheduler buckets. Nothing recomputes here.
//!
//! 2. **Upstream validation** ([`walk_upstream`]) runs when a stale node is
//!    read or flushed. It is a post-order depth-first walk over the rec
//!    chains: a node is completed only after every stale ancestor has been
//!    completed, so a recomputation never observes a half-updated input.
//!
//! Marking is idempotent. A node that is already stale is not descended
//! again, because its descendants were marked when it first went stale.

use std::cell::RefCell;
use std::collections::VecDeque;

use indexmap::IndexMap;
use smallvec::{smallvec, SmallVec};

use super::edge::EdgeId;
use super::node::{DirtyState, NodeId};
use super::Graph;
use crate::schedule::SchedulerKey;

/// Terminal nodes reached by a write, grouped by scheduler key.
pub(crate) type Buckets = IndexMap<SchedulerKey, Vec<NodeId>>;

impl Graph {
    /// Mark everything downstream of `source` and collect eager terminals.
    pub(crate) fn mark_downstream(&mut self, source: NodeId, buckets: &mut Buckets) {
        let mut queue = VecDeque::new();

        // Distance one is confirmed stale.
        for dependent in self.dependents(source) {
            self.mark(dependent, DirtyState::DIRTY, &mut queue, buckets);
        }

        while let Some(id) = queue.pop_front() {
            for dependent in self.dependents(id) {
                self.mark(dependent, DirtyState::UNKNOWN, &mut queue, buckets);
            }
        }
    }

    fn mark(
        &mut self,
        id: NodeId,
        state: DirtyState,
        queue: &mut VecDeque<NodeId>,
        buckets: &mut Buckets,
    ) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.disabled {
            return;
        }

        let was_clean = node.dirty.is_clean();
        node.dirty.insert(state);

        if node.emit_head.is_some() {
            if was_clean {
                queue.push_back(id);
            }
        } else if node.kind.is_eager() && !node.dirty.contains(DirtyState::RECOMPUTE) {
            node.dirty.insert(DirtyState::RECOMPUTE);
            buckets.entry(node.scheduler.clone()).or_default().push(id);
        }
    }

    /// After a recomputation changed `id`'s value, its direct dependents
    /// are confirmed stale.
    pub(crate) fn mark_dependents_dirty(&mut self, id: NodeId, buckets: &mut Buckets) {
        for dependent in self.dependents(id) {
            let Some(node) = self.nodes.get_mut(dependent) else {
                continue;
            };
            if node.disabled {
                continue;
            }
            node.dirty.insert(DirtyState::DIRTY);
            if node.kind.is_eager()
                && node.emit_head.is_none()
                && !node.dirty.intersects(DirtyState::RECOMPUTE | DirtyState::CHECK)
            {
                node.dirty.insert(DirtyState::RECOMPUTE);
                buckets.entry(node.scheduler.clone()).or_default().push(dependent);
            }
        }
    }

    /// Entry step of the upstream walk. Returns `true` when the walk should
    /// descend into `id`'s dependencies.
    pub(crate) fn begin_check(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.disabled || node.dirty.contains(DirtyState::CHECK) || node.dirty.is_clean() {
            return false;
        }
        node.dirty.insert(DirtyState::CHECK);
        true
    }

    /// The incoming edge after `after`, or the head of the chain.
    pub(crate) fn next_incoming(&self, id: NodeId, after: Option<EdgeId>) -> Option<EdgeId> {
        match after {
            None => self.nodes.get(id)?.rec_head,
            Some(edge) => self.edges.get(edge)?.next_rec,
        }
    }

    /// Clear the stale and check bits and stamp the validation epoch.
    pub(crate) fn settle(&mut self, id: NodeId, version: u64) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.dirty.remove(DirtyState::STALE | DirtyState::CHECK);
            node.version = version;
        }
    }
}

/// Nodes the upstream walk has entered but not completed.
///
/// Unwinding out of `complete` clears their `CHECK` bits, so a later read
/// can walk them again.
struct CheckStack<'a> {
    graph: &'a RefCell<Graph>,
    entries: SmallVec<[(NodeId, Option<EdgeId>); 16]>,
}

impl Drop for CheckStack<'_> {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let Ok(mut graph) = self.graph.try_borrow_mut() else {
            return;
        };
        for &(id, _) in &self.entries {
            if let Some(node) = graph.nodes.get_mut(id) {
                node.dirty.remove(DirtyState::CHECK);
            }
        }
    }
}

/// Post-order walk over the stale ancestors of `root`.
///
/// `complete` is called once per visited node, ancestors first, with the
/// graph borrow released so it may recompute user closures.
pub(crate) fn walk_upstream(graph: &RefCell<Graph>, root: NodeId, mut complete: impl FnMut(NodeId)) {
    if !graph.borrow_mut().begin_check(root) {
        return;
    }

    let mut stack = CheckStack {
        graph,
        entries: smallvec![(root, None)],
    };
    while let Some(&(node, after)) = stack.entries.last() {
        let next = graph.borrow().next_incoming(node, after);
        match next {
            Some(edge) => {
                if let Some(top) = stack.entries.last_mut() {
                    top.1 = Some(edge);
                }
                let descend = {
                    let mut graph = graph.borrow_mut();
                    let upstream = graph.edges.get(edge).map(|e| e.upstream);
                    upstream.filter(|&up| graph.begin_check(up))
                };
                if let Some(upstream) = descend {
                    stack.entries.push((upstream, None));
                }
            }
            None => {
                // Still on the stack while it runs.
                complete(node);
                stack.entries.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    /// source -> derived1 -> derived2 -> effect
    fn chain() -> (Graph, [NodeId; 4]) {
        let mut graph = Graph::new();
        let source = graph.add_node(NodeKind::Source, SchedulerKey::SYNC, None);
        let derived1 = graph.add_node(NodeKind::Derived, SchedulerKey::SYNC, None);
        let derived2 = graph.add_node(NodeKind::Derived, SchedulerKey::SYNC, None);
        let effect = graph.add_node(NodeKind::Effect, SchedulerKey::MICRO, None);
        for (up, down) in [(source, derived1), (derived1, derived2), (derived2, effect)] {
            graph.reset_cursor(down);
            graph.link(up, down);
        }
        (graph, [source, derived1, derived2, effect])
    }

    #[test]
    fn mark_changed_propagates() {
        let (mut graph, [source, derived1, derived2, effect]) = chain();
        let mut buckets = Buckets::new();
        graph.mark_downstream(source, &mut buckets);

        assert!(graph.node(source).unwrap().dirty_state().is_clean());
        assert!(graph.node(derived1).unwrap().dirty_state().contains(DirtyState::DIRTY));
        assert!(graph.node(derived2).unwrap().dirty_state().contains(DirtyState::UNKNOWN));
        assert!(!graph.node(derived2).unwrap().dirty_state().contains(DirtyState::DIRTY));
        assert!(graph.node(effect).unwrap().dirty_state().contains(DirtyState::RECOMPUTE));

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&SchedulerKey::MICRO], vec![effect]);
    }

    #[test]
    fn diamond_terminal_is_collected_once() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Source, SchedulerKey::SYNC, None);
        let b = graph.add_node(NodeKind::Derived, SchedulerKey::SYNC, None);
        let d = graph.add_node(NodeKind::Derived, SchedulerKey::SYNC, None);
        let e = graph.add_node(NodeKind::Effect, SchedulerKey::SYNC, None);
        for (up, down) in [(a, b), (a, d)] {
            graph.reset_cursor(down);
            graph.link(up, down);
        }
        graph.reset_cursor(e);
        graph.link(b, e);
        graph.link(d, e);

        let mut buckets = Buckets::new();
        graph.mark_downstream(a, &mut buckets);
        assert_eq!(buckets[&SchedulerKey::SYNC], vec![e]);
    }

    #[test]
    fn second_write_before_flush_collects_nothing() {
        let (mut graph, [source, ..]) = chain();
        let mut buckets = Buckets::new();
        graph.mark_downstream(source, &mut buckets);

        let mut again = Buckets::new();
        graph.mark_downstream(source, &mut again);
        assert!(again.is_empty());
    }

    #[test]
    fn lazy_terminals_are_not_collected() {
        let mut graph = Graph::new();
        let source = graph.add_node(NodeKind::Source, SchedulerKey::SYNC, None);
        let memo = graph.add_node(NodeKind::Derived, SchedulerKey::SYNC, None);
        graph.reset_cursor(memo);
        graph.link(source, memo);

        let mut buckets = Buckets::new();
        graph.mark_downstream(source, &mut buckets);
        assert!(buckets.is_empty());
        assert!(graph.node(memo).unwrap().dirty_state().contains(DirtyState::DIRTY));
    }

    #[test]
    fn upstream_walk_completes_ancestors_first() {
        let (mut graph, [source, derived1, derived2, effect]) = chain();
        let mut buckets = Buckets::new();
        graph.mark_downstream(source, &mut buckets);

        let graph = RefCell::new(graph);
        let mut order = Vec::new();
        walk_upstream(&graph, effect, |id| {
            order.push(id);
            graph.borrow_mut().settle(id, 1);
        });

        // The clean source is never entered.
        assert_eq!(order, vec![derived1, derived2, effect]);
        let graph = graph.borrow();
        assert!(graph.node(derived1).unwrap().dirty_state().is_clean());
        assert!(graph.node(derived2).unwrap().dirty_state().is_clean());
        // Settling leaves the queue marker for the flush to clear.
        assert_eq!(graph.node(effect).unwrap().dirty_state(), DirtyState::RECOMPUTE);
        assert_eq!(graph.node(effect).unwrap().version(), 1);
    }

    #[test]
    fn upstream_walk_skips_clean_root() {
        let (graph, [_, _, _, effect]) = chain();
        let graph = RefCell::new(graph);
        let mut visited = 0;
        walk_upstream(&graph, effect, |_| visited += 1);
        assert_eq!(visited, 0);
    }

    #[test]
    fn panicking_completion_leaves_no_check_bits() {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        let (mut graph, nodes) = chain();
        let [source, _, _, effect] = nodes;
        let mut buckets = Buckets::new();
        graph.mark_downstream(source, &mut buckets);

        let graph = RefCell::new(graph);
        let result = catch_unwind(AssertUnwindSafe(|| {
            walk_upstream(&graph, effect, |_| panic!("compute failed"));
        }));
        assert!(result.is_err());

        let g = graph.borrow();
        for id in nodes {
            assert!(!g.node(id).unwrap().dirty_state().contains(DirtyState::CHECK));
        }
        drop(g);

        // The same nodes can be walked again.
        let mut order = Vec::new();
        walk_upstream(&graph, effect, |id| {
            order.push(id);
            graph.borrow_mut().settle(id, 1);
        });
        assert_eq!(order.len(), 3);
    }
}
