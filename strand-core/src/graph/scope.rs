//! Ownership Scopes
//!
//! Every node is attributed to the scope that was current when it was
//! created. Releasing a scope disposes all of its members and child scopes;
//! disposing an effect also releases the scope the effect owns, which is
//! how nested effects cascade.
//!
//! Disposal detaches a node's incoming edges but leaves its outgoing edges
//! alone. Consumers still linked to a disposed node stay consistent; they
//! just never hear from it again.

use std::mem;

use indexmap::IndexSet;

use super::arena::arena_key;
use super::node::{DirtyState, NodeId};
use super::Graph;

arena_key!(
    /// Identifier of an ownership scope.
    ScopeId,
    "s"
);

/// Members and child scopes of one scope.
#[derive(Debug, Default)]
pub struct ScopeData {
    pub(crate) members: IndexSet<NodeId>,
    pub(crate) children: IndexSet<ScopeId>,
    pub(crate) parent: Option<ScopeId>,
    /// The effect whose runs populate this scope, if any.
    pub(crate) owner: Option<NodeId>,
}

impl ScopeData {
    pub fn len(&self) -> usize {
        self.members.len() + self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.children.is_empty()
    }
}

impl Graph {
    /// Create a scope, nested under `parent` when given.
    pub(crate) fn create_scope(&mut self, parent: Option<ScopeId>, owner: Option<NodeId>) -> ScopeId {
        let parent = parent.filter(|&p| self.scopes.contains(p));
        let id = self.scopes.insert(ScopeData {
            parent,
            owner,
            ..ScopeData::default()
        });
        if let Some(parent) = parent.and_then(|p| self.scopes.get_mut(p)) {
            parent.children.insert(id);
        }
        id
    }

    pub fn scope(&self, id: ScopeId) -> Option<&ScopeData> {
        self.scopes.get(id)
    }

    /// Disable a node and detach its incoming edges. Returns `false` if it
    /// was already disposed.
    pub(crate) fn dispose_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.disabled {
            return false;
        }
        node.disabled = true;
        node.dirty = DirtyState::CLEAN;
        let owner = node.scope.take();
        let owned = node.owned_scope.take();

        if let Some(scope) = owner.and_then(|s| self.scopes.get_mut(s)) {
            scope.members.shift_remove(&id);
        }
        if let Some(owned) = owned {
            self.drop_scope(owned);
        }
        self.detach_incoming(id);
        self.free_if_orphaned(id);

        tracing::debug!(node = %id, "disposed");
        true
    }

    /// Dispose every member and drop every child scope. The scope itself
    /// stays usable.
    pub(crate) fn release_scope(&mut self, id: ScopeId) -> usize {
        let Some(scope) = self.scopes.get_mut(id) else {
            return 0;
        };
        let members = mem::take(&mut scope.members);
        let children = mem::take(&mut scope.children);

        let mut released = 0;
        for child in children {
            released += self.release_scope(child);
            self.scopes.remove(child);
        }
        for member in members {
            if self.dispose_node(member) {
                released += 1;
            }
        }

        if released > 0 {
            tracing::debug!(scope = %id, released, "scope released");
        }
        released
    }

    /// Release a scope and remove it entirely.
    pub(crate) fn drop_scope(&mut self, id: ScopeId) {
        self.release_scope(id);
        if let Some(scope) = self.scopes.remove(id) {
            if let Some(parent) = scope.parent.and_then(|p| self.scopes.get_mut(p)) {
                parent.children.shift_remove(&id);
            }
        }
    }
}
