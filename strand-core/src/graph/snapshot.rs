//! Serializable view of the graph, for debugging and tests.

use serde::Serialize;

use super::node::{NodeId, NodeKind};
use super::Graph;

/// One node as seen by a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub dirty: Vec<&'static str>,
    pub version: Option<u64>,
    pub disabled: bool,
    pub scheduler: String,
    pub dependencies: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
}

/// Point-in-time copy of every live node and its edges.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    /// Global version counter at the time of the snapshot.
    pub version: u64,
    pub nodes: Vec<NodeSnapshot>,
    pub edge_count: usize,
}

impl GraphSnapshot {
    pub(crate) fn capture(graph: &Graph, version: u64) -> Self {
        let nodes = graph
            .nodes
            .iter()
            .map(|(id, node)| NodeSnapshot {
                id,
                kind: node.kind,
                dirty: node.dirty.names(),
                version: (node.version != super::node::NEVER).then_some(node.version),
                disabled: node.disabled,
                scheduler: node.scheduler.to_string(),
                dependencies: graph.dependencies(id),
                dependents: graph.dependents(id),
            })
            .collect();
        Self {
            version,
            nodes,
            edge_count: graph.edge_count(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
