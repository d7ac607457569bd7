//! Query graph
//!
//! An in-flight expansion is a tree of [`QueryNode`]s stored in an arena
//! ([`QueryTree`]). Nodes refer to their parent, root and children by
//! [`NodeId`], so the tree owns every node and no node owns another.
//!
//! ```text
//!            AS-A (root)
//!           /          \
//!        AS1           AS-B
//!                        \
//!                        AS-A   <- refused by fork: already an ancestor
//! ```
//!
//! Forking a child for an object that is already on the path to the root
//! is refused; that is the only thing that breaks reference cycles between
//! sets.

pub mod node;

pub use node::{NodeId, OriginMap, QueryFilter, QueryNode, QueryStatus, RouteTable};

use std::ops::{Index, IndexMut};
use std::sync::Arc;

/// Arena of query nodes for one server
#[derive(Debug, Default)]
pub struct QueryTree {
    nodes: Vec<QueryNode>,
}

impl QueryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root node for a submitted object
    pub fn add_root(&mut self, object: Option<String>, filter: Arc<QueryFilter>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let ancestors = object.iter().cloned().collect();

        self.nodes.push(QueryNode {
            id,
            object,
            filter,
            parent: None,
            root: id,
            ancestors,
            children: Vec::new(),
            status: Default::default(),
            result: Default::default(),
        });

        id
    }

    /// Create a child of `parent` for a newly discovered object
    ///
    /// Returns `None`, and creates nothing, if the object already appears
    /// among the parent's ancestor objects.
    pub fn fork(&mut self, parent: NodeId, object: &str) -> Option<NodeId> {
        let parent_node = &self.nodes[parent.0];
        if parent_node.is_ancestor_object(object) {
            return None;
        }

        let id = NodeId(self.nodes.len());
        let mut ancestors = parent_node.ancestors.clone();
        ancestors.push(object.to_string());

        let child = QueryNode {
            id,
            object: Some(object.to_string()),
            filter: Arc::clone(&parent_node.filter),
            parent: Some(parent),
            root: parent_node.root,
            ancestors,
            children: Vec::new(),
            status: Default::default(),
            result: Default::default(),
        };

        self.nodes.push(child);
        self.nodes[parent.0].children.push(id);
        Some(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&QueryNode> {
        self.nodes.get(id.0)
    }

    /// Root of the subtree containing `id`
    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.nodes[id.0].root
    }

    /// All root nodes, in submission order
    pub fn roots(&self) -> impl Iterator<Item = &QueryNode> + '_ {
        self.nodes.iter().filter(|n| n.is_root())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Index<NodeId> for QueryTree {
    type Output = QueryNode;

    fn index(&self, id: NodeId) -> &QueryNode {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for QueryTree {
    fn index_mut(&mut self, id: NodeId) -> &mut QueryNode {
        &mut self.nodes[id.0]
    }
}
