//! Query node: the recursive unit of work and result

use crate::irr::{ObjectType, Protocol, ProtocolSet};
use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::sync::Arc;

/// Prefixes per origin aut-num; `None` is the "no origin" key used by route-sets
pub type OriginMap = IndexMap<Option<String>, IndexSet<String>>;

/// Per-protocol result of a query
pub type RouteTable = IndexMap<Protocol, OriginMap>;

/// Index of a node inside its [`QueryTree`](super::QueryTree)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Processing status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// Source and protocol filters shared by a root and all of its descendants
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryFilter {
    /// Authoritative sources; empty means any source
    pub sources: Vec<String>,

    /// Protocols to resolve
    pub protocols: ProtocolSet,
}

impl QueryFilter {
    /// Create a filter, dropping blank and duplicate source names
    pub fn new<I, S>(sources: I, protocols: ProtocolSet) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for source in sources {
            let source = source.as_ref().trim();
            if !source.is_empty() && !unique.iter().any(|s| s.eq_ignore_ascii_case(source)) {
                unique.push(source.to_string());
            }
        }

        Self {
            sources: unique,
            protocols,
        }
    }

    /// Source filter in the form used for cache keys
    pub fn normalized_sources(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A single object being resolved
#[derive(Debug)]
pub struct QueryNode {
    pub(crate) id: NodeId,
    pub(crate) object: Option<String>,
    pub(crate) filter: Arc<QueryFilter>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) root: NodeId,
    /// Object names from the root down to this node, inclusive
    pub(crate) ancestors: Vec<String>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) status: QueryStatus,
    pub(crate) result: RouteTable,
}

impl QueryNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn object(&self) -> Option<&str> {
        self.object.as_deref()
    }

    pub fn object_type(&self) -> Option<ObjectType> {
        self.object.as_deref().and_then(ObjectType::of)
    }

    pub fn filter(&self) -> &Arc<QueryFilter> {
        &self.filter
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_root(&self) -> bool {
        self.root == self.id
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn ancestor_objects(&self) -> &[String] {
        &self.ancestors
    }

    /// Check if an object already appears on the path from the root to this node
    pub fn is_ancestor_object(&self, object: &str) -> bool {
        self.ancestors.iter().any(|a| a.eq_ignore_ascii_case(object))
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn succeeded(&self) -> bool {
        self.status == QueryStatus::Succeeded
    }

    pub fn failed(&self) -> bool {
        self.status == QueryStatus::Failed
    }

    pub fn result(&self) -> &RouteTable {
        &self.result
    }

    /// Ensure every origin has an entry for each filtered protocol
    pub fn record_origins<I, S>(&mut self, origins: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins: Vec<String> = origins.into_iter().map(|o| o.as_ref().to_string()).collect();

        for protocol in self.filter.protocols.iter() {
            let by_origin = self.result.entry(protocol).or_default();
            for origin in &origins {
                by_origin.entry(Some(origin.clone())).or_default();
            }
        }
    }

    /// Append prefixes for an origin, skipping ones already recorded
    pub fn record_prefixes<I, S>(&mut self, prefixes: I, origin: Option<&str>, protocol: Protocol)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let recorded = self
            .result
            .entry(protocol)
            .or_default()
            .entry(origin.map(str::to_string))
            .or_default();

        for prefix in prefixes {
            if !recorded.contains(prefix.as_ref()) {
                recorded.insert(prefix.as_ref().to_string());
            }
        }
    }

    pub fn mark_succeeded(&mut self) {
        self.status = QueryStatus::Succeeded;
    }

    pub fn mark_failed(&mut self) {
        self.status = QueryStatus::Failed;
    }
}
