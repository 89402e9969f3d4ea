//! Dependency edges between nodes.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::node::NodeId;

/// Kind of dependency declaration an edge comes from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum EdgeType {
    Prod,
    Dev,
    Optional,
    Peer,
    PeerOptional,
    Workspace,
}

impl EdgeType {
    /// Edge only needed for development.
    pub fn is_dev(self) -> bool {
        matches!(self, Self::Dev)
    }

    /// Edge whose absence is tolerated.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::Optional | Self::PeerOptional)
    }

    /// Edge the dependent expects its own dependent to provide.
    pub fn is_peer(self) -> bool {
        matches!(self, Self::Peer | Self::PeerOptional)
    }
}

/// A dependency declared by one node, resolved to at most one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub edge_type: EdgeType,
    pub name: CompactString,
    pub spec: CompactString,
    pub from: NodeId,
    pub to: Option<NodeId>,
}

impl Edge {
    /// Create an unresolved edge.
    pub fn new(
        edge_type: EdgeType,
        name: impl Into<CompactString>,
        spec: impl Into<CompactString>,
        from: NodeId,
    ) -> Self {
        Self {
            edge_type,
            name: name.into(),
            spec: spec.into(),
            from,
            to: None,
        }
    }

    /// Whether the edge found a node to point at.
    pub fn is_resolved(&self) -> bool {
        self.to.is_some()
    }
}

/// Back-reference from a node to an edge pointing at it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    pub from: NodeId,
    pub name: CompactString,
}
