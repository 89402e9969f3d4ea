//! Difference between an actual and an ideal tree.
//!
//! A Diff node does not mirror the location it refers to. It hangs off the
//! shallowest Diff node above it, so each child of the root is the highest
//! point of a branch that has to be added, removed or replaced.

use arbor_core::{Integrity, Node, NodeId, Tree};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;

/// What has to happen to a location to turn the actual tree into the ideal.
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
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Add,
    Remove,
    Change,
}

/// Action needed to turn `actual` into `ideal`; `None` when unchanged.
///
/// Only presence, root-ness, `resolved` and `integrity` of either node are
/// considered.
pub fn get_action(actual: Option<&Node>, ideal: Option<&Node>) -> Option<Action> {
    let Some(ideal) = ideal else {
        return Some(Action::Remove);
    };
    let Some(actual) = actual else {
        return Some(Action::Add);
    };

    if ideal.is_root() && actual.is_root() {
        return None;
    }

    // ideal integrity with no actual integrity counts as a change
    let unchanged = match (&ideal.integrity, &actual.integrity) {
        (None, None) => ideal.resolved == actual.resolved,
        (Some(ideal), Some(actual)) => ideal.matches(actual),
        _ => false,
    };
    if unchanged { None } else { Some(Action::Change) }
}

/// Index of a Diff node within its [`Diff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiffId(pub usize);

/// One actionable (or root) point of the diff.
#[derive(Debug, Clone)]
pub struct DiffNode {
    pub action: Option<Action>,
    /// Node in the actual tree, absent for additions.
    pub actual: Option<NodeId>,
    /// Node in the ideal tree, absent for removals.
    pub ideal: Option<NodeId>,
    pub resolved: Option<String>,
    pub integrity: Option<Integrity>,
    pub children: Vec<DiffId>,
    pub parent: Option<DiffId>,
    /// Every leaf at or below this node.
    pub leaves: Vec<DiffId>,
    /// Ideal nodes below this node that need no change.
    pub unchanged: Vec<NodeId>,
}

/// Diff graph between two trees.
///
/// Borrows both trees; neither is modified.
#[derive(Debug)]
pub struct Diff<'a> {
    actual: &'a Tree,
    ideal: &'a Tree,
    nodes: Vec<DiffNode>,
    root: DiffId,
}

impl<'a> Diff<'a> {
    /// Compute the diff needed to turn `actual` into `ideal`.
    pub fn calculate(actual: &'a Tree, ideal: &'a Tree) -> Self {
        let mut diff = Self {
            actual,
            ideal,
            nodes: Vec::new(),
            root: DiffId(0),
        };
        diff.root = diff.push(Some(actual.root_id()), Some(ideal.root_id()));
        diff.visit(diff.root);

        debug!(
            "Diff: {} leaves, {} unchanged",
            diff.root().leaves.len(),
            diff.root().unchanged.len()
        );
        diff
    }

    fn push(&mut self, actual: Option<NodeId>, ideal: Option<NodeId>) -> DiffId {
        let (actual_tree, ideal_tree) = (self.actual, self.ideal);
        let actual_node = actual.map(|id| actual_tree.node(id));
        let ideal_node = ideal.map(|id| ideal_tree.node(id));

        let node = DiffNode {
            action: get_action(actual_node, ideal_node),
            actual,
            ideal,
            resolved: ideal_node.and_then(|n| n.resolved.clone()),
            integrity: ideal_node.and_then(|n| n.integrity.clone()),
            children: Vec::new(),
            parent: None,
            leaves: Vec::new(),
            unchanged: Vec::new(),
        };
        let id = DiffId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Depth-first: enumerate children on the way down, bubble leaves and
    /// unchanged nodes up on the way back.
    fn visit(&mut self, id: DiffId) {
        let children = self.get_children(id);
        if children.is_empty() && self.nodes[id.0].action.is_some() {
            self.nodes[id.0].leaves.push(id);
        }

        for &child in &children {
            self.visit(child);
        }
        self.leave(id, children);
    }

    /// Child Diff nodes of `id`. Diff nodes with an action absorb their whole
    /// subtree and have none.
    fn get_children(&mut self, id: DiffId) -> Vec<DiffId> {
        let node = &self.nodes[id.0];
        if node.action.is_some() {
            return Vec::new();
        }
        let (actual, ideal) = (node.actual, node.ideal);

        let mut unchanged = Vec::new();
        let mut children = Vec::new();
        self.collect_children(actual, ideal, &mut unchanged, &mut children);
        self.nodes[id.0].unchanged.extend(unchanged);
        children
    }

    fn collect_children(
        &mut self,
        actual: Option<NodeId>,
        ideal: Option<NodeId>,
        unchanged: &mut Vec<NodeId>,
        children: &mut Vec<DiffId>,
    ) {
        let (actual_tree, ideal_tree) = (self.actual, self.ideal);
        let actual_kids = actual.map(|id| actual_tree.node(id).children());
        let ideal_kids = ideal.map(|id| ideal_tree.node(id).children());

        let pairs: Vec<(Option<NodeId>, Option<NodeId>)> = actual_kids
            .into_iter()
            .flat_map(|kids| kids.keys())
            .chain(ideal_kids.into_iter().flat_map(|kids| kids.keys()))
            .unique()
            .map(|name| {
                (
                    actual_kids.and_then(|kids| kids.get(name).copied()),
                    ideal_kids.and_then(|kids| kids.get(name).copied()),
                )
            })
            .collect();

        for (actual, ideal) in pairs {
            let action = get_action(
                actual.map(|id| actual_tree.node(id)),
                ideal.map(|id| ideal_tree.node(id)),
            );
            match (action, ideal) {
                (None, Some(ideal_id)) => {
                    unchanged.push(ideal_id);
                    self.collect_children(actual, ideal, unchanged, children);
                }
                _ => children.push(self.push(actual, ideal)),
            }
        }
    }

    fn leave(&mut self, id: DiffId, children: Vec<DiffId>) {
        for &child in &children {
            self.nodes[child.0].parent = Some(id);
            let leaves = self.nodes[child.0].leaves.clone();
            let unchanged = self.nodes[child.0].unchanged.clone();
            let node = &mut self.nodes[id.0];
            node.leaves.extend(leaves);
            node.unchanged.extend(unchanged);
        }
        self.nodes[id.0].children = children;
    }

    pub fn root_id(&self) -> DiffId {
        self.root
    }

    /// The Diff node pairing the two roots.
    pub fn root(&self) -> &DiffNode {
        &self.nodes[self.root.0]
    }

    pub fn node(&self, id: DiffId) -> &DiffNode {
        &self.nodes[id.0]
    }

    /// Every leaf of the diff.
    pub fn leaves(&self) -> impl Iterator<Item = &DiffNode> {
        self.root().leaves.iter().map(|&id| self.node(id))
    }

    /// Ideal nodes that need no change.
    pub fn unchanged(&self) -> impl Iterator<Item = &'a Node> + '_ {
        let ideal = self.ideal;
        self.root().unchanged.iter().map(move |&id| ideal.node(id))
    }

    pub fn actual_tree(&self) -> &'a Tree {
        self.actual
    }

    pub fn ideal_tree(&self) -> &'a Tree {
        self.ideal
    }

    /// The actual-tree node of a Diff node.
    pub fn actual_node(&self, id: DiffId) -> Option<&'a Node> {
        self.nodes[id.0].actual.map(|n| self.actual.node(n))
    }

    /// The ideal-tree node of a Diff node.
    pub fn ideal_node(&self, id: DiffId) -> Option<&'a Node> {
        self.nodes[id.0].ideal.map(|n| self.ideal.node(n))
    }

    /// Location a Diff node refers to, taken from the ideal node when present.
    pub fn location(&self, id: DiffId) -> &'a str {
        self.ideal_node(id)
            .or_else(|| self.actual_node(id))
            .map(|node| node.location.as_str())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.root().leaves.is_empty()
    }

    /// Serializable summary of the leaves and unchanged locations.
    pub fn report(&self) -> DiffReport {
        let leaves = self
            .root()
            .leaves
            .iter()
            .filter_map(|&id| {
                let node = self.node(id);
                Some(LeafReport {
                    action: node.action?,
                    location: self.location(id).to_string(),
                    resolved: node.resolved.clone(),
                    integrity: node.integrity.as_ref().map(ToString::to_string),
                })
            })
            .collect();

        DiffReport {
            leaves,
            unchanged: self.unchanged().map(|n| n.location.to_string()).collect(),
        }
    }
}

/// One leaf of a [`DiffReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafReport {
    pub action: Action,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

/// Flattened view of a [`Diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub leaves: Vec<LeafReport>,
    pub unchanged: Vec<String>,
}

impl DiffReport {
    /// Number of leaves with the given action.
    pub fn count(&self, action: Action) -> usize {
        self.leaves.iter().filter(|leaf| leaf.action == action).count()
    }
}
