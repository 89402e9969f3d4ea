//! Dependency flag propagation.
//!
//! Every node starts from some set of flags (all set, for a full
//! recomputation) and the walk clears whatever the edge graph proves wrong:
//! a node reached over a prod edge from a non-dev node is not dev, and so on.

use std::collections::HashSet;

use strum::IntoEnumIterator;

use crate::edge::EdgeType;
use crate::node::{DepFlag, DepFlags, NodeId};
use crate::tree::Tree;

/// Recomputes classification flags from the edge graph.
pub trait FlagPropagator {
    /// Recompute every node's flags in place. With `reset_root`, the root's
    /// flags are cleared first.
    fn recompute(&self, tree: &mut Tree, reset_root: bool);
}

/// Default propagator, see [`calc_dep_flags`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DepFlagCalculator;

impl FlagPropagator for DepFlagCalculator {
    fn recompute(&self, tree: &mut Tree, reset_root: bool) {
        calc_dep_flags(tree, reset_root);
    }
}

/// Walk the tree from the root along resolved edges, clearing flags that
/// the graph contradicts.
pub fn calc_dep_flags(tree: &mut Tree, reset_root: bool) {
    let root = tree.root_id();
    if reset_root {
        tree.node_mut(root).flags = DepFlags::NONE;
    }

    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        step(tree, id);

        let node = tree.node(id);
        let next: Vec<NodeId> = match node.target() {
            Some(target) => vec![target],
            None => node.edges_out().values().filter_map(|e| e.to).collect(),
        };
        // reversed so that the first edge is visited first
        stack.extend(next.into_iter().rev());
    }
}

fn step(tree: &mut Tree, id: NodeId) {
    for flag in DepFlag::iter() {
        reset_parents(tree, id, flag);
    }

    if let Some(target) = tree.node(id).target() {
        let flags = tree.node(id).flags;
        let target_flags = &mut tree.node_mut(target).flags;
        target_flags.dev = flags.dev;
        target_flags.optional = flags.optional;
        target_flags.dev_optional = flags.dev_optional;
        target_flags.peer = flags.peer;
        step(tree, target);
        return;
    }

    let edges: Vec<(EdgeType, NodeId)> = tree
        .node(id)
        .edges_out()
        .values()
        .filter_map(|e| e.to.map(|to| (e.edge_type, to)))
        .collect();

    for (edge_type, to) in edges {
        tree.node_mut(to).flags.extraneous = false;

        let node = tree.node(id).flags;
        let (dev, optional, peer) = (
            edge_type.is_dev(),
            edge_type.is_optional(),
            edge_type.is_peer(),
        );

        // devOptional stays set while in either the dev or optional tree
        let unset_dev_opt =
            !node.dev_optional && !node.dev && !node.optional && !dev && !optional;
        let unset_dev = unset_dev_opt || (!node.dev && !dev);
        let unset_opt = unset_dev_opt || (!node.optional && !optional);
        let unset_peer = !node.peer && !peer;

        if unset_peer {
            unset_flag(tree, to, DepFlag::Peer);
        }
        if unset_dev_opt {
            unset_flag(tree, to, DepFlag::DevOptional);
        }
        if unset_dev {
            unset_flag(tree, to, DepFlag::Dev);
        }
        if unset_opt {
            unset_flag(tree, to, DepFlag::Optional);
        }
    }
}

/// A flag that is clear on a node must be clear on every resolve-ancestor.
fn reset_parents(tree: &mut Tree, id: NodeId, flag: DepFlag) {
    if tree.node(id).flags.get(flag) {
        return;
    }
    let mut current = tree.node(id).resolve_parent();
    while let Some(parent) = current {
        if !tree.node(parent).flags.get(flag) {
            break;
        }
        tree.node_mut(parent).flags.set(flag, false);
        current = tree.node(parent).resolve_parent();
    }
}

/// Clear `flag` on a node and on everything it pulls in with it.
fn unset_flag(tree: &mut Tree, id: NodeId, flag: DepFlag) {
    if !tree.node(id).flags.get(flag) {
        return;
    }

    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        clear(tree, current, flag);
        let source = match tree.node(current).target() {
            Some(target) => {
                clear(tree, target, flag);
                target
            }
            None => current,
        };

        for edge in tree.node(source).edges_out().values() {
            let Some(to) = edge.to else { continue };
            let follows = match edge.edge_type {
                EdgeType::Prod | EdgeType::Workspace => true,
                EdgeType::Peer => flag != DepFlag::Peer,
                _ => false,
            };
            if follows && tree.node(to).flags.get(flag) {
                stack.push(to);
            }
        }
    }
}

fn clear(tree: &mut Tree, id: NodeId, flag: DepFlag) {
    let flags = &mut tree.node_mut(id).flags;
    flags.extraneous = false;
    flags.set(flag, false);
}
