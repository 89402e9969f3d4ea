//! Dependency tree container.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use indexmap::IndexMap;

use crate::edge::{Edge, EdgeRef, EdgeType};
use crate::location::normalize;
use crate::lockfile::Lockfile;
use crate::node::{Node, NodeId, NodeKind};
use crate::package::Package;

/// A rooted dependency tree.
///
/// The tree owns every node in an arena; `inventory` maps locations to node
/// ids. Parentage, edges and link targets are ids into the same arena.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    inventory: IndexMap<CompactString, NodeId>,
    root: NodeId,
    root_path: PathBuf,
    legacy_peer_deps: bool,

    /// Lockfile this tree was loaded from, if it was loaded virtually.
    pub meta: Option<Lockfile>,
}

impl Tree {
    /// Create a tree holding only a root for the project at `root_path`.
    pub fn new(root_path: impl Into<PathBuf>, package: Package) -> Self {
        let root_path = normalize(&root_path.into());
        let root = Node::new(&root_path, "", package);
        let mut tree = Self {
            nodes: Vec::new(),
            inventory: IndexMap::new(),
            root: NodeId::new(0),
            root_path,
            legacy_peer_deps: false,
            meta: None,
        };
        tree.root = tree.add_node(root);
        tree
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &Node {
        &self.nodes[self.root.0]
    }

    /// Project root directory.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutable access to a node's data fields.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Node registered at `location`.
    pub fn get(&self, location: &str) -> Option<&Node> {
        self.id_of(location).map(|id| self.node(id))
    }

    pub fn id_of(&self, location: &str) -> Option<NodeId> {
        self.inventory.get(location).copied()
    }

    /// Location index.
    pub fn inventory(&self) -> &IndexMap<CompactString, NodeId> {
        &self.inventory
    }

    /// Every live node, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|node| self.inventory.get(node.location.as_str()) == Some(&node.id))
    }

    /// Ids of every live node, in insertion order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(Node::id).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn legacy_peer_deps(&self) -> bool {
        self.legacy_peer_deps
    }

    /// Ignore `peerDependencies` from now on and rebuild every edge.
    pub fn set_legacy_peer_deps(&mut self, legacy_peer_deps: bool) {
        if self.legacy_peer_deps == legacy_peer_deps {
            return;
        }
        self.legacy_peer_deps = legacy_peer_deps;
        for id in self.ids() {
            self.load_edges(id);
        }
    }

    /// Add a node, registering it under its location.
    ///
    /// A node previously registered at the same location is detached.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        node.id = id;
        let location = node.location.clone();
        self.nodes.push(node);

        if let Some(previous) = self.inventory.insert(location, id) {
            self.detach(previous);
        }
        self.load_edges(id);
        id
    }

    /// Register an existing node under an additional location, unless that
    /// location is already taken.
    pub fn register(&mut self, location: &str, id: NodeId) {
        self.inventory.entry(location.into()).or_insert(id);
    }

    /// Make `parent` the nesting parent of `id`, clearing any `fs_parent`.
    pub fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        self.detach(id);
        let name = self.nodes[id.0].name.clone();
        self.nodes[id.0].parent = Some(parent);
        if let Some(displaced) = self.nodes[parent.0].children.insert(name, id) {
            if displaced != id {
                self.nodes[displaced.0].parent = None;
            }
        }
    }

    /// Make `fs_parent` the filesystem parent of `id`, clearing any `parent`.
    pub fn set_fs_parent(&mut self, id: NodeId, fs_parent: NodeId) {
        self.detach(id);
        self.nodes[id.0].fs_parent = Some(fs_parent);
        self.nodes[fs_parent.0].fs_children.push(id);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            let name = self.nodes[id.0].name.clone();
            let children = &mut self.nodes[parent.0].children;
            if children.get(&name) == Some(&id) {
                children.shift_remove(&name);
            }
        }
        if let Some(fs_parent) = self.nodes[id.0].fs_parent.take() {
            self.nodes[fs_parent.0].fs_children.retain(|child| *child != id);
        }
    }

    /// Point a link at `target`, copying the target's flags and package.
    pub fn set_link_target(&mut self, link: NodeId, target: Option<NodeId>) {
        self.nodes[link.0].kind = NodeKind::Link { target };
        if let Some(target) = target {
            self.mirror_target(link, target);
        }
    }

    fn mirror_target(&mut self, link: NodeId, target: NodeId) {
        let flags = self.nodes[target.0].flags;
        let package = self.nodes[target.0].package.clone();
        let link = &mut self.nodes[link.0];
        link.flags = flags;
        link.package = package;
    }

    /// Replace a node's package, rebuilding its edges and refreshing links
    /// that point at it.
    pub fn set_package(&mut self, id: NodeId, package: Package) {
        self.nodes[id.0].package = package;
        self.load_edges(id);

        let links: Vec<NodeId> = self
            .iter()
            .filter(|node| node.target() == Some(id))
            .map(Node::id)
            .collect();
        for link in links {
            self.mirror_target(link, id);
        }
    }

    /// Set the workspace members of a node (normally the root).
    pub fn set_workspaces(&mut self, id: NodeId, workspaces: IndexMap<CompactString, String>) {
        self.nodes[id.0].workspaces = workspaces;
        self.load_edges(id);
    }

    /// Rebuild a node's outgoing edges from its package.
    ///
    /// Links have no edges of their own; their target carries them.
    pub fn load_edges(&mut self, id: NodeId) {
        self.clear_edges_out(id);

        let node = &self.nodes[id.0];
        if node.is_link() {
            return;
        }
        let edges = edge_specs(
            &node.package,
            &node.workspaces,
            node.is_top(),
            self.legacy_peer_deps,
        )
        .into_iter()
        .map(|(name, (edge_type, spec))| {
            let edge = Edge::new(edge_type, name.clone(), spec, id);
            (name, edge)
        })
        .collect();

        self.nodes[id.0].edges_out = edges;
        self.resolve_edges_from(id);
    }

    fn clear_edges_out(&mut self, id: NodeId) {
        let old = std::mem::take(&mut self.nodes[id.0].edges_out);
        for edge in old.values() {
            if let Some(to) = edge.to {
                self.nodes[to.0]
                    .edges_in
                    .retain(|r| !(r.from == id && r.name == edge.name));
            }
        }
    }

    /// Find the node a dependency named `name` of `from` resolves to.
    ///
    /// Looks at the nesting children of `from`, then of each resolve-parent
    /// up to the root.
    pub fn resolve(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = &self.nodes[id.0];
            if let Some(&child) = node.children.get(name) {
                return Some(child);
            }
            current = node.resolve_parent();
        }
        None
    }

    /// Re-resolve every edge in the tree against the current structure.
    pub fn resolve_edges(&mut self) {
        for id in self.ids() {
            self.resolve_edges_from(id);
        }
    }

    fn resolve_edges_from(&mut self, id: NodeId) {
        let names: Vec<CompactString> = self.nodes[id.0].edges_out.keys().cloned().collect();
        for name in names {
            let to = self.resolve(id, &name);
            let old = self.nodes[id.0].edges_out.get(&name).and_then(|e| e.to);
            if old == to {
                continue;
            }
            if let Some(old) = old {
                self.nodes[old.0]
                    .edges_in
                    .retain(|r| !(r.from == id && r.name == name));
            }
            if let Some(edge) = self.nodes[id.0].edges_out.get_mut(&name) {
                edge.to = to;
            }
            if let Some(to) = to {
                self.nodes[to.0].edges_in.push(EdgeRef { from: id, name });
            }
        }
    }
}

type EdgeSpecs = IndexMap<CompactString, (EdgeType, CompactString)>;

/// Edges declared by a package, one per dependency name.
///
/// Later dependency types replace earlier ones, except that workspace edges
/// are never replaced. Names listed in `optionalDependencies` are not loaded
/// again from `dependencies`.
fn edge_specs(
    package: &Package,
    workspaces: &IndexMap<CompactString, String>,
    is_top: bool,
    legacy_peer_deps: bool,
) -> EdgeSpecs {
    let mut edges = EdgeSpecs::new();

    for (name, path) in workspaces {
        edges.insert(
            name.clone(),
            (EdgeType::Workspace, format!("file:{path}").into()),
        );
    }

    add_edges(&mut edges, &package.optional_dependencies, EdgeType::Optional);

    if !legacy_peer_deps {
        for (name, spec) in &package.peer_dependencies {
            let optional = package
                .peer_dependencies_meta
                .get(name)
                .is_some_and(|meta| meta.optional);
            let edge_type = if optional {
                EdgeType::PeerOptional
            } else {
                EdgeType::Peer
            };
            add_edge(&mut edges, name, spec, edge_type);
        }
    }

    for (name, spec) in &package.dependencies {
        if !package.optional_dependencies.contains_key(name) {
            add_edge(&mut edges, name, spec, EdgeType::Prod);
        }
    }

    if is_top {
        add_edges(&mut edges, &package.dev_dependencies, EdgeType::Dev);
    }

    edges
}

fn add_edges(edges: &mut EdgeSpecs, deps: &IndexMap<String, String>, edge_type: EdgeType) {
    for (name, spec) in deps {
        add_edge(edges, name, spec, edge_type);
    }
}

fn add_edge(edges: &mut EdgeSpecs, name: &str, spec: &str, edge_type: EdgeType) {
    if edges
        .get(name)
        .is_some_and(|(existing, _)| *existing == EdgeType::Workspace)
    {
        return;
    }
    edges.insert(name.into(), (edge_type, spec.into()));
}
