//! Virtual tree loading.
//!
//! A virtual tree is rebuilt purely from lockfile records, without looking at
//! what is installed in `node_modules`. The lockfile is trusted for structure
//! but its cached dependency flags are only trusted while the root manifest
//! still agrees with the lockfile's root record.

use std::path::{Path, PathBuf};

use arbor_core::{
    DepFlagCalculator, DepFlags, EdgeType, FlagPropagator, Integrity, LoadConfig, LoadError,
    LockRecord, Lockfile, Node, NodeId, Package, Tree, consistent_resolve, name_from_folder,
    normalize, relative_location,
};
use compact_str::CompactString;
use itertools::Itertools;
use tracing::{debug, info};

use crate::manifest::{FsManifestReader, ManifestReader};
use crate::workspaces::Workspaces;

/// One root edge reduced to what the consistency check compares.
type EdgeKey = (EdgeType, CompactString, CompactString);

/// Loads a [`Tree`] from the project's lockfile.
#[derive(Debug)]
pub struct VirtualLoader<R = FsManifestReader, P = DepFlagCalculator> {
    config: LoadConfig,
    root_path: PathBuf,
    reader: R,
    propagator: P,
    virtual_tree: Option<Tree>,
    flags_suspect: bool,
}

impl VirtualLoader {
    /// Create a loader reading manifests from disk.
    pub fn new(config: LoadConfig) -> Self {
        Self::with_collaborators(config, FsManifestReader, DepFlagCalculator)
    }
}

impl<R: ManifestReader, P: FlagPropagator> VirtualLoader<R, P> {
    /// Create a loader with custom manifest reading and flag propagation.
    pub fn with_collaborators(config: LoadConfig, reader: R, propagator: P) -> Self {
        let root_path = std::path::absolute(&config.root)
            .map(|path| normalize(&path))
            .unwrap_or_else(|_| normalize(&config.root));

        Self {
            config,
            root_path,
            reader,
            propagator,
            virtual_tree: None,
            flags_suspect: false,
        }
    }

    /// Use an already loaded tree; [`load_virtual`](Self::load_virtual) will
    /// return it as is.
    pub fn with_tree(mut self, tree: Tree) -> Self {
        self.virtual_tree = Some(tree);
        self
    }

    /// Whether the lockfile's cached flags were found to be untrustworthy.
    pub fn flags_suspect(&self) -> bool {
        self.flags_suspect
    }

    /// Absolute project root.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// The loaded tree, if any.
    pub fn tree(&self) -> Option<&Tree> {
        self.virtual_tree.as_ref()
    }

    pub fn into_tree(self) -> Option<Tree> {
        self.virtual_tree
    }

    /// Load the virtual tree, or return the one already loaded.
    ///
    /// When `root` is given it becomes the tree's root instead of a node read
    /// from `package.json`; if it already carries a lockfile as `meta`, that
    /// lockfile is used instead of reading one from disk.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::MissingLockfile`] when there is no lockfile and no
    /// root was supplied, and I/O or parse errors from reading the lockfile.
    pub fn load_virtual(&mut self, root: Option<Tree>) -> Result<&Tree, LoadError> {
        let tree = match self.virtual_tree.take() {
            Some(tree) => tree,
            None => self.build(root)?,
        };
        Ok(self.virtual_tree.insert(tree))
    }

    fn build(&mut self, root: Option<Tree>) -> Result<Tree, LoadError> {
        match root {
            Some(mut root) => {
                let lock = match root.meta.take() {
                    Some(lock) => lock,
                    None => Lockfile::load(&self.root_path)?,
                };
                Ok(self.load_from_shrinkwrap(lock, root))
            }
            None => {
                let lock = Lockfile::load(&self.root_path)?;
                if !lock.loaded_from_disk {
                    return Err(LoadError::MissingLockfile {
                        path: self.root_path.clone(),
                    });
                }
                let root = self.load_root(&lock);
                Ok(self.load_from_shrinkwrap(lock, root))
            }
        }
    }

    /// Root node from `package.json`, falling back to the lockfile's root
    /// record.
    fn load_root(&self, lock: &Lockfile) -> Tree {
        let package = match self.reader.read(&self.root_path) {
            Ok(package) => package,
            Err(err) => {
                debug!("Using lockfile root record: {err}");
                lock.get("")
                    .map(|record| record.package.clone())
                    .unwrap_or_default()
            }
        };

        let mut tree = Tree::new(&self.root_path, package);
        if self.config.workspaces {
            self.load_workspaces(&mut tree);
        }
        tree
    }

    fn load_workspaces(&self, tree: &mut Tree) {
        let patterns = tree.root().package.workspace_patterns().to_vec();
        if patterns.is_empty() {
            return;
        }
        let members = Workspaces::on_disk(&self.root_path, &patterns, &self.reader);
        debug!("Found {} workspace(s) on disk", members.len());
        if !members.is_empty() {
            let root = tree.root_id();
            tree.set_workspaces(root, members);
        }
    }

    fn load_from_shrinkwrap(&mut self, mut lock: Lockfile, mut tree: Tree) -> Tree {
        tree.set_legacy_peer_deps(self.config.legacy_peer_deps);
        if lock.is_legacy() {
            // version 1 lockfiles keep no root record of their own
            lock.set_root_package(tree.root().package.clone());
        }

        let root = tree.root_id();
        tree.node_mut(root).flags = DepFlags::NONE;
        self.check_root_edges(&lock, &tree);

        let links = self.resolve_nodes(&lock, &mut tree);
        self.resolve_links(&links, lock.is_legacy(), &mut tree);
        self.assign_parentage(&mut tree);
        tree.resolve_edges();

        if self.flags_suspect {
            self.recalc_dep_flags(&mut tree);
        }

        tree.meta = Some(lock);
        tree
    }

    /// Compare the root's edges against the lockfile's root record.
    ///
    /// Skipped for lockfiles that were not read from disk and for ancient
    /// lockfiles, whose root record cannot be relied on.
    fn check_root_edges(&mut self, lock: &Lockfile, tree: &Tree) {
        if !lock.loaded_from_disk || lock.ancient_lockfile {
            return;
        }

        let expected = self.lock_root_edges(lock);
        let actual: Vec<EdgeKey> = tree
            .root()
            .edges_out()
            .values()
            .map(|edge| (edge.edge_type, edge.name.clone(), edge.spec.clone()))
            .sorted_by(|a, b| sort_key(a).cmp(&sort_key(b)))
            .collect();

        if actual != expected {
            debug!(
                "Root has {} edge(s), lockfile records {}",
                actual.len(),
                expected.len()
            );
            self.flags_suspect = true;
        }
    }

    fn lock_root_edges(&self, lock: &Lockfile) -> Vec<EdgeKey> {
        let empty = Package::default();
        let package = lock.get("").map_or(&empty, |record| &record.package);

        let mut edges: Vec<EdgeKey> = Vec::new();
        let mut push = |edge_type: EdgeType, name: &str, spec: &str| {
            edges.push((edge_type, name.into(), spec.into()));
        };

        for (name, spec) in &package.dependencies {
            if !package.optional_dependencies.contains_key(name) {
                push(EdgeType::Prod, name, spec);
            }
        }
        for (name, spec) in &package.dev_dependencies {
            push(EdgeType::Dev, name, spec);
        }
        for (name, spec) in &package.optional_dependencies {
            push(EdgeType::Optional, name, spec);
        }
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
            push(edge_type, name, spec);
        }
        if self.config.workspaces {
            for (name, path) in Workspaces::from_lockfile(lock) {
                push(EdgeType::Workspace, &name, &format!("file:{path}"));
            }
        }

        edges.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        edges
    }

    /// Create a node for every non-root, non-link record. Link records are
    /// returned for [`resolve_links`](Self::resolve_links).
    fn resolve_nodes<'l>(
        &self,
        lock: &'l Lockfile,
        tree: &mut Tree,
    ) -> Vec<(&'l str, &'l LockRecord)> {
        let mut links = Vec::new();
        for (location, record) in &lock.data.packages {
            if location.is_empty() {
                continue;
            }
            if record.link {
                links.push((location.as_str(), record));
            } else {
                self.load_node(tree, location, record);
            }
        }
        links
    }

    fn load_node(&self, tree: &mut Tree, location: &str, record: &LockRecord) -> NodeId {
        let mut package = record.package.clone();
        if package.name.is_none() {
            package.name = Some(name_from_folder(&self.root_path.join(location)));
        }

        let mut node = Node::new(&self.root_path, location, package);
        node.resolved = consistent_resolve(record.resolved.as_deref(), &self.root_path);
        node.integrity = record.integrity.as_deref().and_then(Integrity::parse);
        node.has_shrinkwrap = record.has_shrinkwrap;
        node.flags = DepFlags::from_record(record);
        tree.add_node(node)
    }

    fn resolve_links(&self, links: &[(&str, &LockRecord)], legacy: bool, tree: &mut Tree) {
        for &(location, record) in links {
            let Some(resolved) = record.resolved.as_deref().filter(|r| !r.is_empty()) else {
                debug!("Link {location} records no target");
                let mut link =
                    Node::new_link(&self.root_path, location, self.root_path.join(location));
                link.flags = DepFlags::from_record(record);
                tree.add_node(link);
                continue;
            };

            let target_path = normalize(&self.root_path.join(resolved));
            let target_location = relative_location(&self.root_path, &target_path);
            let target = tree.id_of(&target_location);

            let mut link = Node::new_link(&self.root_path, location, target_path);
            link.resolved = Some(format!("file:{target_location}"));
            link.flags = DepFlags::from_record(record);
            let link = tree.add_node(link);
            tree.set_link_target(link, target);

            match target {
                Some(target) => tree.register(&target_location, target),
                None => debug!("Link {location} has no lockfile record at {target_location}"),
            }

            if legacy {
                self.enrich_legacy_link(tree, link, &target_location);
            }
        }
    }

    /// Old lockfiles do not record link targets' dependencies; read them from
    /// the target folder when it exists inside the project.
    fn enrich_legacy_link(&self, tree: &mut Tree, link: NodeId, target_location: &str) {
        if !within_root(target_location) {
            return;
        }

        let realpath = tree.node(link).realpath.clone();
        let package = match self.reader.read(&realpath) {
            Ok(package) => package,
            Err(err) => {
                debug!("Keeping lockfile data for link target: {err}");
                return;
            }
        };

        match tree.node(link).target() {
            Some(target) => tree.set_package(target, package),
            None => {
                // the target inherits what the lockfile says about the link
                let mut node = Node::new(&self.root_path, target_location, package);
                node.flags = tree.node(link).flags;
                let target = tree.add_node(node);
                tree.set_link_target(link, Some(target));
            }
        }
    }

    /// Attach every node to the nearest ancestor folder that holds a node.
    ///
    /// A node directly inside `<ancestor>/node_modules` is nested under it;
    /// anything else only has it as filesystem parent. Also records bundled
    /// children in their parent's `bundleDependencies`.
    pub(crate) fn assign_parentage(&self, tree: &mut Tree) {
        let root = tree.root_id();
        for id in tree.ids() {
            if id == root {
                continue;
            }
            let node = tree.node(id);
            let Some(dir) = node.path.parent() else {
                continue;
            };

            let found = dir.ancestors().find_map(|ancestor| {
                let location = relative_location(&self.root_path, ancestor);
                tree.id_of(&location).map(|parent| (location, parent))
            });
            let Some((parent_location, parent)) = found else {
                continue;
            };

            let name = node.name.clone();
            let nested = if parent_location.is_empty() {
                format!("node_modules/{name}")
            } else {
                format!("{parent_location}/node_modules/{name}")
            };

            if node.location != nested {
                if node.fs_parent() != Some(parent) {
                    tree.set_fs_parent(id, parent);
                }
                continue;
            }

            if node.parent() != Some(parent) {
                tree.set_parent(id, parent);
            }

            let in_bundle = tree.node(id).package.in_bundle;
            let parent_node = tree.node(parent);
            if in_bundle
                && parent_node.edges_out().contains_key(name.as_str())
                && !parent_node.package.in_bundle
            {
                tree.node_mut(parent).package.add_bundle_dependency(&name);
            }
        }
    }

    fn recalc_dep_flags(&self, tree: &mut Tree) {
        info!("Lockfile root is out of date with package.json, recalculating dependency flags");
        for id in tree.ids() {
            tree.node_mut(id).flags = DepFlags::ALL;
        }
        self.propagator.recompute(tree, true);
    }
}

/// Whether a location names a folder below the project root.
fn within_root(location: &str) -> bool {
    !location.is_empty()
        && !location.starts_with('/')
        && location.split('/').next() != Some("..")
}

/// Edges sort by type name, then dependency name.
fn sort_key(edge: &EdgeKey) -> (&str, &str) {
    (edge.0.as_ref(), edge.1.as_str())
}

impl<R, P> VirtualLoader<R, P> {
    /// Configuration this loader was created with.
    pub fn config(&self) -> &LoadConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::MANIFEST_FILE;
    use tempfile::TempDir;

    fn write(dir: &Path, file: &str, contents: &str) {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_bundle_inference_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            MANIFEST_FILE,
            r#"{"name": "app", "dependencies": {"a": "^1.0.0"}}"#,
        );
        write(
            temp.path(),
            "package-lock.json",
            r#"{
                "lockfileVersion": 3,
                "packages": {
                    "": {"name": "app", "dependencies": {"a": "^1.0.0"}},
                    "node_modules/a": {"version": "1.0.0", "dependencies": {"b": "^1.0.0"}},
                    "node_modules/a/node_modules/b": {"version": "1.0.0", "inBundle": true}
                }
            }"#,
        );

        let mut loader = VirtualLoader::new(LoadConfig::new(temp.path()));
        loader.load_virtual(None).unwrap();
        let mut tree = loader.virtual_tree.take().unwrap();

        loader.assign_parentage(&mut tree);
        loader.assign_parentage(&mut tree);

        let a = tree.get("node_modules/a").unwrap();
        assert_eq!(a.package.bundle_dependency_names(), ["b"]);
        let b = tree.get("node_modules/a/node_modules/b").unwrap();
        assert_eq!(b.parent(), Some(a.id()));
    }

    #[test]
    fn test_within_root() {
        assert!(within_root("packages/w"));
        assert!(within_root("node_modules/a"));
        assert!(!within_root(""));
        assert!(!within_root("../other"));
        assert!(!within_root("/elsewhere/a"));
    }

    #[test]
    fn test_sort_key_orders_by_type_name() {
        let mut edges: Vec<EdgeKey> = vec![
            (EdgeType::Workspace, "w".into(), "file:w".into()),
            (EdgeType::Prod, "b".into(), "1".into()),
            (EdgeType::PeerOptional, "p".into(), "1".into()),
            (EdgeType::Dev, "a".into(), "1".into()),
            (EdgeType::Prod, "a".into(), "1".into()),
        ];
        edges.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        let order: Vec<(&str, &str)> = edges.iter().map(sort_key).collect();
        assert_eq!(
            order,
            [
                ("dev", "a"),
                ("peerOptional", "p"),
                ("prod", "a"),
                ("prod", "b"),
                ("workspace", "w"),
            ]
        );
    }
}
