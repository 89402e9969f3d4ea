//! Package nodes and links.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::edge::{Edge, EdgeRef};
use crate::integrity::Integrity;
use crate::location::{is_top_location, location_path, name_from_folder};
use crate::lockfile::LockRecord;
use crate::package::Package;

/// Index of a node within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Create a new NodeId from an index.
    pub fn new(id: usize) -> Self {
        Self(id)
    }
}

/// One of the five classification flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum DepFlag {
    Extraneous,
    Dev,
    Optional,
    DevOptional,
    Peer,
}

/// Why a node is present in the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepFlags {
    pub extraneous: bool,
    pub dev: bool,
    pub optional: bool,
    pub dev_optional: bool,
    pub peer: bool,
}

impl DepFlags {
    /// No flag set: what a root always carries.
    pub const NONE: Self = Self {
        extraneous: false,
        dev: false,
        optional: false,
        dev_optional: false,
        peer: false,
    };

    /// Every flag set: the starting point of a full recomputation.
    pub const ALL: Self = Self {
        extraneous: true,
        dev: true,
        optional: true,
        dev_optional: true,
        peer: true,
    };

    /// Flags as cached in a lockfile record.
    ///
    /// `devOptional` is implied by either `dev` or `optional`.
    pub fn from_record(record: &LockRecord) -> Self {
        Self {
            extraneous: record.extraneous,
            dev: record.dev,
            optional: record.optional,
            dev_optional: record.dev_optional || record.dev || record.optional,
            peer: record.peer,
        }
    }

    pub fn get(&self, flag: DepFlag) -> bool {
        match flag {
            DepFlag::Extraneous => self.extraneous,
            DepFlag::Dev => self.dev,
            DepFlag::Optional => self.optional,
            DepFlag::DevOptional => self.dev_optional,
            DepFlag::Peer => self.peer,
        }
    }

    pub fn set(&mut self, flag: DepFlag, value: bool) {
        match flag {
            DepFlag::Extraneous => self.extraneous = value,
            DepFlag::Dev => self.dev = value,
            DepFlag::Optional => self.optional = value,
            DepFlag::DevOptional => self.dev_optional = value,
            DepFlag::Peer => self.peer = value,
        }
    }

    /// Whether any flag is set.
    pub fn any(&self) -> bool {
        self.extraneous || self.dev || self.optional || self.dev_optional || self.peer
    }
}

/// Node variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A package installed at its location.
    Node,
    /// A symlink to a package installed elsewhere. The target is `None` when
    /// it lies outside the tree.
    Link { target: Option<NodeId> },
}

/// A package resolved to one location in a tree.
///
/// Structural fields (`parent`, `fs_parent`, `children`, edges) are kept
/// consistent by [`Tree`](crate::Tree) and are read-only from outside.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,

    /// Name this node is installed under.
    pub name: CompactString,

    /// Unique key within the tree, `""` for the root.
    pub location: CompactString,

    /// Absolute install path.
    pub path: PathBuf,

    /// Absolute path of the real package folder (differs for links).
    pub realpath: PathBuf,

    /// Source the content came from.
    pub resolved: Option<String>,

    /// Content digest, if known.
    pub integrity: Option<Integrity>,

    /// Manifest data.
    pub package: Package,

    /// Cached classification flags.
    pub flags: DepFlags,

    /// Package ships its own lockfile.
    pub has_shrinkwrap: bool,

    pub(crate) kind: NodeKind,
    pub(crate) edges_out: IndexMap<CompactString, Edge>,
    pub(crate) edges_in: Vec<EdgeRef>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) fs_parent: Option<NodeId>,
    pub(crate) children: IndexMap<CompactString, NodeId>,
    pub(crate) fs_children: Vec<NodeId>,
    pub(crate) workspaces: IndexMap<CompactString, String>,
}

impl Node {
    /// Create a detached node at `location` under the project `root`.
    ///
    /// Nodes nested in `node_modules` are named after their folder; tops use
    /// the package name when it has one.
    pub fn new(root: &Path, location: impl Into<CompactString>, package: Package) -> Self {
        let location = location.into();
        let path = location_path(root, &location);
        let folder_name = name_from_folder(&path);
        let name = match package.name() {
            Some(name) if is_top_location(&location) => CompactString::from(name),
            _ => CompactString::from(folder_name),
        };

        Self {
            id: NodeId::new(0),
            name,
            location,
            realpath: path.clone(),
            path,
            resolved: None,
            integrity: None,
            package,
            flags: DepFlags::NONE,
            has_shrinkwrap: false,
            kind: NodeKind::Node,
            edges_out: IndexMap::new(),
            edges_in: Vec::new(),
            parent: None,
            fs_parent: None,
            children: IndexMap::new(),
            fs_children: Vec::new(),
            workspaces: IndexMap::new(),
        }
    }

    /// Create a detached link at `location` pointing at `realpath`.
    pub fn new_link(root: &Path, location: impl Into<CompactString>, realpath: PathBuf) -> Self {
        let mut link = Self::new(root, location, Package::default());
        link.name = CompactString::from(name_from_folder(&link.path));
        link.realpath = realpath;
        link.kind = NodeKind::Link { target: None };
        link
    }

    /// Identifier within the owning tree.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_root(&self) -> bool {
        self.location.is_empty()
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, NodeKind::Link { .. })
    }

    /// Link target, if this is a link with a target inside the tree.
    pub fn target(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Link { target } => target,
            NodeKind::Node => None,
        }
    }

    /// Whether this node is a top of the tree (loads `devDependencies`).
    pub fn is_top(&self) -> bool {
        is_top_location(&self.location)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn fs_parent(&self) -> Option<NodeId> {
        self.fs_parent
    }

    /// Node used to continue dependency resolution upwards.
    pub fn resolve_parent(&self) -> Option<NodeId> {
        self.parent.or(self.fs_parent)
    }

    /// Nesting children keyed by install name.
    pub fn children(&self) -> &IndexMap<CompactString, NodeId> {
        &self.children
    }

    pub fn fs_children(&self) -> &[NodeId] {
        &self.fs_children
    }

    pub fn edges_out(&self) -> &IndexMap<CompactString, Edge> {
        &self.edges_out
    }

    pub fn edges_in(&self) -> &[EdgeRef] {
        &self.edges_in
    }

    /// Workspace members declared by a root, keyed by name.
    pub fn workspaces(&self) -> &IndexMap<CompactString, String> {
        &self.workspaces
    }

    pub fn version(&self) -> Option<&str> {
        self.package.version.as_deref()
    }
}
