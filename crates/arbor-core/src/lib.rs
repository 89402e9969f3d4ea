//! Core types for arbor.
//!
//! This crate provides the dependency tree model shared by the loader and
//! the diff engine: nodes, links and edges owned by a [`Tree`], the package
//! manifest and lockfile models, integrity digests, and the dependency flag
//! propagation pass.

mod config;
mod edge;
mod error;
mod flags;
mod integrity;
mod location;
mod lockfile;
mod node;
mod package;
mod tree;

pub use config::{LoadConfig, LoadConfigBuilder, LoadConfigBuilderError};
pub use edge::{Edge, EdgeRef, EdgeType};
pub use error::{LoadError, ManifestError};
pub use flags::{DepFlagCalculator, FlagPropagator, calc_dep_flags};
pub use integrity::{Hash, Integrity};
pub use location::{
    consistent_resolve, is_top_location, location_path, name_from_folder, normalize,
    relative_location,
};
pub use lockfile::{LOCK_FILE, LegacyDependency, LockRecord, Lockfile, LockfileData, SHRINKWRAP_FILE};
pub use node::{DepFlag, DepFlags, Node, NodeId, NodeKind};
pub use package::{BundleDependencies, MANIFEST_FILE, Package, PeerMeta, WorkspaceConfig};
pub use tree::Tree;
