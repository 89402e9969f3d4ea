//! Virtual tree loading for arbor.
//!
//! This crate rebuilds a dependency tree from a project's lockfile without
//! touching `node_modules`.
//!
//! # Overview
//!
//! `arbor-load` turns the flat `packages` map of a lockfile back into a tree:
//!
//! - **Root** from `package.json`, with workspace members discovered on disk
//! - **Consistency check** of the root's edges against the lockfile's root
//!   record; a mismatch marks the cached dependency flags as suspect
//! - **Links** resolved to the nodes they point at
//! - **Parentage** rebuilt from locations, inferring bundled dependencies
//! - **Reclassification** of every node when the flags are suspect
//!
//! # Example
//!
//! ```rust,no_run
//! use arbor_load::{LoadConfig, VirtualLoader};
//!
//! let mut loader = VirtualLoader::new(LoadConfig::new("/path/to/project"));
//! let tree = loader.load_virtual(None).unwrap();
//!
//! for node in tree.iter() {
//!     println!("{} {}", node.location, node.version().unwrap_or("-"));
//! }
//! ```

mod loader;
mod manifest;
mod workspaces;

pub use loader::VirtualLoader;
pub use manifest::{FsManifestReader, ManifestReader};
pub use workspaces::{WorkspaceMap, WorkspacePatterns, Workspaces};

// Re-export core types for convenience
pub use arbor_core::{
    DepFlagCalculator, DepFlags, FlagPropagator, LoadConfig, LoadError, Lockfile, Node, NodeId,
    Tree,
};
