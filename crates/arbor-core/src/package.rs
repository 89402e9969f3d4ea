//! Package manifest (`package.json`) model.
//!
//! Only the fields the tree cares about are modelled; anything else in the
//! file is ignored.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// File name of a package manifest.
pub const MANIFEST_FILE: &str = "package.json";

/// Metadata attached to a peer dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMeta {
    #[serde(default)]
    pub optional: bool,
}

/// `bundleDependencies` is either a list of names or a boolean meaning
/// "all of `dependencies`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleDependencies {
    All(bool),
    Names(Vec<String>),
}

/// `workspaces` is either a list of globs or an object with a `packages` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkspaceConfig {
    Patterns(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

/// Manifest data associated with an installed package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dev_dependencies: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub optional_dependencies: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub peer_dependencies: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub peer_dependencies_meta: IndexMap<String, PeerMeta>,

    #[serde(
        default,
        alias = "bundledDependencies",
        skip_serializing_if = "Option::is_none"
    )]
    pub bundle_dependencies: Option<BundleDependencies>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspaces: Option<WorkspaceConfig>,

    /// Set on lockfile records of packages shipped inside a parent's bundle.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub in_bundle: bool,
}

impl Package {
    /// Read and parse a manifest file.
    pub fn from_json_file(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Package name, if declared.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Workspace glob patterns declared by this package.
    pub fn workspace_patterns(&self) -> &[String] {
        match &self.workspaces {
            Some(WorkspaceConfig::Patterns(patterns)) => patterns,
            Some(WorkspaceConfig::Object { packages }) => packages,
            None => &[],
        }
    }

    /// Whether `name` is shipped inside this package's bundle.
    pub fn bundles(&self, name: &str) -> bool {
        match &self.bundle_dependencies {
            Some(BundleDependencies::All(all)) => *all && self.dependencies.contains_key(name),
            Some(BundleDependencies::Names(names)) => names.iter().any(|n| n == name),
            None => false,
        }
    }

    /// Record `name` as a bundled dependency.
    ///
    /// Returns `false` when it was already listed.
    pub fn add_bundle_dependency(&mut self, name: &str) -> bool {
        if self.bundles(name) {
            return false;
        }
        match &mut self.bundle_dependencies {
            Some(BundleDependencies::Names(names)) => names.push(name.to_string()),
            Some(BundleDependencies::All(true)) => return false,
            Some(BundleDependencies::All(false)) | None => {
                self.bundle_dependencies = Some(BundleDependencies::Names(vec![name.to_string()]));
            }
        }
        true
    }

    /// Names listed in `bundleDependencies`.
    pub fn bundle_dependency_names(&self) -> Vec<&str> {
        match &self.bundle_dependencies {
            Some(BundleDependencies::All(true)) => {
                self.dependencies.keys().map(String::as_str).collect()
            }
            Some(BundleDependencies::Names(names)) => names.iter().map(String::as_str).collect(),
            Some(BundleDependencies::All(false)) | None => Vec::new(),
        }
    }
}
