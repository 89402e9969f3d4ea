//! Loader configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Configuration for loading a virtual tree.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct LoadConfig {
    /// Project root holding `package.json` and the lockfile.
    pub root: PathBuf,

    /// Ignore `peerDependencies` when building edges.
    #[builder(default = "false")]
    #[serde(default)]
    pub legacy_peer_deps: bool,

    /// Resolve workspace members of the root package.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub workspaces: bool,
}

fn default_true() -> bool {
    true
}

impl LoadConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        Ok(())
    }
}

impl LoadConfig {
    /// Create a new load config builder.
    pub fn builder() -> LoadConfigBuilder {
        LoadConfigBuilder::default()
    }

    /// Create a simple config for loading the project at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            legacy_peer_deps: false,
            workspaces: true,
        }
    }
}

impl From<LoadConfigBuilderError> for LoadError {
    fn from(err: LoadConfigBuilderError) -> Self {
        LoadError::InvalidConfig {
            message: err.to_string(),
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
