//! Persisted lockfile (`package-lock.json` / `npm-shrinkwrap.json`) model.
//!
//! Lockfile versions 2 and 3 store a flat `packages` map keyed by location.
//! Version 1 only stores a nested `dependencies` tree; it is flattened into
//! `packages` on load so that the rest of the crate sees one shape.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::LoadError;
use crate::package::Package;

/// Name of a publishable lockfile. Takes precedence over [`LOCK_FILE`].
pub const SHRINKWRAP_FILE: &str = "npm-shrinkwrap.json";

/// Name of the regular lockfile.
pub const LOCK_FILE: &str = "package-lock.json";

/// One entry of the lockfile's `packages` map.
///
/// Missing booleans mean `false`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    #[serde(default)]
    pub resolved: Option<String>,

    #[serde(default)]
    pub integrity: Option<String>,

    #[serde(default)]
    pub link: bool,

    #[serde(default)]
    pub extraneous: bool,

    #[serde(default)]
    pub dev: bool,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub dev_optional: bool,

    #[serde(default)]
    pub peer: bool,

    #[serde(default)]
    pub has_shrinkwrap: bool,

    /// Manifest fields stored alongside the record.
    #[serde(flatten)]
    pub package: Package,
}

/// An entry of a version 1 `dependencies` tree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyDependency {
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub resolved: Option<String>,

    #[serde(default)]
    pub integrity: Option<String>,

    #[serde(default)]
    pub dev: bool,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub bundled: bool,

    #[serde(default)]
    pub requires: IndexMap<String, String>,

    #[serde(default)]
    pub dependencies: IndexMap<String, LegacyDependency>,
}

impl LegacyDependency {
    fn to_record(&self, name: &str) -> LockRecord {
        // `file:` versions without an integrity are directory links
        if let Some(target) = self.version.as_deref().and_then(|v| v.strip_prefix("file:")) {
            if self.integrity.is_none() {
                return LockRecord {
                    resolved: Some(target.to_string()),
                    link: true,
                    dev: self.dev,
                    optional: self.optional,
                    ..Default::default()
                };
            }
        }

        LockRecord {
            resolved: self.resolved.clone(),
            integrity: self.integrity.clone(),
            dev: self.dev,
            optional: self.optional,
            package: Package {
                name: Some(name.to_string()),
                version: self.version.clone(),
                dependencies: self.requires.clone(),
                in_bundle: self.bundled,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Raw lockfile contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockfileData {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub lockfile_version: u32,

    #[serde(default)]
    pub requires: bool,

    #[serde(default)]
    pub packages: IndexMap<String, LockRecord>,

    #[serde(default)]
    pub dependencies: IndexMap<String, LegacyDependency>,
}

impl LockfileData {
    /// The root record only carries the lockfile's own name and version; the
    /// loader completes it from the root manifest.
    fn flatten_legacy(&mut self) {
        self.packages.insert(
            String::new(),
            LockRecord {
                package: Package {
                    name: self.name.clone(),
                    version: self.version.clone(),
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        let dependencies = std::mem::take(&mut self.dependencies);
        flatten_into(&mut self.packages, "", &dependencies);
    }
}

fn flatten_into(
    packages: &mut IndexMap<String, LockRecord>,
    prefix: &str,
    dependencies: &IndexMap<String, LegacyDependency>,
) {
    for (name, dep) in dependencies {
        let location = if prefix.is_empty() {
            format!("node_modules/{name}")
        } else {
            format!("{prefix}/node_modules/{name}")
        };
        packages.insert(location.clone(), dep.to_record(name));
        flatten_into(packages, &location, &dep.dependencies);
    }
}

/// Lockfile state a tree was loaded from.
#[derive(Debug, Clone, Default)]
pub struct Lockfile {
    /// Lockfile path (read from, or where it would live).
    pub path: PathBuf,

    /// Whether a lockfile was actually found on disk.
    pub loaded_from_disk: bool,

    /// Version 1 lockfile written before `requires` existed. Its dependency
    /// records are too incomplete to be checked against the manifest.
    pub ancient_lockfile: bool,

    /// `lockfileVersion` as found on disk.
    pub original_lockfile_version: Option<u32>,

    pub data: LockfileData,
}

impl Lockfile {
    /// Load the lockfile of the project at `root`.
    ///
    /// A missing lockfile is not an error: the result has
    /// `loaded_from_disk == false` and no records.
    pub fn load(root: &Path) -> Result<Self, LoadError> {
        for file in [SHRINKWRAP_FILE, LOCK_FILE] {
            let path = root.join(file);
            match std::fs::read_to_string(&path) {
                Ok(text) => return Self::from_json(path, &text),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(LoadError::io(path, err)),
            }
        }

        debug!("No lockfile found in {}", root.display());
        Ok(Self {
            path: root.join(LOCK_FILE),
            ..Default::default()
        })
    }

    /// Parse lockfile text as if it had been read from `path`.
    pub fn from_json(path: PathBuf, text: &str) -> Result<Self, LoadError> {
        let mut data: LockfileData =
            serde_json::from_str(text).map_err(|source| LoadError::Parse {
                path: path.clone(),
                source,
            })?;

        let version = data.lockfile_version;
        let ancient_lockfile = version < 2 && !data.requires;
        if version < 2 && data.packages.is_empty() {
            data.flatten_legacy();
        }

        Ok(Self {
            path,
            loaded_from_disk: true,
            ancient_lockfile,
            original_lockfile_version: Some(version),
            data,
        })
    }

    /// Whether this lockfile predates per-package metadata.
    pub fn is_legacy(&self) -> bool {
        self.loaded_from_disk && self.original_lockfile_version.is_none_or(|v| v < 2)
    }

    /// Replace the package data of the root record.
    pub fn set_root_package(&mut self, package: Package) {
        self.data.packages.entry(String::new()).or_default().package = package;
    }

    /// Record stored at `location`.
    pub fn get(&self, location: &str) -> Option<&LockRecord> {
        self.data.packages.get(location)
    }
}
