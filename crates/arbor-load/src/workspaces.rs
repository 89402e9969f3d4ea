//! Workspace member discovery.
//!
//! Workspace globs come from the root package's `workspaces` field. Members
//! are matched either against the locations recorded in a lockfile (when
//! checking the lockfile against itself) or against folders on disk holding
//! a `package.json`.

use std::path::Path;

use arbor_core::{Lockfile, is_top_location, name_from_folder, relative_location};
use compact_str::CompactString;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use jwalk::{Parallelism, WalkDir};
use tracing::debug;

use crate::manifest::ManifestReader;

/// Workspace members keyed by package name, valued by project-relative path.
pub type WorkspaceMap = IndexMap<CompactString, String>;

/// Compiled `workspaces` patterns. `!`-prefixed patterns exclude.
#[derive(Debug, Clone)]
pub struct WorkspacePatterns {
    include: GlobSet,
    exclude: GlobSet,
}

impl WorkspacePatterns {
    /// Compile patterns, skipping invalid globs.
    pub fn new(patterns: &[String]) -> Self {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();

        for pattern in patterns {
            let (negated, pattern) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, pattern.as_str()),
            };
            let pattern = pattern.trim_start_matches("./").trim_end_matches('/');
            match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) if negated => {
                    exclude.add(glob);
                }
                Ok(glob) => {
                    include.add(glob);
                }
                Err(err) => debug!("Skipping invalid workspace pattern {pattern:?}: {err}"),
            }
        }

        Self {
            include: include.build().unwrap_or_else(|_| GlobSet::empty()),
            exclude: exclude.build().unwrap_or_else(|_| GlobSet::empty()),
        }
    }

    /// Whether a project-relative folder is a workspace member.
    pub fn is_match(&self, location: &str) -> bool {
        self.include.is_match(location) && !self.exclude.is_match(location)
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }
}

/// Resolves the workspace members of a project.
#[derive(Debug, Clone, Copy, Default)]
pub struct Workspaces;

impl Workspaces {
    /// Workspace members recorded in a lockfile.
    ///
    /// Uses the patterns of the lockfile's root record; a member is any
    /// non-link record outside `node_modules` whose location matches.
    pub fn from_lockfile(lockfile: &Lockfile) -> WorkspaceMap {
        let mut members = WorkspaceMap::new();
        let Some(root) = lockfile.get("") else {
            return members;
        };
        let patterns = WorkspacePatterns::new(root.package.workspace_patterns());
        if patterns.is_empty() {
            return members;
        }

        for (location, record) in &lockfile.data.packages {
            if location.is_empty() || record.link || !is_top_location(location) {
                continue;
            }
            if patterns.is_match(location) {
                let name = record
                    .package
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| name_from_folder(Path::new(location)));
                members.insert(name.into(), location.clone());
            }
        }
        members
    }

    /// Workspace members found on disk under `root`.
    ///
    /// Folders inside `node_modules` and hidden folders are never members; a
    /// matching folder without a readable manifest is skipped.
    pub fn on_disk(
        root: &Path,
        patterns: &[String],
        reader: &impl ManifestReader,
    ) -> WorkspaceMap {
        let mut members = WorkspaceMap::new();
        let patterns = WorkspacePatterns::new(patterns);
        if patterns.is_empty() {
            return members;
        }

        let walker = WalkDir::new(root)
            .skip_hidden(true)
            .sort(true)
            .parallelism(Parallelism::Serial)
            .min_depth(1)
            .process_read_dir(|_depth, _path, _state, children| {
                children.retain(|entry| {
                    entry.as_ref().is_ok_and(|e| {
                        e.file_type().is_dir() && e.file_name().to_string_lossy() != "node_modules"
                    })
                });
            });

        for entry in walker.into_iter().flatten() {
            let path = entry.path();
            let location = relative_location(root, &path);
            if !patterns.is_match(&location) {
                continue;
            }
            match reader.read(&path) {
                Ok(package) => {
                    let name = package
                        .name()
                        .map(str::to_string)
                        .unwrap_or_else(|| name_from_folder(&path));
                    members.insert(name.into(), location);
                }
                Err(err) => debug!("Skipping workspace folder {}: {err}", path.display()),
            }
        }
        members
    }
}
