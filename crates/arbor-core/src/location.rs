//! Conversions between tree locations and filesystem paths.
//!
//! A location is the `/`-separated path of a node relative to the project
//! root (`""` for the root itself). Paths are handled lexically: nothing here
//! touches the filesystem.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path, folding `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the filesystem root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Location of `path` relative to `from`, using `/` separators.
///
/// Paths outside `from` produce leading `..` segments.
pub fn relative_location(from: &Path, path: &Path) -> String {
    let from = normalize(from);
    let path = normalize(path);
    let from_parts: Vec<Component<'_>> = from.components().collect();
    let path_parts: Vec<Component<'_>> = path.components().collect();

    let common = from_parts
        .iter()
        .zip(&path_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();
    segments.extend(std::iter::repeat_n("..".to_string(), from_parts.len() - common));
    segments.extend(
        path_parts[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    segments.join("/")
}

/// Absolute path of a location under `root`.
pub fn location_path(root: &Path, location: &str) -> PathBuf {
    if location.is_empty() {
        normalize(root)
    } else {
        normalize(&root.join(location))
    }
}

/// Guess a package name from its install folder.
///
/// Scoped packages live in an `@scope` folder, so the parent folder is kept
/// when it starts with `@`.
pub fn name_from_folder(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match path.parent().and_then(Path::file_name) {
        Some(scope) if scope.to_string_lossy().starts_with('@') => {
            format!("{}/{base}", scope.to_string_lossy())
        }
        _ => base,
    }
}

/// Whether a location is a top of the tree: the root, or anything that is not
/// installed inside a `node_modules` folder (workspace and link targets).
pub fn is_top_location(location: &str) -> bool {
    location.is_empty() || !location.split('/').any(|segment| segment == "node_modules")
}

/// Normalize a `resolved` value so that equal sources compare equal.
///
/// `file:` specs are re-expressed relative to the project root; everything
/// else (registry URLs, git refs) passes through untouched.
pub fn consistent_resolve(resolved: Option<&str>, root: &Path) -> Option<String> {
    let resolved = resolved?;
    match resolved.strip_prefix("file:") {
        Some(spec) => {
            let target = normalize(&root.join(spec));
            let rel = relative_location(root, &target);
            Some(format!("file:{}", if rel.is_empty() { "." } else { &rel }))
        }
        None => Some(resolved.to_string()),
    }
}
