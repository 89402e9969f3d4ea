use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use arbor_core::{DepFlags, EdgeType, LOCK_FILE, MANIFEST_FILE, Package};
use arbor_load::{
    DepFlagCalculator, FlagPropagator, FsManifestReader, LoadConfig, Lockfile, Tree,
    VirtualLoader,
};
use tempfile::TempDir;

fn write(dir: &Path, file: &str, contents: &str) {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn project(manifest: Option<&str>, lockfile: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    if let Some(manifest) = manifest {
        write(temp.path(), MANIFEST_FILE, manifest);
    }
    write(temp.path(), LOCK_FILE, lockfile);
    temp
}

fn load(dir: &Path) -> (Tree, bool) {
    let mut loader = VirtualLoader::new(LoadConfig::new(dir));
    loader.load_virtual(None).unwrap();
    let suspect = loader.flags_suspect();
    (loader.into_tree().unwrap(), suspect)
}

/// Counts how often flags get recomputed.
#[derive(Clone, Default)]
struct Spy(Rc<Cell<usize>>);

impl FlagPropagator for Spy {
    fn recompute(&self, tree: &mut Tree, reset_root: bool) {
        self.0.set(self.0.get() + 1);
        DepFlagCalculator.recompute(tree, reset_root);
    }
}

#[test]
fn test_missing_lockfile_is_an_error() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), MANIFEST_FILE, r#"{"name": "app"}"#);

    let mut loader = VirtualLoader::new(LoadConfig::new(temp.path()));
    let err = loader.load_virtual(None).unwrap_err();
    assert!(err.is_missing_lockfile());
    assert!(loader.tree().is_none());
}

#[test]
fn test_supplied_root_without_lockfile() {
    let temp = TempDir::new().unwrap();
    let root = Tree::new(
        temp.path(),
        Package {
            name: Some("app".into()),
            ..Default::default()
        },
    );

    let mut loader = VirtualLoader::new(LoadConfig::new(temp.path()));
    let tree = loader.load_virtual(Some(root)).unwrap();

    assert_eq!(tree.len(), 1);
    assert_eq!(tree.root().name, "app");
    let meta = tree.meta.as_ref().unwrap();
    assert!(!meta.loaded_from_disk);
    assert!(!loader.flags_suspect());
}

#[test]
fn test_supplied_root_with_meta_skips_disk() {
    let temp = TempDir::new().unwrap();
    let meta = Lockfile::from_json(
        temp.path().join(LOCK_FILE),
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"dependencies": {"a": "^1.0.0"}},
                "node_modules/a": {"version": "1.0.0"}
            }
        }"#,
    )
    .unwrap();

    let mut root = Tree::new(
        temp.path(),
        Package {
            dependencies: [("a".to_string(), "^1.0.0".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        },
    );
    root.meta = Some(meta);

    let mut loader = VirtualLoader::new(LoadConfig::new(temp.path()));
    let tree = loader.load_virtual(Some(root)).unwrap();

    let a = tree.get("node_modules/a").unwrap();
    assert_eq!(a.version(), Some("1.0.0"));
    assert_eq!(tree.root().edges_out()["a"].to, Some(a.id()));
    assert!(!loader.flags_suspect());
}

#[test]
fn test_added_dependency_triggers_reclassification() {
    let temp = project(
        Some(r#"{"name": "app", "dependencies": {"foo": "^1.0.0", "bar": "^2.0.0"}}"#),
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"name": "app", "dependencies": {"foo": "^1.0.0"}},
                "node_modules/foo": {"version": "1.0.0", "dev": true},
                "node_modules/stray": {"version": "1.0.0"}
            }
        }"#,
    );

    let (tree, suspect) = load(temp.path());
    assert!(suspect);

    assert_eq!(tree.root().flags, DepFlags::NONE);
    // the lockfile wrongly said dev
    assert_eq!(tree.get("node_modules/foo").unwrap().flags, DepFlags::NONE);
    // nothing depends on it any more
    let stray = tree.get("node_modules/stray").unwrap().flags;
    assert!(stray.extraneous);
    assert!(tree.root().edges_out()["bar"].to.is_none());
}

#[test]
fn test_reordered_dependencies_are_not_suspect() {
    let temp = project(
        Some(
            r#"{
                "name": "app",
                "devDependencies": {"z": "^1.0.0"},
                "dependencies": {"b": "^1.0.0", "a": "^1.0.0"}
            }"#,
        ),
        r#"{
            "lockfileVersion": 2,
            "requires": true,
            "packages": {
                "": {
                    "name": "app",
                    "dependencies": {"a": "^1.0.0", "b": "^1.0.0"},
                    "devDependencies": {"z": "^1.0.0"}
                },
                "node_modules/a": {"version": "1.0.0"},
                "node_modules/b": {"version": "1.0.0"},
                "node_modules/z": {"version": "1.0.0", "dev": true}
            }
        }"#,
    );

    let (tree, suspect) = load(temp.path());
    assert!(!suspect);

    // cached flags are kept as recorded
    let z = tree.get("node_modules/z").unwrap().flags;
    assert!(z.dev && z.dev_optional && !z.optional);
}

#[test]
fn test_changed_spec_is_suspect() {
    let temp = project(
        Some(r#"{"dependencies": {"a": "^2.0.0"}}"#),
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"dependencies": {"a": "^1.0.0"}},
                "node_modules/a": {"version": "1.0.0"}
            }
        }"#,
    );

    let (_, suspect) = load(temp.path());
    assert!(suspect);
}

#[test]
fn test_propagator_only_runs_when_suspect() {
    let lockfile = r#"{
        "lockfileVersion": 3,
        "packages": {
            "": {"dependencies": {"a": "^1.0.0"}},
            "node_modules/a": {"version": "1.0.0"}
        }
    }"#;

    for (manifest, expected_calls) in [
        (r#"{"dependencies": {"a": "^1.0.0"}}"#, 0),
        (r#"{"dependencies": {"a": "^1.0.0", "b": "^1.0.0"}}"#, 1),
    ] {
        let temp = project(Some(manifest), lockfile);
        let spy = Spy::default();
        let mut loader = VirtualLoader::with_collaborators(
            LoadConfig::new(temp.path()),
            FsManifestReader,
            spy.clone(),
        );
        loader.load_virtual(None).unwrap();
        assert_eq!(spy.0.get(), expected_calls);
    }
}

#[test]
fn test_link_resolves_to_lockfile_node() {
    let temp = project(
        Some(r#"{"dependencies": {"pkg-a": "file:packages/pkg-a"}}"#),
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"dependencies": {"pkg-a": "file:packages/pkg-a"}},
                "node_modules/pkg-a": {"resolved": "packages/pkg-a", "link": true},
                "packages/pkg-a": {"version": "1.0.0", "dev": true, "optional": true, "peer": true}
            }
        }"#,
    );

    let (tree, suspect) = load(temp.path());
    assert!(!suspect);

    let link = tree.get("node_modules/pkg-a").unwrap();
    let target = tree.get("packages/pkg-a").unwrap();
    assert!(link.is_link());
    assert_eq!(link.target(), Some(target.id()));
    assert_eq!(link.flags, target.flags);
    assert!(link.flags.dev && link.flags.optional && link.flags.peer);
    assert_eq!(link.version(), Some("1.0.0"));
    assert_eq!(link.realpath, target.path);

    assert_eq!(link.parent(), Some(tree.root_id()));
    assert_eq!(target.fs_parent(), Some(tree.root_id()));
    assert_eq!(tree.root().edges_out()["pkg-a"].to, Some(link.id()));
}

#[test]
fn test_link_outside_tree_has_no_target() {
    let temp = project(
        None,
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"dependencies": {"ext": "file:../elsewhere"}},
                "node_modules/ext": {"resolved": "../elsewhere", "link": true, "dev": true}
            }
        }"#,
    );

    let (tree, _) = load(temp.path());
    let link = tree.get("node_modules/ext").unwrap();
    assert!(link.is_link());
    assert_eq!(link.target(), None);
    assert!(link.flags.dev);
    assert!(tree.get("../elsewhere").is_none());
}

#[test]
fn test_nested_node_gets_parent() {
    let temp = project(
        None,
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"dependencies": {"a": "^1.0.0"}},
                "node_modules/a": {"version": "1.0.0", "dependencies": {"b": "^1.0.0"}},
                "node_modules/a/node_modules/b": {"version": "1.0.0", "dependencies": {"c": "^1.0.0"}},
                "node_modules/a/node_modules/b/node_modules/c": {"version": "1.0.0"}
            }
        }"#,
    );

    let (tree, _) = load(temp.path());
    let b = tree.id_of("node_modules/a/node_modules/b").unwrap();
    let c = tree.get("node_modules/a/node_modules/b/node_modules/c").unwrap();
    assert_eq!(c.parent(), Some(b));
    assert_eq!(c.fs_parent(), None);
    assert_eq!(tree.node(b).children()["c"], c.id());
    assert_eq!(tree.node(b).edges_out()["c"].to, Some(c.id()));
}

#[test]
fn test_missing_intermediate_gives_fs_parent() {
    let temp = project(
        None,
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"dependencies": {"a": "^1.0.0"}},
                "node_modules/a": {"version": "1.0.0"},
                "node_modules/a/node_modules/b/node_modules/c": {"version": "1.0.0"}
            }
        }"#,
    );

    let (tree, _) = load(temp.path());
    let a = tree.id_of("node_modules/a").unwrap();
    let c = tree.get("node_modules/a/node_modules/b/node_modules/c").unwrap();
    assert_eq!(c.parent(), None);
    assert_eq!(c.fs_parent(), Some(a));
    assert!(tree.node(a).children().is_empty());
}

#[test]
fn test_bundle_inference() {
    let temp = project(
        None,
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"dependencies": {"a": "^1.0.0"}},
                "node_modules/a": {"version": "1.0.0", "dependencies": {"b": "^1.0.0", "x": "^1.0.0"}},
                "node_modules/a/node_modules/b": {
                    "version": "1.0.0",
                    "inBundle": true,
                    "dependencies": {"c": "^1.0.0"}
                },
                "node_modules/a/node_modules/b/node_modules/c": {"version": "1.0.0", "inBundle": true},
                "node_modules/a/node_modules/y": {"version": "1.0.0", "inBundle": true}
            }
        }"#,
    );

    let (tree, _) = load(temp.path());
    // y is bundled but a does not depend on it
    let a = tree.get("node_modules/a").unwrap();
    assert_eq!(a.package.bundle_dependency_names(), ["b"]);
    // b is itself bundled, so c came along with it
    let b = tree.get("node_modules/a/node_modules/b").unwrap();
    assert!(b.package.bundle_dependency_names().is_empty());
}

#[test]
fn test_unreadable_manifest_falls_back_to_lockfile() {
    let temp = project(
        Some("{ broken"),
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"name": "from-lock", "dependencies": {"a": "^1.0.0"}},
                "node_modules/a": {"version": "1.0.0"}
            }
        }"#,
    );

    let (tree, suspect) = load(temp.path());
    assert!(!suspect);
    assert_eq!(tree.root().name, "from-lock");
    assert!(tree.root().edges_out()["a"].is_resolved());
}

#[test]
fn test_ancient_lockfile_skips_root_check() {
    let temp = project(
        Some(r#"{"dependencies": {"a": "^1.0.0", "b": "^1.0.0"}}"#),
        r#"{
            "lockfileVersion": 1,
            "dependencies": {
                "a": {"version": "1.0.0", "dev": true}
            }
        }"#,
    );

    let (tree, suspect) = load(temp.path());
    assert!(!suspect);
    let meta = tree.meta.as_ref().unwrap();
    assert!(meta.ancient_lockfile);
    assert!(tree.get("node_modules/a").unwrap().flags.dev);
}

#[test]
fn test_legacy_link_target_read_from_disk() {
    let temp = project(
        Some(r#"{"name": "app", "dependencies": {"w": "file:packages/w"}}"#),
        r#"{
            "name": "app",
            "lockfileVersion": 1,
            "requires": true,
            "dependencies": {
                "w": {"version": "file:packages/w"}
            }
        }"#,
    );
    write(
        temp.path(),
        "packages/w/package.json",
        r#"{"name": "w", "version": "2.0.0", "dependencies": {"x": "^1.0.0"}}"#,
    );

    let (tree, suspect) = load(temp.path());
    assert!(!suspect);

    let link = tree.get("node_modules/w").unwrap();
    let target = tree.node(link.target().unwrap());
    assert_eq!(target.location, "packages/w");
    assert_eq!(target.version(), Some("2.0.0"));
    assert!(target.edges_out().contains_key("x"));
    assert_eq!(link.version(), Some("2.0.0"));
}

#[test]
fn test_legacy_link_target_keeps_link_flags() {
    let temp = project(
        Some(r#"{"name": "app", "devDependencies": {"w": "file:packages/w"}}"#),
        r#"{
            "name": "app",
            "lockfileVersion": 1,
            "requires": true,
            "dependencies": {
                "w": {"version": "file:packages/w", "dev": true}
            }
        }"#,
    );
    write(
        temp.path(),
        "packages/w/package.json",
        r#"{"name": "w", "version": "1.0.0"}"#,
    );

    let (tree, suspect) = load(temp.path());
    assert!(!suspect);

    let link = tree.get("node_modules/w").unwrap();
    let target = tree.node(link.target().unwrap());
    assert_eq!(target.location, "packages/w");
    assert!(link.flags.dev);
    assert!(!link.flags.optional);
    assert_eq!(target.flags, link.flags);
}

#[test]
fn test_legacy_link_outside_project_stays_unresolved() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("app");
    write(
        &project,
        MANIFEST_FILE,
        r#"{"name": "app", "dependencies": {"other": "file:../other"}}"#,
    );
    write(
        &project,
        LOCK_FILE,
        r#"{
            "name": "app",
            "lockfileVersion": 1,
            "requires": true,
            "dependencies": {
                "other": {"version": "file:../other", "optional": true}
            }
        }"#,
    );
    write(
        temp.path(),
        "other/package.json",
        r#"{"name": "other", "version": "1.0.0"}"#,
    );

    let (tree, _) = load(&project);
    let link = tree.get("node_modules/other").unwrap();
    assert_eq!(link.target(), None);
    assert!(link.flags.optional);
    assert!(tree.get("../other").is_none());
    assert_eq!(tree.len(), 2);
}

#[test]
fn test_link_without_resolved_has_no_target() {
    let temp = project(
        None,
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"name": "app", "dependencies": {"x": "^1.0.0"}},
                "node_modules/x": {"link": true, "dev": true}
            }
        }"#,
    );

    let (tree, _) = load(temp.path());
    let link = tree.get("node_modules/x").unwrap();
    assert!(link.is_link());
    assert_eq!(link.target(), None);
    assert_ne!(link.target(), Some(tree.root_id()));
    assert_eq!(link.resolved, None);
    assert_eq!(link.package.name(), None);
    assert_eq!(tree.root().name, "app");
}

#[test]
fn test_workspaces_match_lockfile() {
    let temp = project(
        Some(r#"{"name": "root", "workspaces": ["packages/*"]}"#),
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"name": "root", "workspaces": ["packages/*"]},
                "node_modules/a": {"resolved": "packages/a", "link": true},
                "packages/a": {"name": "a", "version": "1.0.0"}
            }
        }"#,
    );
    write(
        temp.path(),
        "packages/a/package.json",
        r#"{"name": "a", "version": "1.0.0"}"#,
    );

    let (tree, suspect) = load(temp.path());
    assert!(!suspect);

    let edge = &tree.root().edges_out()["a"];
    assert_eq!(edge.edge_type, EdgeType::Workspace);
    assert_eq!(edge.spec, "file:packages/a");
    let link = tree.node(edge.to.unwrap());
    assert_eq!(link.target(), tree.id_of("packages/a"));
}

#[test]
fn test_new_workspace_on_disk_is_suspect() {
    let temp = project(
        Some(r#"{"name": "root", "workspaces": ["packages/*"]}"#),
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"name": "root", "workspaces": ["packages/*"]}
            }
        }"#,
    );
    write(temp.path(), "packages/new/package.json", r#"{"name": "new"}"#);

    let (_, suspect) = load(temp.path());
    assert!(suspect);
}

#[test]
fn test_legacy_peer_deps_drops_root_peers() {
    let temp = project(
        Some(r#"{"peerDependencies": {"p": "^1.0.0"}}"#),
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"peerDependencies": {"p": "^1.0.0"}},
                "node_modules/p": {"version": "1.0.0", "peer": true}
            }
        }"#,
    );

    let (tree, suspect) = load(temp.path());
    assert!(!suspect);
    assert_eq!(tree.root().edges_out()["p"].edge_type, EdgeType::Peer);

    let config = LoadConfig::builder()
        .root(temp.path())
        .legacy_peer_deps(true)
        .build()
        .unwrap();
    let mut loader = VirtualLoader::new(config);
    let tree = loader.load_virtual(None).unwrap();
    assert!(tree.root().edges_out().is_empty());
    assert!(loader.flags_suspect());
}

#[test]
fn test_load_is_idempotent() {
    let temp = project(
        None,
        r#"{
            "lockfileVersion": 3,
            "packages": {
                "": {"dependencies": {"a": "^1.0.0"}},
                "node_modules/a": {"version": "1.0.0"}
            }
        }"#,
    );

    let mut loader = VirtualLoader::new(LoadConfig::new(temp.path()));
    let first = loader.load_virtual(None).unwrap().len();

    std::fs::remove_file(temp.path().join(LOCK_FILE)).unwrap();
    let second = loader.load_virtual(None).unwrap();
    assert_eq!(second.len(), first);
    assert!(second.get("node_modules/a").is_some());
}

#[test]
fn test_with_tree_is_returned_as_is() {
    let tree = Tree::new(PathBuf::from("/nonexistent"), Package::default());
    let mut loader = VirtualLoader::new(LoadConfig::new("/nonexistent")).with_tree(tree);
    let tree = loader.load_virtual(None).unwrap();
    assert_eq!(tree.len(), 1);
    assert!(tree.meta.is_none());
}
