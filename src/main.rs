//! arbor - load npm lockfiles into dependency trees and diff them.
//!
//! Usage:
//!   arbor ls [PATH]               Show the tree recorded in a lockfile
//!   arbor diff ACTUAL IDEAL       Show what turns one tree into the other
//!   arbor --help                  Show help

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, OptionExt, Result};
use serde_json::json;
use tracing::debug;

use arbor_core::{DepFlags, LoadConfig, LoadError, Node, NodeId, Tree};
use arbor_diff::{Action, Diff};
use arbor_load::VirtualLoader;

#[derive(Debug, Parser)]
#[command(
    name = "arbor",
    version,
    about = "Load npm lockfiles into dependency trees and diff them",
    long_about = "arbor rebuilds the dependency tree recorded in a package-lock.json \
                  or npm-shrinkwrap.json, and computes the changes needed to turn \
                  one such tree into another."
)]
struct Cli {
    /// Log verbosity
    #[arg(long, short, global = true, default_value = "warn", value_enum)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the tree recorded in a lockfile
    Ls {
        /// Project folder holding package.json and the lockfile
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show what turns the ACTUAL tree into the IDEAL tree
    Diff {
        /// Project folder with the tree as it is
        actual: PathBuf,

        /// Project folder with the tree as it should be
        ideal: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Ignore peerDependencies
    #[arg(long)]
    legacy_peer_deps: bool,

    /// Do not resolve workspaces of the root package
    #[arg(long)]
    no_workspaces: bool,
}

impl LoadArgs {
    fn config(&self, root: &Path) -> Result<LoadConfig> {
        LoadConfig::builder()
            .root(root)
            .legacy_peer_deps(self.legacy_peer_deps)
            .workspaces(!self.no_workspaces)
            .build()
            .map_err(LoadError::from)
            .context("Invalid load configuration")
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    Silent,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<tracing::Level> {
        match self {
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Warn => Some(tracing::Level::WARN),
            LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Silent => None,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_tracing(cli.log_level);
    debug!("Parsed CLI arguments: {cli:?}");

    match cli.command {
        Command::Ls { path, load, format } => run_ls(&path, &load, format)?,
        Command::Diff {
            actual,
            ideal,
            load,
            format,
        } => run_diff(&actual, &ideal, &load, format)?,
    }

    Ok(())
}

fn setup_tracing(level: LogLevel) {
    if let Some(level) = level.to_tracing_level() {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .without_time()
            .compact()
            .init();
    }
}

/// Load the virtual tree of the project at `path`.
fn load_tree(path: &Path, load: &LoadArgs) -> Result<Tree> {
    let mut loader = VirtualLoader::new(load.config(path)?);
    loader
        .load_virtual(None)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    if loader.flags_suspect() {
        eprintln!(
            "{}: lockfile is out of date with package.json, flags were recalculated",
            path.display()
        );
    }
    loader.into_tree().ok_or_eyre("Loader returned no tree")
}

/// Print the tree of one project.
fn run_ls(path: &Path, load: &LoadArgs, format: OutputFormat) -> Result<()> {
    let tree = load_tree(path, load)?;

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(60));
            println!(" {} ({} packages)", tree.root_path().display(), tree.len() - 1);
            println!("{}", "─".repeat(60));
            println!();

            print_node(&tree, tree.root_id(), 0);

            let detached: Vec<&Node> = tree
                .iter()
                .filter(|node| !node.is_root() && node.parent().is_none())
                .collect();
            if !detached.is_empty() {
                println!();
                for node in detached {
                    print_node(&tree, node.id(), 0);
                }
            }
        }
        OutputFormat::Json => {
            let nodes: Vec<_> = tree
                .iter()
                .map(|node| {
                    json!({
                        "location": node.location.as_str(),
                        "name": node.name.as_str(),
                        "version": node.version(),
                        "resolved": node.resolved,
                        "integrity": node.integrity,
                        "link": node.target().map(|t| tree.node(t).location.as_str()),
                        "flags": node.flags,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&nodes)?);
        }
    }

    Ok(())
}

/// Print a node and its nested children.
fn print_node(tree: &Tree, id: NodeId, depth: usize) {
    let node = tree.node(id);
    let indent = "  ".repeat(depth);

    let label = if node.is_root() {
        node.name.to_string()
    } else if depth == 0 {
        node.location.to_string()
    } else {
        node.name.to_string()
    };
    let version = node.version().map(|v| format!("@{v}")).unwrap_or_default();
    let link = match node.target() {
        Some(target) => format!(" -> {}", tree.node(target).location),
        None if node.is_link() => " -> (outside tree)".to_string(),
        None => String::new(),
    };

    println!("{indent}{label}{version}{link}{}", flag_markers(node.flags));

    for &child in node.children().values() {
        print_node(tree, child, depth + 1);
    }
}

fn flag_markers(flags: DepFlags) -> String {
    if !flags.any() {
        return String::new();
    }

    let markers: Vec<&str> = [
        (flags.extraneous, "extraneous"),
        (flags.dev, "dev"),
        (flags.optional, "optional"),
        (flags.dev_optional && !flags.dev && !flags.optional, "devOptional"),
        (flags.peer, "peer"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect();

    format!(" [{}]", markers.join(", "))
}

/// Diff two projects' trees.
fn run_diff(actual: &Path, ideal: &Path, load: &LoadArgs, format: OutputFormat) -> Result<()> {
    let actual_tree = load_tree(actual, load)?;
    let ideal_tree = load_tree(ideal, load)?;

    let diff = Diff::calculate(&actual_tree, &ideal_tree);
    let report = diff.report();

    match format {
        OutputFormat::Text => {
            if report.leaves.is_empty() {
                println!(" Trees are identical ({} packages).", report.unchanged.len());
                return Ok(());
            }

            for leaf in &report.leaves {
                let marker = match leaf.action {
                    Action::Add => "+",
                    Action::Remove => "-",
                    Action::Change => "~",
                };
                println!(" {marker} {:<7} {}", leaf.action.as_ref(), leaf.location);
            }
            println!();
            println!(
                " {} added, {} removed, {} changed, {} unchanged",
                report.count(Action::Add),
                report.count(Action::Remove),
                report.count(Action::Change),
                report.unchanged.len()
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
