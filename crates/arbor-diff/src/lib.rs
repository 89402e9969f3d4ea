//! Tree diffing for arbor.
//!
//! Computes what has to change to turn an actual dependency tree (what is
//! installed) into an ideal one (what should be installed).
//!
//! Two nodes at the same location are the same package when both roots, when
//! their integrity digests match, or, lacking digests on both sides, when
//! they were resolved from the same source. Anything else is a change; the
//! shallowest changed location absorbs everything beneath it.
//!
//! ```rust,ignore
//! use arbor_diff::Diff;
//! use arbor_load::{LoadConfig, VirtualLoader};
//!
//! let mut actual = VirtualLoader::new(LoadConfig::new("/path/to/actual"));
//! let mut ideal = VirtualLoader::new(LoadConfig::new("/path/to/ideal"));
//! let actual = actual.load_virtual(None).unwrap();
//! let ideal = ideal.load_virtual(None).unwrap();
//!
//! let diff = Diff::calculate(actual, ideal);
//! for leaf in diff.report().leaves {
//!     println!("{} {}", leaf.action, leaf.location);
//! }
//! ```

mod diff;

pub use diff::{Action, Diff, DiffId, DiffNode, DiffReport, LeafReport, get_action};

// Re-export core types
pub use arbor_core::{Node, NodeId, Tree};
