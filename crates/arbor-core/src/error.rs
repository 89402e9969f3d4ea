//! Error types for loading operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a virtual tree.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No lockfile on disk and no root node supplied by the caller.
    #[error("loading a virtual tree requires an existing lockfile in {path}")]
    MissingLockfile { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lockfile exists but is not valid JSON for the expected shape.
    #[error("failed to parse lockfile {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl LoadError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means "create a lockfile first" rather than "retry".
    pub fn is_missing_lockfile(&self) -> bool {
        matches!(self, Self::MissingLockfile { .. })
    }
}

/// Errors that can occur when reading a package manifest.
///
/// The loader never surfaces these: a manifest that cannot be read falls back
/// to lockfile data or is ignored.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lockfile_is_distinct() {
        let err = LoadError::MissingLockfile {
            path: PathBuf::from("/project"),
        };
        assert!(err.is_missing_lockfile());
        assert!(err.to_string().contains("/project"));

        let io = LoadError::io(
            "/project/package-lock.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!io.is_missing_lockfile());
    }
}
