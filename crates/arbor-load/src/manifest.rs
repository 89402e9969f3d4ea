//! Reading package manifests from disk.

use std::path::Path;

use arbor_core::{MANIFEST_FILE, ManifestError, Package};

/// Reads the manifest of a package folder.
pub trait ManifestReader {
    /// Read `<dir>/package.json`.
    fn read(&self, dir: &Path) -> Result<Package, ManifestError>;
}

/// Reads manifests straight from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsManifestReader;

impl ManifestReader for FsManifestReader {
    fn read(&self, dir: &Path) -> Result<Package, ManifestError> {
        Package::from_json_file(&dir.join(MANIFEST_FILE))
    }
}

impl<R: ManifestReader + ?Sized> ManifestReader for &R {
    fn read(&self, dir: &Path) -> Result<Package, ManifestError> {
        (**self).read(dir)
    }
}
