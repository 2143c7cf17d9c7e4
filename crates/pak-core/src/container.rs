//! Package container reader seam.

use std::path::Path;

use pak_schema::{Package, PackageError};

/// Reads a package file into a [`Package`].
pub trait PackageReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Package, PackageError>;
}

/// Reads the native `PAK\x01` + zstd(postcard) container.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileReader;

impl PackageReader for FileReader {
    fn read(&self, path: &Path) -> Result<Package, PackageError> {
        Package::read_file(path)
    }
}
