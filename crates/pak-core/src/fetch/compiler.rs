//! Turning a fetched source tree into a package file.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::FetchError;

/// Produces a package file from a source tree.
pub trait SourceCompiler: Send + Sync {
    fn compile(&self, source_dir: &Path, prefer_static: bool) -> Result<PathBuf, FetchError>;
}

/// Uses a `.pak` file already present in the tree.
///
/// Building packages is done by external tooling, so a tree without a
/// prebuilt package is a failed attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrebuiltLocator;

impl SourceCompiler for PrebuiltLocator {
    fn compile(&self, source_dir: &Path, prefer_static: bool) -> Result<PathBuf, FetchError> {
        let mut found: Vec<PathBuf> = WalkDir::new(source_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pak"))
            })
            .map(walkdir::DirEntry::into_path)
            .collect();
        found.sort();

        let is_static = |p: &PathBuf| {
            p.file_stem()
                .map(|s| s.to_string_lossy().to_ascii_lowercase())
                .is_some_and(|s| s.ends_with("-static") || s.ends_with("_static"))
        };
        let preferred = found.iter().position(|p| is_static(p) == prefer_static);
        match preferred {
            Some(i) => Ok(found.swap_remove(i)),
            None => found
                .into_iter()
                .next()
                .ok_or_else(|| FetchError::Compile(source_dir.to_path_buf())),
        }
    }
}
