//! Postcard persistence with atomic replacement.
//!
//! Every registry file (lock store, unit index, symlink and source
//! registries) goes through [`read`] and [`write_atomic`]. A missing or empty
//! file decodes as `T::default()`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt data in {path}: {source}")]
    Decode {
        path: PathBuf,
        source: postcard::Error,
    },

    #[error("Failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        source: postcard::Error,
    },

    #[error("Could not lock {0}")]
    LockFailed(PathBuf),
}

impl CodecError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Decode `path`, treating a missing or zero-length file as empty.
pub fn read<T: DeserializeOwned + Default>(path: &Path) -> Result<T, CodecError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(CodecError::io(path, e)),
    };
    if bytes.is_empty() {
        return Ok(T::default());
    }
    postcard::from_bytes(&bytes).map_err(|source| CodecError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode `value` and atomically replace `path`.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CodecError> {
    let bytes = postcard::to_allocvec(value).map_err(|source| CodecError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes_atomic(path, &bytes)
}

/// Write to a sibling temp file under an exclusive lock, then rename over `path`.
pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<(), CodecError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CodecError::io(parent, e))?;
    }

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| CodecError::io(&temp_path, e))?;

    temp_file
        .lock_exclusive()
        .map_err(|_| CodecError::LockFailed(path.to_path_buf()))?;
    temp_file
        .write_all(content)
        .map_err(|e| CodecError::io(&temp_path, e))?;
    temp_file
        .sync_all()
        .map_err(|e| CodecError::io(&temp_path, e))?;
    temp_file
        .unlock()
        .map_err(|_| CodecError::LockFailed(path.to_path_buf()))?;

    fs::rename(&temp_path, path).map_err(|e| CodecError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_and_empty_files_are_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.reg");
        let map: BTreeMap<String, u32> = read(&path).unwrap();
        assert!(map.is_empty());

        fs::write(&path, b"").unwrap();
        let map: BTreeMap<String, u32> = read(&path).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/x.reg");
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1u32);
        write_atomic(&path, &map).unwrap();
        let back: BTreeMap<String, u32> = read(&path).unwrap();
        assert_eq!(back, map);
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.reg");
        fs::write(&path, [0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap();
        let res: Result<BTreeMap<String, u32>, _> = read(&path);
        assert!(matches!(res, Err(CodecError::Decode { .. })));
    }
}
