//! Filesystem-safe identifiers derived from package and unit names.
//!
//! Package names, versions and unit names may contain characters that are
//! unsafe in file names. Every on-disk path below the runner directory is
//! therefore keyed by a fixed-length BLAKE3 digest instead. The mapping is a
//! pure function of its inputs: the same name always lands on the same path.

use serde::{Deserialize, Serialize};

/// Number of digest bytes kept for an id (rendered as twice as many hex chars).
pub const ID_BYTES: usize = 16;

/// A fixed-length lowercase hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashId(String);

impl HashId {
    /// Hash arbitrary bytes into an id.
    pub fn compute(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        Self(hex::encode(&digest.as_bytes()[..ID_BYTES]))
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HashId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<std::path::Path> for HashId {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

/// Id of a package version: hash of the concatenated name and version.
pub fn package_id(package: &str, version: &str) -> HashId {
    let mut buf = String::with_capacity(package.len() + version.len());
    buf.push_str(package);
    buf.push_str(version);
    HashId::compute(buf.as_bytes())
}

/// Id of an execution unit within a package version: hash of the unit name.
pub fn unit_id(name: &str) -> HashId {
    HashId::compute(name.as_bytes())
}
