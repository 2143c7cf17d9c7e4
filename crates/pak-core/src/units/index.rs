use std::path::PathBuf;

use pak_schema::ExecutionPolicy;
use serde::{Deserialize, Serialize};

/// A registered unit: its policy plus where its files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedUnit {
    pub policy: ExecutionPolicy,
    pub script: PathBuf,
    pub launcher: PathBuf,
}

/// Units registered for one package version, in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UnitIndex {
    pub package: String,
    pub version: String,
    pub units: Vec<IndexedUnit>,
}

impl UnitIndex {
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            units: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&IndexedUnit> {
        self.units.iter().find(|u| u.policy.name == name)
    }

    /// Insert or replace by name, keeping the original position on replace.
    pub fn upsert(&mut self, unit: IndexedUnit) {
        match self.units.iter_mut().find(|u| u.policy.name == unit.policy.name) {
            Some(slot) => *slot = unit,
            None => self.units.push(unit),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<IndexedUnit> {
        let pos = self.units.iter().position(|u| u.policy.name == name)?;
        Some(self.units.remove(pos))
    }

    pub fn names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.policy.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, script: &str) -> IndexedUnit {
        IndexedUnit {
            policy: ExecutionPolicy {
                name: name.to_string(),
                runner: "bash".to_string(),
                ..ExecutionPolicy::default()
            },
            script: PathBuf::from(script),
            launcher: PathBuf::from(script).with_extension(""),
        }
    }

    #[test]
    fn test_upsert_keeps_order() {
        let mut index = UnitIndex::new("foo", "1.0.0");
        index.upsert(unit("a", "/a.bash"));
        index.upsert(unit("b", "/b.bash"));
        index.upsert(unit("a", "/a2.bash"));
        assert_eq!(index.names(), vec!["a", "b"]);
        assert_eq!(index.get("a").unwrap().script, PathBuf::from("/a2.bash"));
    }

    #[test]
    fn test_remove() {
        let mut index = UnitIndex::new("foo", "1.0.0");
        index.upsert(unit("a", "/a.bash"));
        assert!(index.remove("missing").is_none());
        assert!(index.remove("a").is_some());
        assert!(index.is_empty());
    }
}
