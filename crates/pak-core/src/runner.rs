//! Interpreter resolution for execution units.

use std::collections::BTreeMap;
use std::path::PathBuf;

use pak_schema::Runner;

/// Maps a runner to the interpreter binary that executes its scripts.
pub trait RunnerResolver: Send + Sync {
    /// Path of the interpreter, or `None` if it is not available on this host.
    fn resolve(&self, runner: Runner) -> Option<PathBuf>;
}

impl<T: RunnerResolver + ?Sized> RunnerResolver for std::sync::Arc<T> {
    fn resolve(&self, runner: Runner) -> Option<PathBuf> {
        (**self).resolve(runner)
    }
}

/// Config overrides first, then `PATH` lookup.
#[derive(Debug, Clone, Default)]
pub struct SystemRunners {
    overrides: BTreeMap<String, PathBuf>,
}

impl SystemRunners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit interpreter paths for some runners.
    pub fn with_overrides(overrides: BTreeMap<String, PathBuf>) -> Self {
        Self { overrides }
    }
}

impl RunnerResolver for SystemRunners {
    fn resolve(&self, runner: Runner) -> Option<PathBuf> {
        if let Some(path) = self.overrides.get(runner.as_str()) {
            return Some(path.clone());
        }
        which::which(runner.binary()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let mut map = BTreeMap::new();
        map.insert("lua".to_string(), PathBuf::from("/opt/lua/bin/lua5.4"));
        let runners = SystemRunners::with_overrides(map);
        assert_eq!(
            runners.resolve(Runner::Lua),
            Some(PathBuf::from("/opt/lua/bin/lua5.4"))
        );
    }
}
