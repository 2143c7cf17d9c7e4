//! Installer strategies selected by a package's compiler extension.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pak_schema::{Component, ComponentDataType, Resource};
use thiserror::Error;

use crate::paths::InstallationPaths;

/// Extension tag of the built-in strategy.
pub const GENERIC: &str = "generic";

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Component '{name}' could not be decoded: {reason}")]
    Decode { name: String, reason: String },

    #[error("Component '{name}' has data type {data_type:?}, which this strategy cannot install")]
    UnsupportedDataType {
        name: String,
        data_type: ComponentDataType,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a package's components and resources into files.
///
/// `process_*` returning `None` means "nothing to write".
pub trait InstallerStrategy: Send + Sync {
    fn pre_install(&self, paths: &InstallationPaths) -> Result<(), StrategyError>;

    fn post_install(&self, paths: &InstallationPaths) -> Result<(), StrategyError>;

    fn process_component(&self, component: &Component) -> Result<Option<Vec<u8>>, StrategyError>;

    fn process_resource(&self, resource: &Resource) -> Result<Option<Vec<u8>>, StrategyError>;
}

/// Writes payloads as-is, decoding base64 components.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericStrategy;

impl InstallerStrategy for GenericStrategy {
    fn pre_install(&self, _: &InstallationPaths) -> Result<(), StrategyError> {
        Ok(())
    }

    fn post_install(&self, _: &InstallationPaths) -> Result<(), StrategyError> {
        Ok(())
    }

    fn process_component(&self, component: &Component) -> Result<Option<Vec<u8>>, StrategyError> {
        let data = match component.data_type {
            ComponentDataType::Plain | ComponentDataType::Binary => component.data.clone(),
            ComponentDataType::Base64Encoded => {
                let text: Vec<u8> = component
                    .data
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                STANDARD.decode(text).map_err(|e| StrategyError::Decode {
                    name: component.name.clone(),
                    reason: e.to_string(),
                })?
            }
            ComponentDataType::Ast => {
                return Err(StrategyError::UnsupportedDataType {
                    name: component.name.clone(),
                    data_type: component.data_type,
                });
            }
        };
        Ok(Some(data).filter(|d| !d.is_empty()))
    }

    fn process_resource(&self, resource: &Resource) -> Result<Option<Vec<u8>>, StrategyError> {
        Ok(Some(resource.data.clone()).filter(|d| !d.is_empty()))
    }
}

/// Compiler-extension tag to strategy.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn InstallerStrategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("tags", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(GENERIC, Arc::new(GenericStrategy));
        registry
    }
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, tag: &str, strategy: Arc<dyn InstallerStrategy>) {
        self.strategies.insert(tag.to_ascii_lowercase(), strategy);
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn InstallerStrategy>> {
        self.strategies.get(&tag.to_ascii_lowercase()).cloned()
    }
}
