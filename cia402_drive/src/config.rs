//! Per-node driver configuration.

use crate::catalog::ParameterCatalog;
use crate::error::CatalogError;
use cia402_common::config::NodeConfig;
use cia402_common::types::NodeId;
use std::sync::Arc;

/// Everything a driver needs to configure its node.
///
/// Created once per discovered node and kept for the node's lifetime.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub node: NodeId,
    pub catalog: Arc<ParameterCatalog>,
    /// Raw concise description, downloaded after the catalog transfer.
    pub binary_description: Option<Arc<[u8]>>,
}

impl DriverConfig {
    pub fn new(node: NodeId, catalog: Arc<ParameterCatalog>) -> Self {
        Self {
            node,
            catalog,
            binary_description: None,
        }
    }

    pub fn with_binary_description(mut self, blob: impl Into<Arc<[u8]>>) -> Self {
        self.binary_description = Some(blob.into());
        self
    }

    /// Load the catalog (and blob, when configured) referenced by `node`.
    ///
    /// Paths are expected to be resolved already.
    pub fn from_node_config(node: &NodeConfig) -> Result<Self, CatalogError> {
        let catalog = ParameterCatalog::load(&node.description)?;
        let mut config = Self::new(node.id, Arc::new(catalog));
        if let Some(path) = &node.binary_description {
            let blob = std::fs::read(path).map_err(|e| CatalogError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            config = config.with_binary_description(blob);
        }
        Ok(config)
    }
}
