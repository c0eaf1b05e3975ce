//! Errors raised by the master.

use cia402_common::config::ConfigError;
use cia402_common::types::NodeId;
use cia402_drive::error::{AxisError, CatalogError};
use thiserror::Error;

/// Driver registry failures.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("node {0} is already registered")]
    DuplicateNode(NodeId),

    #[error("node {0} is not registered")]
    UnknownNode(NodeId),

    #[error("node {node}: {source}")]
    Axis {
        node: NodeId,
        #[source]
        source: AxisError,
    },

    /// Failures collected by `configure_all`, in node order.
    #[error("{} node(s) failed to configure: {}", .0.len(), failed_nodes(.0))]
    Configuration(Vec<(NodeId, AxisError)>),
}

fn failed_nodes(failures: &[(NodeId, AxisError)]) -> String {
    failures
        .iter()
        .map(|(node, e)| format!("{node} ({e})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Master start-up failures.
#[derive(Debug, Clone, Error)]
pub enum MasterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("node {node}: {source}")]
    Catalog {
        node: NodeId,
        #[source]
        source: CatalogError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("system did not become ready within {0} ms")]
    BootTimeout(u64),
}
