//! Errors raised inside the drive crate.
//!
//! Transport, catalog-read and configuration errors shared with the engine
//! live in `cia402_common::error`.

use cia402_common::config::ConfigError;
use cia402_common::error::{ConfigureError, TransportError};
use cia402_common::types::{DataType, NodeId, ObjectAddress};
use std::sync::Arc;
use thiserror::Error;

/// A device description could not be turned into a catalog.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("object 0x{0:04x} is declared twice")]
    DuplicateObject(u16),

    #[error("sub-object {0} is declared twice")]
    DuplicateSubObject(ObjectAddress),

    #[error("value of {address} does not fit declared type {data_type}")]
    InvalidValue {
        address: ObjectAddress,
        data_type: DataType,
    },
}

/// A command could not be delivered to an axis.
#[derive(Debug, Clone, Error)]
pub enum AxisError {
    /// The axis executor has stopped.
    #[error("executor of node {0} is gone")]
    ExecutorGone(NodeId),

    #[error(transparent)]
    Configure(#[from] ConfigureError),
}

/// A setter in a motion command chain failed.
#[derive(Debug, Clone, Error)]
#[error("{context}: {source}")]
pub struct SetterFailure {
    pub context: &'static str,
    pub source: TransportError,
}

impl SetterFailure {
    pub fn wrap(context: &'static str) -> impl FnOnce(TransportError) -> Self {
        move |source| Self { context, source }
    }
}

/// Receives `(error code, message)` for emergencies, faults, configuration
/// failures and setter failures.
pub type ErrorCallback = Arc<dyn Fn(u16, String) + Send + Sync>;
