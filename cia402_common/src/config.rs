//! Configuration loading traits and types.
//!
//! Master and device-description files are TOML. Any deserializable type
//! gets [`ConfigLoader::load`] through the blanket implementation.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cia402_common::config::{ConfigError, ConfigLoader, MasterConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MasterConfig::load(Path::new("config/master.toml"))?;
//!     config.validate()?;
//!     println!("{} nodes", config.nodes.len());
//!     Ok(())
//! }
//! ```

use crate::types::{NodeId, ObjectAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common fields of every service configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "cia402-master-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Master Configuration ───────────────────────────────────────────

/// How the motion state machine reaches the drive's CiA-402 objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationScheme {
    /// Direct SDO writes; simple but slow, no leader/follower motion.
    #[default]
    Sdo,
    /// Reverse-mapped TPDO objects of the drive.
    MappedTpdo,
    /// Master-side mirror objects transmitted by manually mapped TPDOs.
    MasterObject,
}

/// Layout of the master-side mirror objects used by [`CommunicationScheme::MasterObject`].
///
/// Each object carries one sub-index per node (sub-index = node id); the
/// PDO group of a node is `group + node id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterObjectLayout {
    pub control_word: u16,
    pub operation_mode: u16,
    pub position: u16,
    pub velocity: u16,
    pub acceleration: u16,
    pub deceleration: u16,
    pub status_word: u16,
    pub control_pdo_group: u16,
    pub position_velocity_pdo_group: u16,
    pub deceleration_pdo_group: u16,
}

impl MasterObjectLayout {
    /// Mirror address of `index` for `node`.
    #[inline]
    pub const fn address(index: u16, node: NodeId) -> ObjectAddress {
        ObjectAddress::new(index, node.get())
    }
}

impl Default for MasterObjectLayout {
    fn default() -> Self {
        Self {
            control_word: 0x2000,
            operation_mode: 0x2001,
            position: 0x2002,
            velocity: 0x2003,
            acceleration: 0x2004,
            deceleration: 0x2005,
            status_word: 0x2010,
            control_pdo_group: 0x00,
            position_velocity_pdo_group: 0x10,
            deceleration_pdo_group: 0x20,
        }
    }
}

/// One node entry of the master configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: NodeId,

    /// Device description (TOML catalog), relative to the master file.
    pub description: PathBuf,

    /// Optional binary (concise) description downloaded after configuration.
    #[serde(default)]
    pub binary_description: Option<PathBuf>,
}

/// Master configuration file.
///
/// # TOML Example
///
/// ```toml
/// sdo_timeout_ms = 1000
/// fault_reset_delay_ms = 1000
/// communication = "mapped_tpdo"
///
/// [shared]
/// service_name = "cia402-master"
///
/// [[nodes]]
/// id = 2
/// description = "drive.toml"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    pub shared: SharedConfig,

    #[serde(default = "default_timeout_ms")]
    pub sdo_timeout_ms: u64,

    /// Fault-reset watchdog delay.
    #[serde(default = "default_timeout_ms")]
    pub fault_reset_delay_ms: u64,

    #[serde(default)]
    pub communication: CommunicationScheme,

    #[serde(default)]
    pub master_objects: MasterObjectLayout,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

fn default_timeout_ms() -> u64 {
    1000
}

impl MasterConfig {
    #[inline]
    pub fn sdo_timeout(&self) -> Duration {
        Duration::from_millis(self.sdo_timeout_ms)
    }

    #[inline]
    pub fn fault_reset_delay(&self) -> Duration {
        Duration::from_millis(self.fault_reset_delay_ms)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `shared` is invalid
    /// - no node is configured
    /// - a node id appears twice
    /// - a timeout is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.nodes.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one node must be configured".to_string(),
            ));
        }
        if self.sdo_timeout_ms == 0 || self.fault_reset_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(ConfigError::ValidationError(format!(
                    "node {} configured twice",
                    node.id
                )));
            }
        }
        Ok(())
    }

    /// Resolve node description paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for node in &mut self.nodes {
            if node.description.is_relative() {
                node.description = base.join(&node.description);
            }
            if let Some(blob) = node.binary_description.as_mut() {
                if blob.is_relative() {
                    *blob = base.join(&*blob);
                }
            }
        }
    }
}

// ─── Loader ─────────────────────────────────────────────────────────

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_path_buf())
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
