//! Prelude module for common re-exports.
//!
//! ```rust
//! use cia402_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    CommunicationScheme, ConfigError, ConfigLoader, MasterConfig, MasterObjectLayout, NodeConfig,
    SharedConfig,
};

// ─── Object Dictionary ──────────────────────────────────────────────
pub use crate::status::{OperationMode, StatusWord, control_word};
pub use crate::types::{DataType, NodeId, ObjectAddress, ObjectValue, Scalar};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{
    AdditionalErrorCode, ConfigStep, ConfigureError, LocalReadError, PairingError, TransportError,
};

// ─── Engine ─────────────────────────────────────────────────────────
pub use crate::emcy::EmergencyMessage;
pub use crate::engine::{EngineEvent, ProtocolEngine, read_scalar, write_scalar};
pub use crate::nmt::{NmtCommand, NmtState};
