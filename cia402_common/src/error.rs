//! Error taxonomy shared by the sequencer, the axis executor and the engine.

use crate::consts::sdo_abort_description;
use crate::types::{DataType, NodeId, ObjectAddress};
use std::fmt;
use thiserror::Error;

// ─── Transport ──────────────────────────────────────────────────────

/// A remote or master-dictionary access failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The device (or the engine) aborted the transfer.
    #[error("0x{code:08x} ({})", abort_text(.code))]
    Aborted { code: u32 },

    /// No reply within the configured timeout.
    #[error("timeout")]
    Timeout,

    /// Node is not reachable (not booted, reset in progress).
    #[error("node {0} unavailable")]
    NodeUnavailable(NodeId),

    /// The reply carried a different type than requested.
    #[error("expected {expected}, received {found}")]
    UnexpectedType { expected: DataType, found: DataType },

    /// Failure inside the master's own object dictionary.
    #[error("master object dictionary: {0}")]
    Master(String),
}

fn abort_text(code: &u32) -> &'static str {
    sdo_abort_description(*code)
}

// ─── Local Catalog ──────────────────────────────────────────────────

/// A value could not be read from the local device description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalReadError {
    #[error("no value for {0} in the device description")]
    NotFound(ObjectAddress),

    #[error("{address} is declared as {declared}, requested {requested}")]
    TypeMismatch {
        address: ObjectAddress,
        declared: DataType,
        requested: DataType,
    },
}

// ─── Pairing ────────────────────────────────────────────────────────

/// Leader/follower detection found an inconsistent bus layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    /// A third node claims a COB-ID that already links a leader and a follower.
    #[error(
        "node {node} shares COB-ID 0x{cob_id:08x} already used by leader {leader} and follower {follower}"
    )]
    Conflict {
        cob_id: u32,
        node: NodeId,
        leader: NodeId,
        follower: NodeId,
    },

    /// A node would take a second role or a second partner.
    #[error("node {node} is already paired with node {partner}, cannot pair with {requested}")]
    AlreadyPaired {
        node: NodeId,
        partner: NodeId,
        requested: NodeId,
    },
}

// ─── Configuration ──────────────────────────────────────────────────

/// Step of the configuration protocol that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigStep {
    ReadLocalValue,
    ReadRemote,
    WriteRemote,
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadLocalValue => "While reading the local SDO value from",
            Self::ReadRemote => "While Reading from SDO",
            Self::WriteRemote => "While Writing to SDO",
        })
    }
}

/// Configuration of one node was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigureError {
    #[error("{} {address}: {source}", ConfigStep::ReadLocalValue)]
    LocalRead {
        address: ObjectAddress,
        source: LocalReadError,
    },

    #[error("{} {address}: {source}", ConfigStep::ReadRemote)]
    RemoteRead {
        address: ObjectAddress,
        source: TransportError,
    },

    #[error("{} {address}: {source}", ConfigStep::WriteRemote)]
    RemoteWrite {
        address: ObjectAddress,
        source: TransportError,
    },

    /// The description declares no type for an explicitly-set entry.
    #[error("no data type declared for SDO {address}")]
    UnknownType { address: ObjectAddress },

    #[error("cannot transfer data type {data_type} for SDO {address}, this data type is not supported")]
    UnsupportedType {
        address: ObjectAddress,
        data_type: DataType,
    },

    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error("clearing the configuration failed: {0}")]
    ClearConfiguration(TransportError),

    #[error("downloading the binary description failed: {0}")]
    DescriptionDownload(TransportError),
}

impl ConfigureError {
    /// Protocol step for step-tagged failures.
    pub const fn step(&self) -> Option<ConfigStep> {
        match self {
            Self::LocalRead { .. } => Some(ConfigStep::ReadLocalValue),
            Self::RemoteRead { .. } => Some(ConfigStep::ReadRemote),
            Self::RemoteWrite { .. } | Self::UnsupportedType { .. } => Some(ConfigStep::WriteRemote),
            _ => None,
        }
    }

    /// Offending object address, if the failure is tied to one.
    pub const fn address(&self) -> Option<ObjectAddress> {
        match self {
            Self::LocalRead { address, .. }
            | Self::RemoteRead { address, .. }
            | Self::RemoteWrite { address, .. }
            | Self::UnknownType { address }
            | Self::UnsupportedType { address, .. } => Some(*address),
            _ => None,
        }
    }
}

// ─── Reported Error Codes ───────────────────────────────────────────

/// Codes passed to the error callback besides device EMCY / fault codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AdditionalErrorCode {
    NodeConfigurationFailed = 0xAF01,
    NodeBootFailed = 0xAF02,
    ReadErrorFailed = 0xAF03,
    NodeMissing = 0xAF04,
    WriteToNodeError = 0xAF05,
    FirmwareUpdateFailed = 0xAF06,
    OtherMotorHadError = 0xAFFF,
}

impl AdditionalErrorCode {
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    #[inline]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0xAF01 => Some(Self::NodeConfigurationFailed),
            0xAF02 => Some(Self::NodeBootFailed),
            0xAF03 => Some(Self::ReadErrorFailed),
            0xAF04 => Some(Self::NodeMissing),
            0xAF05 => Some(Self::WriteToNodeError),
            0xAF06 => Some(Self::FirmwareUpdateFailed),
            0xAFFF => Some(Self::OtherMotorHadError),
            _ => None,
        }
    }
}
