//! Abstract CANopen protocol engine.
//!
//! Everything below the configuration sequencer and the motion state machine
//! (frame encoding, SDO segmentation, PDO transmission, NMT propagation,
//! device-description parsing) lives behind [`ProtocolEngine`]. The core only
//! issues point-to-point reads/writes, touches the master's own object
//! dictionary and receives [`EngineEvent`]s.
//!
//! # Object Safety
//!
//! The trait is object safe (`Arc<dyn ProtocolEngine>`); typed access goes
//! through the free functions [`read_scalar`] and [`write_scalar`].

use crate::emcy::EmergencyMessage;
use crate::error::TransportError;
use crate::nmt::{NmtCommand, NmtState};
use crate::types::{DataType, NodeId, ObjectAddress, ObjectValue, Scalar};
use async_trait::async_trait;

/// Primitives consumed from the underlying protocol engine.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Point-to-point read of a remote object (SDO upload).
    async fn read(
        &self,
        node: NodeId,
        address: ObjectAddress,
        data_type: DataType,
    ) -> Result<ObjectValue, TransportError>;

    /// Point-to-point write of a remote object (SDO download).
    async fn write(
        &self,
        node: NodeId,
        address: ObjectAddress,
        value: ObjectValue,
    ) -> Result<(), TransportError>;

    /// Current value of an object in the master's own dictionary.
    fn read_master(&self, address: ObjectAddress) -> Option<ObjectValue>;

    /// Write an object in the master's own dictionary.
    fn write_master(&self, address: ObjectAddress, value: ObjectValue) -> Result<(), TransportError>;

    /// Request immediate transmission of an event-driven TPDO group.
    fn tpdo_event(&self, group: u16);

    /// Last value received for an RPDO-mapped object of `node`.
    fn rpdo_mapped(&self, node: NodeId, address: ObjectAddress) -> Option<ObjectValue>;

    /// Write a TPDO-mapped object addressed to `node`, optionally triggering
    /// the transmission event.
    fn write_tpdo_mapped(
        &self,
        node: NodeId,
        address: ObjectAddress,
        value: ObjectValue,
        send_event: bool,
    ) -> Result<(), TransportError>;

    /// Issue an NMT command; `None` addresses all nodes.
    fn nmt_command(&self, command: NmtCommand, node: Option<NodeId>);

    /// Download a binary (concise) device description to `node`.
    async fn download_description(&self, node: NodeId, blob: &[u8]) -> Result<(), TransportError>;

    /// The master's configuration request for `node` has completed.
    ///
    /// Lets the engine continue the boot-up of `node` (or report a
    /// configuration boot error when `succeeded` is false).
    fn configuration_finished(&self, node: NodeId, succeeded: bool);
}

/// Read a remote object as `T`.
///
/// Fails with [`TransportError::UnexpectedType`] when the engine returns a
/// value of another type.
pub async fn read_scalar<T: Scalar>(
    engine: &dyn ProtocolEngine,
    node: NodeId,
    address: ObjectAddress,
) -> Result<T, TransportError> {
    let value = engine.read(node, address, T::DATA_TYPE).await?;
    T::from_value(&value).ok_or(TransportError::UnexpectedType {
        expected: T::DATA_TYPE,
        found: value.data_type(),
    })
}

/// Write `value` to a remote object.
pub async fn write_scalar<T: Scalar>(
    engine: &dyn ProtocolEngine,
    node: NodeId,
    address: ObjectAddress,
    value: T,
) -> Result<(), TransportError> {
    engine.write(node, address, value.into_value()).await
}

/// Notifications delivered by the engine to the master.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The master wants `node` configured (CiA-302 "update configuration").
    ConfigurationRequested { node: NodeId },

    /// Boot-up of `node` finished; `error_status` carries the CiA-302 letter
    /// on failure.
    Boot {
        node: NodeId,
        state: NmtState,
        error_status: Option<char>,
        what: String,
    },

    /// An RPDO received from `node` updated `address`.
    RpdoWritten { node: NodeId, address: ObjectAddress },

    /// An object in the master's dictionary was changed by an incoming PDO.
    MasterObjectChanged { address: ObjectAddress },

    /// The master issued an NMT command to the network.
    NmtCommandIssued { command: NmtCommand },

    /// `node` reported a new NMT state (heartbeat / boot-up).
    NmtStateChanged { node: NodeId, state: NmtState },

    /// Emergency message received from `node`.
    Emergency {
        node: NodeId,
        message: EmergencyMessage,
    },
}
