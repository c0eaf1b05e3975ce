//! In-memory `ProtocolEngine` for unit tests.

use async_trait::async_trait;
use cia402_common::consts::{SDO_ABORT_NO_OBJECT, SDO_ABORT_TYPE_MISMATCH};
use cia402_common::engine::ProtocolEngine;
use cia402_common::error::TransportError;
use cia402_common::nmt::NmtCommand;
use cia402_common::types::{DataType, NodeId, ObjectAddress, ObjectValue};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Read(NodeId, ObjectAddress),
    Write(NodeId, ObjectAddress, ObjectValue),
    WriteMaster(ObjectAddress, ObjectValue),
    TpdoEvent(u16),
    WriteTpdoMapped(NodeId, ObjectAddress, ObjectValue, bool),
    Nmt(NmtCommand, Option<NodeId>),
    Download(NodeId, usize),
    Finished(NodeId, bool),
}

#[derive(Default)]
struct State {
    remote: HashMap<(NodeId, ObjectAddress), ObjectValue>,
    master: HashMap<ObjectAddress, ObjectValue>,
    rpdo: HashMap<(NodeId, ObjectAddress), ObjectValue>,
    fail_reads: HashSet<ObjectAddress>,
    fail_writes: HashSet<ObjectAddress>,
    ops: Vec<Op>,
}

/// Records every call; remote objects default to "does not exist".
#[derive(Default)]
pub struct ScriptedEngine {
    state: Mutex<State>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_remote(&self, node: NodeId, address: ObjectAddress, value: impl Into<ObjectValue>) {
        self.state.lock().remote.insert((node, address), value.into());
    }

    pub fn remote(&self, node: NodeId, address: ObjectAddress) -> Option<ObjectValue> {
        self.state.lock().remote.get(&(node, address)).cloned()
    }

    pub fn set_master(&self, address: ObjectAddress, value: impl Into<ObjectValue>) {
        self.state.lock().master.insert(address, value.into());
    }

    pub fn set_rpdo(&self, node: NodeId, address: ObjectAddress, value: impl Into<ObjectValue>) {
        self.state.lock().rpdo.insert((node, address), value.into());
    }

    pub fn fail_read(&self, address: ObjectAddress) {
        self.state.lock().fail_reads.insert(address);
    }

    pub fn fail_write(&self, address: ObjectAddress) {
        self.state.lock().fail_writes.insert(address);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().ops.clone()
    }

    /// Remote writes only, in order.
    pub fn writes(&self) -> Vec<(ObjectAddress, ObjectValue)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Write(_, address, value) => Some((address, value)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }
}

#[async_trait]
impl ProtocolEngine for ScriptedEngine {
    async fn read(
        &self,
        node: NodeId,
        address: ObjectAddress,
        data_type: DataType,
    ) -> Result<ObjectValue, TransportError> {
        let mut state = self.state.lock();
        state.ops.push(Op::Read(node, address));
        if state.fail_reads.contains(&address) {
            return Err(TransportError::Timeout);
        }
        let value = state.remote.get(&(node, address)).cloned().ok_or(TransportError::Aborted {
            code: SDO_ABORT_NO_OBJECT,
        })?;
        if value.data_type() != data_type {
            return Err(TransportError::Aborted {
                code: SDO_ABORT_TYPE_MISMATCH,
            });
        }
        Ok(value)
    }

    async fn write(
        &self,
        node: NodeId,
        address: ObjectAddress,
        value: ObjectValue,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.ops.push(Op::Write(node, address, value.clone()));
        if state.fail_writes.contains(&address) {
            return Err(TransportError::Timeout);
        }
        state.remote.insert((node, address), value);
        Ok(())
    }

    fn read_master(&self, address: ObjectAddress) -> Option<ObjectValue> {
        self.state.lock().master.get(&address).cloned()
    }

    fn write_master(&self, address: ObjectAddress, value: ObjectValue) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.ops.push(Op::WriteMaster(address, value.clone()));
        if state.fail_writes.contains(&address) {
            return Err(TransportError::Master(format!("{address} is read-only")));
        }
        state.master.insert(address, value);
        Ok(())
    }

    fn tpdo_event(&self, group: u16) {
        self.state.lock().ops.push(Op::TpdoEvent(group));
    }

    fn rpdo_mapped(&self, node: NodeId, address: ObjectAddress) -> Option<ObjectValue> {
        self.state.lock().rpdo.get(&(node, address)).cloned()
    }

    fn write_tpdo_mapped(
        &self,
        node: NodeId,
        address: ObjectAddress,
        value: ObjectValue,
        send_event: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state
            .ops
            .push(Op::WriteTpdoMapped(node, address, value, send_event));
        if state.fail_writes.contains(&address) {
            return Err(TransportError::Timeout);
        }
        Ok(())
    }

    fn nmt_command(&self, command: NmtCommand, node: Option<NodeId>) {
        self.state.lock().ops.push(Op::Nmt(command, node));
    }

    async fn download_description(&self, node: NodeId, blob: &[u8]) -> Result<(), TransportError> {
        self.state.lock().ops.push(Op::Download(node, blob.len()));
        Ok(())
    }

    fn configuration_finished(&self, node: NodeId, succeeded: bool) {
        self.state.lock().ops.push(Op::Finished(node, succeeded));
    }
}

pub fn node(raw: u8) -> NodeId {
    NodeId::new(raw).unwrap()
}
