//! In-memory CANopen network.
//!
//! `SimulatedBus` implements [`ProtocolEngine`] over per-node object
//! dictionaries. Nodes added with [`SimulatedBus::add_drive`] emulate a
//! CiA-402 drive: control words written by SDO, mapped TPDO or master
//! mirror object reach the emulator, and the resulting status word is
//! published either as an RPDO of the node or into the master dictionary.
//!
//! Every access is recorded in an operation log for tests.

use super::drive::{DriveEmulator, DriveJob};
use async_trait::async_trait;
use cia402_common::config::MasterObjectLayout;
use cia402_common::consts::{
    CONTROL_WORD, FAULT_REGISTER, OPERATION_MODE, SDO_ABORT_DATA, SDO_ABORT_NO_OBJECT,
    SDO_ABORT_TYPE_MISMATCH, STATUS_WORD, TARGET_POSITION,
};
use cia402_common::emcy::EmergencyMessage;
use cia402_common::engine::{EngineEvent, ProtocolEngine};
use cia402_common::error::TransportError;
use cia402_common::nmt::{NmtCommand, NmtState};
use cia402_common::types::{DataType, NodeId, ObjectAddress, ObjectValue};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// One recorded bus access.
#[derive(Debug, Clone, PartialEq)]
pub enum BusOperation {
    SdoRead(NodeId, ObjectAddress),
    SdoWrite(NodeId, ObjectAddress, ObjectValue),
    MasterWrite(ObjectAddress, ObjectValue),
    TpdoEvent(u16),
    TpdoMappedWrite(NodeId, ObjectAddress, ObjectValue),
    Nmt(NmtCommand, Option<NodeId>),
    DescriptionDownload(NodeId, usize),
    ConfigurationFinished(NodeId, bool),
}

/// Timing of the emulated drives.
#[derive(Debug, Clone, Copy)]
pub struct SimTiming {
    pub homing: Duration,
    pub positioning: Duration,
    /// Delay before an SDO to an unreachable node times out.
    pub sdo_timeout: Duration,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            homing: Duration::from_millis(20),
            positioning: Duration::from_millis(20),
            sdo_timeout: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Default)]
struct Node {
    dictionary: HashMap<ObjectAddress, ObjectValue>,
    drive: Option<DriveEmulator>,
    online: bool,
}

#[derive(Default)]
struct BusState {
    nodes: BTreeMap<NodeId, Node>,
    master: HashMap<ObjectAddress, ObjectValue>,
    rpdo: HashMap<(NodeId, ObjectAddress), ObjectValue>,
    tpdo_mapped: HashMap<(NodeId, ObjectAddress), ObjectValue>,
    /// leader -> follower; control words of the leader reach both drives.
    couplings: HashMap<NodeId, NodeId>,
    failing_writes: HashSet<(NodeId, ObjectAddress)>,
    log: Vec<BusOperation>,
}

/// Simulated network with optional drive emulation.
pub struct SimulatedBus {
    state: Mutex<BusState>,
    events: mpsc::UnboundedSender<EngineEvent>,
    layout: Option<MasterObjectLayout>,
    timing: SimTiming,
    this: Weak<SimulatedBus>,
}

impl SimulatedBus {
    /// Bus publishing status words as RPDOs.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        Self::build(None, SimTiming::default())
    }

    /// Bus whose drives are commanded through, and publish their status word
    /// into, master mirror objects.
    pub fn with_master_objects(
        layout: MasterObjectLayout,
        timing: SimTiming,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        Self::build(Some(layout), timing)
    }

    pub fn with_timing(timing: SimTiming) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        Self::build(None, timing)
    }

    fn build(
        layout: Option<MasterObjectLayout>,
        timing: SimTiming,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let bus = Arc::new_cyclic(|this| Self {
            state: Mutex::new(BusState::default()),
            events,
            layout,
            timing,
            this: this.clone(),
        });
        (bus, rx)
    }

    // ─── Setup ──────────────────────────────────────────────────────

    /// Add a plain node with an empty dictionary.
    pub fn add_node(&self, node: NodeId) {
        self.state.lock().nodes.insert(
            node,
            Node {
                online: true,
                ..Node::default()
            },
        );
    }

    /// Add a node emulating a CiA-402 drive.
    pub fn add_drive(&self, node: NodeId) {
        let mut state = self.state.lock();
        let drive = DriveEmulator::new();
        let mut dictionary = HashMap::new();
        dictionary.insert(STATUS_WORD, ObjectValue::Unsigned16(drive.status().bits()));
        dictionary.insert(FAULT_REGISTER, ObjectValue::Unsigned16(0));
        state.nodes.insert(
            node,
            Node {
                dictionary,
                drive: Some(drive),
                online: true,
            },
        );
    }

    /// Mechanically couple two drives sharing one receive PDO.
    pub fn couple(&self, leader: NodeId, follower: NodeId) {
        self.state.lock().couplings.insert(leader, follower);
    }

    pub fn set_online(&self, node: NodeId, online: bool) {
        if let Some(n) = self.state.lock().nodes.get_mut(&node) {
            n.online = online;
        }
    }

    pub fn set_object(&self, node: NodeId, address: ObjectAddress, value: impl Into<ObjectValue>) {
        let mut state = self.state.lock();
        state
            .nodes
            .entry(node)
            .or_default()
            .dictionary
            .insert(address, value.into());
    }

    /// Preload a node's dictionary, e.g. with the defaults of its catalog.
    pub fn seed(&self, node: NodeId, values: impl IntoIterator<Item = (ObjectAddress, ObjectValue)>) {
        let mut state = self.state.lock();
        let dictionary = &mut state.nodes.entry(node).or_default().dictionary;
        for (address, value) in values {
            dictionary.entry(address).or_insert(value);
        }
    }

    pub fn object(&self, node: NodeId, address: ObjectAddress) -> Option<ObjectValue> {
        let state = self.state.lock();
        state.nodes.get(&node)?.dictionary.get(&address).cloned()
    }

    pub fn set_master_object(&self, address: ObjectAddress, value: impl Into<ObjectValue>) {
        self.state.lock().master.insert(address, value.into());
    }

    pub fn fail_writes_to(&self, node: NodeId, address: ObjectAddress) {
        self.state.lock().failing_writes.insert((node, address));
    }

    pub fn operations(&self) -> Vec<BusOperation> {
        self.state.lock().log.clone()
    }

    pub fn clear_operations(&self) {
        self.state.lock().log.clear();
    }

    /// Last value written to a TPDO-mapped object of `node`.
    pub fn tpdo_value(&self, node: NodeId, address: ObjectAddress) -> Option<ObjectValue> {
        self.state.lock().tpdo_mapped.get(&(node, address)).cloned()
    }

    /// Position of an emulated drive.
    pub fn drive_position(&self, node: NodeId) -> Option<i32> {
        let state = self.state.lock();
        state.nodes.get(&node)?.drive.as_ref().map(DriveEmulator::position)
    }

    /// Latch a drive fault, publish it and send the matching EMCY when
    /// `with_emergency` is set.
    pub fn inject_fault(&self, node: NodeId, code: u16, with_emergency: bool) {
        let status = {
            let mut state = self.state.lock();
            let Some(n) = state.nodes.get_mut(&node) else {
                return;
            };
            let Some(drive) = n.drive.as_mut() else {
                return;
            };
            drive.fault(code);
            let status = drive.status().bits();
            n.dictionary.insert(FAULT_REGISTER, ObjectValue::Unsigned16(code));
            status
        };
        warn!("Injected fault 0x{:04x} on node {}", code, node);
        if with_emergency {
            self.emit(EngineEvent::Emergency {
                node,
                message: EmergencyMessage::new(code, 0x01, [0; 5]),
            });
        }
        self.publish_status(node, status);
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn emit(&self, event: EngineEvent) {
        trace!("event {:?}", event);
        if self.events.send(event).is_err() {
            trace!("event receiver gone");
        }
    }

    fn record(&self, op: BusOperation) {
        self.state.lock().log.push(op);
    }

    fn publish_status(&self, node: NodeId, status: u16) {
        let value = ObjectValue::Unsigned16(status);
        {
            let mut state = self.state.lock();
            if let Some(n) = state.nodes.get_mut(&node) {
                n.dictionary.insert(STATUS_WORD, value.clone());
            }
            match &self.layout {
                Some(layout) => {
                    state
                        .master
                        .insert(MasterObjectLayout::address(layout.status_word, node), value);
                }
                None => {
                    state.rpdo.insert((node, STATUS_WORD), value);
                }
            }
        }
        debug!("Node {} publishes status 0x{:04x}", node, status);
        match &self.layout {
            Some(layout) => self.emit(EngineEvent::MasterObjectChanged {
                address: MasterObjectLayout::address(layout.status_word, node),
            }),
            None => self.emit(EngineEvent::RpdoWritten {
                node,
                address: STATUS_WORD,
            }),
        }
    }

    /// Feed a value addressed to `node`'s drive object into the emulator.
    ///
    /// Everything written to a leader reaches its coupled follower as well;
    /// jobs started by one write finish together.
    fn drive_input(&self, node: NodeId, address: ObjectAddress, value: &ObjectValue) {
        let follower = self.state.lock().couplings.get(&node).copied();
        let jobs: Vec<(NodeId, DriveJob)> = std::iter::once(node)
            .chain(follower)
            .filter_map(|target| {
                self.drive_input_one(target, address, value)
                    .map(|job| (target, job))
            })
            .collect();
        if let Some(&(_, job)) = jobs.first() {
            self.schedule(job, jobs);
        }
    }

    fn drive_input_one(
        &self,
        node: NodeId,
        address: ObjectAddress,
        value: &ObjectValue,
    ) -> Option<DriveJob> {
        let (status, job) = {
            let mut state = self.state.lock();
            let drive = state.nodes.get_mut(&node).and_then(|n| n.drive.as_mut())?;
            match (address, value) {
                (OPERATION_MODE, ObjectValue::Integer8(mode)) => {
                    drive.set_mode(*mode);
                    return None;
                }
                (TARGET_POSITION, ObjectValue::Integer32(target)) => {
                    drive.set_target(*target);
                    return None;
                }
                (CONTROL_WORD, ObjectValue::Unsigned16(word)) => {
                    let job = drive.control(*word);
                    (drive.status().bits(), job)
                }
                _ => return None,
            }
        };
        self.publish_status(node, status);
        job
    }

    fn schedule(&self, job: DriveJob, drives: Vec<(NodeId, DriveJob)>) {
        let delay = match job {
            DriveJob::Homing => self.timing.homing,
            DriveJob::Positioning => self.timing.positioning,
        };
        let bus = self.this.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(bus) = bus.upgrade() else {
                return;
            };
            let finished: Vec<(NodeId, u16)> = {
                let mut state = bus.state.lock();
                drives
                    .iter()
                    .filter_map(|&(node, job)| {
                        let drive = state.nodes.get_mut(&node)?.drive.as_mut()?;
                        drive.complete(job).then(|| (node, drive.status().bits()))
                    })
                    .collect()
            };
            for (node, status) in finished {
                debug!("Node {}: {:?} finished", node, job);
                bus.publish_status(node, status);
            }
        });
    }

    /// Map a master mirror address back to the drive object it commands.
    fn mirrored_object(&self, address: ObjectAddress) -> Option<(NodeId, ObjectAddress)> {
        let layout = self.layout.as_ref()?;
        let node = NodeId::new(address.sub_index)?;
        let object = match address.index {
            i if i == layout.control_word => CONTROL_WORD,
            i if i == layout.operation_mode => OPERATION_MODE,
            i if i == layout.position => TARGET_POSITION,
            _ => return None,
        };
        Some((node, object))
    }

    fn reachable(&self, node: NodeId) -> bool {
        self.state.lock().nodes.get(&node).is_some_and(|n| n.online)
    }
}

#[async_trait]
impl ProtocolEngine for SimulatedBus {
    async fn read(
        &self,
        node: NodeId,
        address: ObjectAddress,
        data_type: DataType,
    ) -> Result<ObjectValue, TransportError> {
        self.record(BusOperation::SdoRead(node, address));
        if !self.reachable(node) {
            tokio::time::sleep(self.timing.sdo_timeout).await;
            return Err(TransportError::Timeout);
        }
        let value = self
            .object(node, address)
            .ok_or(TransportError::Aborted {
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
        self.record(BusOperation::SdoWrite(node, address, value.clone()));
        if !self.reachable(node) {
            tokio::time::sleep(self.timing.sdo_timeout).await;
            return Err(TransportError::Timeout);
        }
        {
            let mut state = self.state.lock();
            if state.failing_writes.contains(&(node, address)) {
                return Err(TransportError::Aborted {
                    code: SDO_ABORT_DATA,
                });
            }
            if let Some(n) = state.nodes.get_mut(&node) {
                n.dictionary.insert(address, value.clone());
            }
        }
        self.drive_input(node, address, &value);
        Ok(())
    }

    fn read_master(&self, address: ObjectAddress) -> Option<ObjectValue> {
        self.state.lock().master.get(&address).cloned()
    }

    fn write_master(&self, address: ObjectAddress, value: ObjectValue) -> Result<(), TransportError> {
        self.record(BusOperation::MasterWrite(address, value.clone()));
        self.state.lock().master.insert(address, value.clone());
        if let Some((node, object)) = self.mirrored_object(address) {
            self.drive_input(node, object, &value);
        }
        Ok(())
    }

    fn tpdo_event(&self, group: u16) {
        self.record(BusOperation::TpdoEvent(group));
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
        self.record(BusOperation::TpdoMappedWrite(node, address, value.clone()));
        self.state
            .lock()
            .tpdo_mapped
            .insert((node, address), value.clone());
        if send_event || address != CONTROL_WORD {
            self.drive_input(node, address, &value);
        }
        Ok(())
    }

    fn nmt_command(&self, command: NmtCommand, node: Option<NodeId>) {
        self.record(BusOperation::Nmt(command, node));
        info!("NMT {:?} to {}", command, node.map_or("all".to_string(), |n| n.to_string()));
        self.emit(EngineEvent::NmtCommandIssued { command });

        if command != NmtCommand::ResetNode {
            return;
        }
        let targets: Vec<NodeId> = {
            let mut state = self.state.lock();
            let targets: Vec<NodeId> = match node {
                Some(node) => vec![node],
                None => state.nodes.keys().copied().collect(),
            };
            for target in &targets {
                if let Some(n) = state.nodes.get_mut(target) {
                    if let Some(drive) = n.drive.as_mut() {
                        drive.reset();
                        let status = drive.status().bits();
                        n.dictionary.insert(STATUS_WORD, ObjectValue::Unsigned16(status));
                        n.dictionary.insert(FAULT_REGISTER, ObjectValue::Unsigned16(0));
                    }
                }
            }
            targets
        };
        for target in targets {
            if self.reachable(target) {
                self.emit(EngineEvent::ConfigurationRequested { node: target });
            } else {
                self.emit(EngineEvent::Boot {
                    node: target,
                    state: NmtState::BootUp,
                    error_status: Some('B'),
                    what: String::new(),
                });
            }
        }
    }

    async fn download_description(&self, node: NodeId, blob: &[u8]) -> Result<(), TransportError> {
        self.record(BusOperation::DescriptionDownload(node, blob.len()));
        if self.reachable(node) {
            Ok(())
        } else {
            Err(TransportError::NodeUnavailable(node))
        }
    }

    fn configuration_finished(&self, node: NodeId, succeeded: bool) {
        self.record(BusOperation::ConfigurationFinished(node, succeeded));
        if succeeded {
            self.emit(EngineEvent::Boot {
                node,
                state: NmtState::Start,
                error_status: None,
                what: String::new(),
            });
            self.emit(EngineEvent::NmtStateChanged {
                node,
                state: NmtState::Start,
            });
            self.emit(EngineEvent::NmtCommandIssued {
                command: NmtCommand::Start,
            });
        } else {
            self.emit(EngineEvent::Boot {
                node,
                state: NmtState::PreOperational,
                error_status: Some('J'),
                what: String::new(),
            });
        }
    }
}
