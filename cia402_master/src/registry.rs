//! Driver registry for CiA-402 axes.
//!
//! Owns one [`AxisHandle`] per configured node, the shared
//! [`PairingRegistry`] and the boot-completion bookkeeping. Engine events are
//! routed here and fanned out to the drivers, which decide relevance
//! themselves.
//!
//! The registry is populated at discovery time (`register` takes `&mut self`)
//! and then frozen behind an `Arc` for the dispatch loop.
//!
//! ```text
//!  EngineEvent ──► DriverRegistry::handle_event ──┬──► AxisHandle (node)
//!                                                 └──► AxisHandle (leader of node)
//! ```

use crate::error::RegistryError;
use cia402_common::emcy::EmergencyMessage;
use cia402_common::engine::{EngineEvent, ProtocolEngine};
use cia402_common::nmt::{NmtCommand, NmtState};
use cia402_common::types::{NodeId, ObjectAddress};
use cia402_drive::axis::AxisHandle;
use cia402_drive::error::AxisError;
use cia402_drive::pairing::PairingRegistry;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Per-node notification.
pub type NodeCallback = Arc<dyn Fn(NodeId) + Send + Sync>;

/// System-wide notification.
pub type SystemCallback = Arc<dyn Fn() + Send + Sync>;

/// Progress notifications emitted by the registry.
#[derive(Clone, Default)]
pub struct RegistryCallbacks {
    /// A driver was created for the node.
    pub load_configuration: Option<NodeCallback>,
    /// Configuration of the node begins.
    pub node_configuration: Option<NodeCallback>,
    /// The node finished booting.
    pub boot_completed: Option<NodeCallback>,
    /// Every registered node has booted.
    pub system_ready: Option<SystemCallback>,
}

#[derive(Debug, Default)]
struct BootTracker {
    pending: BTreeSet<NodeId>,
    ready: bool,
}

/// Registry of running axis drivers.
pub struct DriverRegistry {
    engine: Arc<dyn ProtocolEngine>,
    drivers: BTreeMap<NodeId, AxisHandle>,
    pairing: Arc<Mutex<PairingRegistry>>,
    boot: Mutex<BootTracker>,
    callbacks: RegistryCallbacks,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new(engine: Arc<dyn ProtocolEngine>) -> Self {
        Self {
            engine,
            drivers: BTreeMap::new(),
            pairing: Arc::default(),
            boot: Mutex::new(BootTracker::default()),
            callbacks: RegistryCallbacks::default(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: RegistryCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Pairing registry to hand to every `AxisBuilder`.
    pub fn pairing(&self) -> Arc<Mutex<PairingRegistry>> {
        Arc::clone(&self.pairing)
    }

    pub fn engine(&self) -> &Arc<dyn ProtocolEngine> {
        &self.engine
    }

    /// Register a driver.
    ///
    /// # Errors
    /// Returns `RegistryError::DuplicateNode` if the node already has a driver.
    pub fn register(&mut self, handle: AxisHandle) -> Result<(), RegistryError> {
        let node = handle.node();
        if self.drivers.contains_key(&node) {
            return Err(RegistryError::DuplicateNode(node));
        }
        if let Some(callback) = &self.callbacks.load_configuration {
            callback(node);
        }
        self.drivers.insert(node, handle);
        self.boot.get_mut().pending.insert(node);
        info!("Registered driver for node {}", node);
        Ok(())
    }

    /// Get a driver by node id.
    pub fn get(&self, node: NodeId) -> Option<&AxisHandle> {
        self.drivers.get(&node)
    }

    /// Registered nodes in ascending order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.drivers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Whether every registered node has booted since the last reset.
    pub fn is_system_ready(&self) -> bool {
        self.boot.lock().ready
    }

    pub fn require(&self, node: NodeId) -> Result<&AxisHandle, RegistryError> {
        self.drivers
            .get(&node)
            .ok_or(RegistryError::UnknownNode(node))
    }

    // ─── Configuration ──────────────────────────────────────────────

    /// Configure one node and report the outcome to the engine.
    pub async fn configure(&self, node: NodeId) -> Result<(), RegistryError> {
        let handle = self.require(node)?;
        if let Some(callback) = &self.callbacks.node_configuration {
            callback(node);
        }
        info!("Configuring node {}", node);
        let result = handle.configure().await;
        self.engine.configuration_finished(node, result.is_ok());
        result.map_err(|source| RegistryError::Axis { node, source })
    }

    /// Configure every node in ascending id order.
    ///
    /// All nodes are attempted; failures are collected.
    pub async fn configure_all(&self) -> Result<(), RegistryError> {
        let mut failures: Vec<(NodeId, AxisError)> = Vec::new();
        for node in self.nodes() {
            if let Err(RegistryError::Axis { node, source }) = self.configure(node).await {
                warn!("Node {} failed to configure: {}", node, source);
                failures.push((node, source));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Configuration(failures))
        }
    }

    // ─── Status Routing ─────────────────────────────────────────────

    /// A master-dictionary object changed; every driver decides relevance.
    pub fn dispatch_status_changed(&self, address: ObjectAddress) {
        debug!("Master object {} changed", address);
        for handle in self.drivers.values() {
            log_gone(handle.master_object_changed(address));
        }
    }

    /// An RPDO of `node` was written. A follower's RPDO also reaches its leader.
    pub fn on_rpdo_written(&self, node: NodeId, address: ObjectAddress) {
        match self.drivers.get(&node) {
            Some(handle) => log_gone(handle.rpdo_written(address)),
            None => {
                debug!("RPDO {} from unregistered node {}", address, node);
                return;
            }
        }
        let leader = self.pairing.lock().leader_of(node);
        if let Some(leader) = leader.and_then(|leader| self.drivers.get(&leader)) {
            log_gone(leader.follower_rpdo_written(node, address));
        }
    }

    // ─── NMT / Emergencies ──────────────────────────────────────────

    /// Boot report of one node.
    pub fn on_boot(&self, node: NodeId, state: NmtState, error_status: Option<char>, what: &str) {
        let Some(handle) = self.drivers.get(&node) else {
            warn!("Boot report from unregistered node {}", node);
            return;
        };
        log_gone(handle.boot(state, error_status, what));
        if error_status.is_none() {
            self.on_boot_complete(node);
        }
    }

    /// Mark one node booted; fires system-ready once all have reported.
    pub fn on_boot_complete(&self, node: NodeId) {
        if let Some(callback) = &self.callbacks.boot_completed {
            callback(node);
        }

        let ready_now = {
            let mut boot = self.boot.lock();
            boot.pending.remove(&node);
            if boot.pending.is_empty() && !boot.ready {
                boot.ready = true;
                true
            } else {
                false
            }
        };
        debug!("Node {} booted", node);

        if ready_now {
            info!("All {} nodes booted, system ready", self.drivers.len());
            for handle in self.drivers.values() {
                log_gone(handle.system_boot_completed());
            }
            if let Some(callback) = &self.callbacks.system_ready {
                callback();
            }
        }
    }

    pub fn on_emergency(&self, node: NodeId, message: EmergencyMessage) {
        match self.drivers.get(&node) {
            Some(handle) => log_gone(handle.emergency(message)),
            None => warn!("EMCY 0x{:04x} from unregistered node {}", message.code, node),
        }
    }

    /// NMT commands are network-wide; every driver is told.
    pub fn on_nmt_command(&self, command: NmtCommand) {
        for handle in self.drivers.values() {
            log_gone(handle.nmt_command(command));
        }
    }

    pub fn on_nmt_state(&self, node: NodeId, state: NmtState) {
        if let Some(handle) = self.drivers.get(&node) {
            log_gone(handle.nmt_state(state));
        }
    }

    /// Re-arm boot tracking and reset the whole network.
    pub fn reset(&self) {
        {
            let mut boot = self.boot.lock();
            boot.pending = self.drivers.keys().copied().collect();
            boot.ready = false;
        }
        info!("Resetting network ({} nodes)", self.drivers.len());
        self.engine.nmt_command(NmtCommand::ResetNode, None);
    }

    // ─── Dispatch Loop ──────────────────────────────────────────────

    /// Route one engine event.
    ///
    /// Configuration requests run on their own task so the loop keeps
    /// delivering status words while a node is being configured.
    pub fn handle_event(self: &Arc<Self>, event: EngineEvent) {
        match event {
            EngineEvent::ConfigurationRequested { node } => {
                let registry = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = registry.configure(node).await {
                        error!("Configuration of node {} failed: {}", node, e);
                    }
                });
            }
            EngineEvent::Boot {
                node,
                state,
                error_status,
                what,
            } => self.on_boot(node, state, error_status, &what),
            EngineEvent::RpdoWritten { node, address } => self.on_rpdo_written(node, address),
            EngineEvent::MasterObjectChanged { address } => self.dispatch_status_changed(address),
            EngineEvent::NmtCommandIssued { command } => self.on_nmt_command(command),
            EngineEvent::NmtStateChanged { node, state } => self.on_nmt_state(node, state),
            EngineEvent::Emergency { node, message } => self.on_emergency(node, message),
        }
    }

    /// Consume engine events until the sender side closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
        info!("Dispatch loop started for {} nodes", self.drivers.len());
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        info!("Dispatch loop stopped");
    }
}

fn log_gone(result: Result<(), AxisError>) {
    if let Err(e) = result {
        warn!("{}", e);
    }
}
