//! Axis executor: one CiA-402 drive driven by its own tokio task.
//!
//! [`AxisBuilder::spawn`] starts the executor and returns an [`AxisHandle`].
//! All motion requests and engine notifications travel through the handle
//! into a single queue, so the state machine never runs concurrently with
//! itself.
//!
//! # Example
//!
//! ```rust,ignore
//! let handle = AxisBuilder::new(config, engine)
//!     .pairing(registry.pairing())
//!     .on_error(Arc::new(|code, msg| eprintln!("0x{code:04x} {msg}")))
//!     .spawn();
//! handle.configure().await?;
//! handle.move_to(request, || println!("idle again"))?;
//! ```

mod driver;
mod event;
mod handle;

pub use driver::{NmtStateHook, RpdoHook};
pub use handle::AxisHandle;

use crate::command::{HomingRequest, MoveRequest};
use crate::config::DriverConfig;
use crate::error::{AxisError, ErrorCallback};
use crate::idle_queue::IdleQueue;
use crate::pairing::PairingRegistry;
use crate::sequencer::ClearConfiguration;
use crate::setter::CommunicationConfig;
use crate::state::{LeaderMirror, MotionState};
use async_trait::async_trait;
use cia402_common::engine::ProtocolEngine;
use cia402_common::status::StatusWord;
use cia402_common::types::{NodeId, ObjectAddress};
use driver::AxisDriver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Default delay before a hanging fault reset escalates to a node reset.
pub const DEFAULT_FAULT_RESET_DELAY: Duration = Duration::from_secs(1);

// ─── Capabilities ───────────────────────────────────────────────────

/// A node that can receive its configuration.
#[async_trait]
pub trait ConfigurableDevice: Send + Sync {
    fn node(&self) -> NodeId;
    async fn configure(&self) -> Result<(), AxisError>;
}

/// A node that accepts motion requests.
pub trait MotionControllable: Send + Sync {
    fn home(&self, request: HomingRequest, on_idle: Box<dyn FnOnce() + Send>) -> Result<(), AxisError>;
    fn move_to(&self, request: MoveRequest, on_idle: Box<dyn FnOnce() + Send>) -> Result<(), AxisError>;
    fn recover_from_fault(&self, on_idle: Box<dyn FnOnce() + Send>) -> Result<(), AxisError>;
    fn state(&self) -> MotionState;
}

#[async_trait]
impl ConfigurableDevice for AxisHandle {
    fn node(&self) -> NodeId {
        AxisHandle::node(self)
    }

    async fn configure(&self) -> Result<(), AxisError> {
        AxisHandle::configure(self).await
    }
}

impl MotionControllable for AxisHandle {
    fn home(&self, request: HomingRequest, on_idle: Box<dyn FnOnce() + Send>) -> Result<(), AxisError> {
        AxisHandle::home(self, request, on_idle)
    }

    fn move_to(&self, request: MoveRequest, on_idle: Box<dyn FnOnce() + Send>) -> Result<(), AxisError> {
        AxisHandle::move_to(self, request, on_idle)
    }

    fn recover_from_fault(&self, on_idle: Box<dyn FnOnce() + Send>) -> Result<(), AxisError> {
        AxisHandle::recover_from_fault(self, on_idle)
    }

    fn state(&self) -> MotionState {
        AxisHandle::state(self)
    }
}

// ─── Builder ────────────────────────────────────────────────────────

/// Collects the collaborators of one axis before spawning its executor.
pub struct AxisBuilder {
    config: DriverConfig,
    engine: Arc<dyn ProtocolEngine>,
    pairing: Option<Arc<Mutex<PairingRegistry>>>,
    communication: Option<CommunicationConfig>,
    on_error: Option<ErrorCallback>,
    clear: Option<Arc<dyn ClearConfiguration>>,
    rpdo_hooks: HashMap<ObjectAddress, RpdoHook>,
    nmt_state_hook: Option<NmtStateHook>,
    fault_reset_delay: Duration,
}

impl AxisBuilder {
    pub fn new(config: DriverConfig, engine: Arc<dyn ProtocolEngine>) -> Self {
        Self {
            config,
            engine,
            pairing: None,
            communication: None,
            on_error: None,
            clear: None,
            rpdo_hooks: HashMap::new(),
            nmt_state_hook: None,
            fault_reset_delay: DEFAULT_FAULT_RESET_DELAY,
        }
    }

    /// Shares a pairing registry with the other axes of the bus.
    pub fn pairing(mut self, pairing: Arc<Mutex<PairingRegistry>>) -> Self {
        self.pairing = Some(pairing);
        self
    }

    /// Defaults to SDO setters.
    pub fn communication(mut self, communication: CommunicationConfig) -> Self {
        self.communication = Some(communication);
        self
    }

    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn clear_configuration(mut self, clear: Arc<dyn ClearConfiguration>) -> Self {
        self.clear = Some(clear);
        self
    }

    pub fn rpdo_hook(mut self, address: ObjectAddress, hook: RpdoHook) -> Self {
        self.rpdo_hooks.insert(address, hook);
        self
    }

    pub fn nmt_state_hook(mut self, hook: NmtStateHook) -> Self {
        self.nmt_state_hook = Some(hook);
        self
    }

    pub fn fault_reset_delay(mut self, delay: Duration) -> Self {
        self.fault_reset_delay = delay;
        self
    }

    /// Starts the executor on the current tokio runtime.
    pub fn spawn(self) -> AxisHandle {
        let node = self.config.node;
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(MotionState::Initial);
        let communication = self
            .communication
            .unwrap_or_else(|| CommunicationConfig::sdo(Arc::clone(&self.engine), node));

        let driver = AxisDriver {
            node,
            engine: self.engine,
            config: self.config,
            pairing: self.pairing.unwrap_or_default(),
            communication,
            on_error: self.on_error,
            clear: self.clear,
            rpdo_hooks: self.rpdo_hooks,
            nmt_state_hook: self.nmt_state_hook,
            fault_reset_delay: self.fault_reset_delay,
            self_tx: tx.downgrade(),
            state_tx,
            state: MotionState::Initial,
            mirror: LeaderMirror::default(),
            queue: IdleQueue::default(),
            last_status: StatusWord::empty(),
            emergency_seen: false,
            master_command: None,
            node_state: None,
            move_request: None,
            job_started: Instant::now(),
        };
        tokio::spawn(driver.run(rx));

        AxisHandle::new(node, tx, state_rx)
    }
}
