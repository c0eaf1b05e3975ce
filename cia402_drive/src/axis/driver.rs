//! The per-axis executor.
//!
//! One tokio task owns all state of one axis and processes [`AxisEvent`]s in
//! arrival order. Suspension only happens while awaiting the engine or a
//! setter; events arriving meanwhile wait in the channel. Follow-up work
//! (deferred requests, fault-reset outcomes, watchdog expiry) is posted back
//! into the same channel.

use super::event::AxisEvent;
use crate::command::{HomingRequest, MotionRequest, MoveRequest};
use crate::config::DriverConfig;
use crate::error::{ErrorCallback, SetterFailure};
use crate::idle_queue::{IdleCallback, IdleQueue};
use crate::pairing::{PairingRegistry, Role};
use crate::sequencer::{ClearConfiguration, ConfigurationSequencer};
use crate::setter::CommunicationConfig;
use crate::state::{Channel, LeaderMirror, MotionState, follower_commits, next_state};
use cia402_common::consts::{
    CONTROL_WORD, FAULT_REGISTER, HOME_OFFSET, HOMING_ACCELERATION, HOMING_METHOD,
    HOMING_RELEASE_SPEED, HOMING_SEARCH_SPEED, OPERATION_MODE, STATUS_WORD,
};
use cia402_common::emcy::EmergencyMessage;
use cia402_common::engine::{ProtocolEngine, read_scalar, write_scalar};
use cia402_common::error::{AdditionalErrorCode, ConfigureError, TransportError};
use cia402_common::nmt::{BOOT_ERROR_NODE_MISSING, NmtCommand, NmtState, boot_error_description};
use cia402_common::status::{OperationMode, StatusWord, control_word};
use cia402_common::types::{NodeId, ObjectAddress, ObjectValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Callback run when an RPDO-mapped object of the node is written.
pub type RpdoHook = Arc<dyn Fn() + Send + Sync>;

/// Callback run when the node reports a new NMT state.
pub type NmtStateHook = Arc<dyn Fn(NmtState) + Send + Sync>;

pub(crate) struct AxisDriver {
    pub(crate) node: NodeId,
    pub(crate) engine: Arc<dyn ProtocolEngine>,
    pub(crate) config: DriverConfig,
    pub(crate) pairing: Arc<Mutex<PairingRegistry>>,
    pub(crate) communication: CommunicationConfig,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) clear: Option<Arc<dyn ClearConfiguration>>,
    pub(crate) rpdo_hooks: HashMap<ObjectAddress, RpdoHook>,
    pub(crate) nmt_state_hook: Option<NmtStateHook>,
    pub(crate) fault_reset_delay: Duration,
    pub(crate) self_tx: mpsc::WeakUnboundedSender<AxisEvent>,
    pub(crate) state_tx: watch::Sender<MotionState>,

    pub(crate) state: MotionState,
    pub(crate) mirror: LeaderMirror,
    pub(crate) queue: IdleQueue,
    pub(crate) last_status: StatusWord,
    pub(crate) emergency_seen: bool,
    pub(crate) master_command: Option<NmtCommand>,
    pub(crate) node_state: Option<NmtState>,
    pub(crate) move_request: Option<MoveRequest>,
    pub(crate) job_started: Instant,
}

impl AxisDriver {
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<AxisEvent>) {
        debug!("Node {}: executor started", self.node);
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
        debug!("Node {}: executor stopped", self.node);
    }

    async fn handle(&mut self, event: AxisEvent) {
        match event {
            AxisEvent::Configure { reply } => {
                let result = self.configure().await;
                let _ = reply.send(result);
            }
            AxisEvent::Home { request, on_idle } => {
                self.request(MotionRequest::Home(request), on_idle).await
            }
            AxisEvent::Move { request, on_idle } => {
                self.request(MotionRequest::Move(request), on_idle).await
            }
            AxisEvent::RecoverFromFault { on_idle } => self.recover_from_fault(on_idle).await,
            AxisEvent::Start(request) => {
                if self.state.is_fault_handling() {
                    warn!(
                        "Node {}: dropping {} issued while in {}",
                        self.node, request, self.state
                    );
                } else {
                    self.begin(request).await;
                }
            }
            AxisEvent::Transition(next) => self.set_state(next).await,
            AxisEvent::RpdoWritten(address) => self.on_rpdo_written(address).await,
            AxisEvent::FollowerRpdoWritten { follower, address } => {
                if address == STATUS_WORD {
                    if let Some(raw) = self.rpdo_status_word(follower) {
                        self.handle_status_word(raw, Channel::Follower).await;
                    }
                }
            }
            AxisEvent::MasterObjectChanged(address) => self.on_master_object_changed(address).await,
            AxisEvent::Emergency(message) => self.on_emergency(message),
            AxisEvent::Boot {
                state,
                error_status,
                what,
            } => self.on_boot(state, error_status, &what).await,
            AxisEvent::NmtCommand(command) => {
                info!("Node {}: NMT command {:?}", self.node, command);
                self.master_command = Some(command);
                self.initial_state_switching().await;
            }
            AxisEvent::NmtState(state) => {
                info!("Node {}: NMT state {}", self.node, state);
                self.node_state = Some(state);
                if let Some(hook) = &self.nmt_state_hook {
                    hook(state);
                }
                self.initial_state_switching().await;
            }
            AxisEvent::SystemBootCompleted => {
                debug!("Node {}: system boot completed", self.node);
            }
            AxisEvent::WatchdogExpired => {
                if self.state == MotionState::FaultReset {
                    warn!("Node {}: fault reset hangs, resetting node", self.node);
                    self.set_state(MotionState::NodeReset).await;
                }
            }
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────

    fn post(&self, event: AxisEvent) {
        if let Some(tx) = self.self_tx.upgrade() {
            let _ = tx.send(event);
        }
    }

    fn report(&self, code: u16, message: String) {
        error!("Node {}: 0x{:04x} {}", self.node, code, message);
        if let Some(callback) = &self.on_error {
            callback(code, message);
        }
    }

    fn role(&self) -> Role {
        self.pairing.lock().role_of(self.node)
    }

    fn elapsed_ms(&self) -> f64 {
        self.job_started.elapsed().as_secs_f64() * 1000.0
    }

    fn rpdo_status_word(&self, node: NodeId) -> Option<u16> {
        match self.engine.rpdo_mapped(node, STATUS_WORD) {
            Some(ObjectValue::Unsigned16(raw)) => Some(raw),
            other => {
                warn!("Node {}: no status word mapped for node {}: {:?}", self.node, node, other);
                None
            }
        }
    }

    // ─── Configuration ──────────────────────────────────────────────

    async fn configure(&mut self) -> Result<(), ConfigureError> {
        let result = ConfigurationSequencer::new(self.engine.as_ref(), &self.config, &self.pairing)
            .run_with(self.clear.as_deref())
            .await;

        if let Err(e) = result {
            self.report(
                AdditionalErrorCode::NodeConfigurationFailed.code(),
                format!("Failed to send the configuration to the motor: {e}"),
            );
            return Err(e);
        }

        if self.state == MotionState::Initial {
            let raw: u16 = read_scalar(self.engine.as_ref(), self.node, STATUS_WORD)
                .await
                .map_err(|source| ConfigureError::RemoteRead {
                    address: STATUS_WORD,
                    source,
                })?;
            self.last_status = StatusWord::from_raw(raw);
            let next = next_state(self.state, self.last_status, self.node);
            self.set_state(next).await;
        }
        Ok(())
    }

    // ─── Motion Requests ────────────────────────────────────────────

    async fn request(&mut self, request: MotionRequest, on_idle: IdleCallback) {
        if self.state == MotionState::Idle {
            self.queue.push_callback(on_idle);
            self.begin(request).await;
        } else {
            debug!("Node {}: {} deferred while {}", self.node, request, self.state);
            self.queue.push_deferred(request);
            self.queue.push_callback(on_idle);
        }
    }

    async fn begin(&mut self, request: MotionRequest) {
        let leads = self.role().follower().is_some();
        match request {
            MotionRequest::Home(homing) => {
                if leads {
                    self.mirror.own = MotionState::PrepareHoming;
                }
                self.prepare_homing(homing).await;
            }
            MotionRequest::Move(movement) => {
                self.move_request = Some(movement);
                if leads {
                    self.mirror.own = MotionState::PrepareMove;
                }
                self.set_state(MotionState::PrepareMove).await;
            }
        }
    }

    async fn recover_from_fault(&mut self, on_idle: IdleCallback) {
        info!("Node {}: recovering in state {}", self.node, self.state);
        self.queue.push_callback(on_idle);
        match self.state {
            MotionState::Fault => self.set_state(MotionState::NodeReset).await,
            MotionState::FaultReset => self.arm_watchdog(),
            MotionState::Idle => self.drain_idle_queue(),
            _ => debug!("Node {}: nothing to recover in {}", self.node, self.state),
        }
    }

    fn arm_watchdog(&self) {
        let tx = self.self_tx.clone();
        let delay = self.fault_reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(AxisEvent::WatchdogExpired);
            }
        });
    }

    fn drain_idle_queue(&mut self) {
        let drained = self.queue.drain_one();
        for request in drained.start {
            self.post(AxisEvent::Start(request));
        }
    }

    async fn prepare_homing(&mut self, request: HomingRequest) {
        self.set_state(MotionState::PrepareHoming).await;
        if let Err(e) = self.write_homing_parameters(request).await {
            self.report(AdditionalErrorCode::WriteToNodeError.code(), e.to_string());
        }
    }

    async fn write_homing_parameters(&mut self, request: HomingRequest) -> Result<(), SetterFailure> {
        let engine = self.engine.as_ref();
        let node = self.node;
        write_scalar(engine, node, OPERATION_MODE, OperationMode::ProfilePosition.as_i8())
            .await
            .map_err(SetterFailure::wrap("While setting operation mode to 'Profile Position Mode'"))?;
        write_scalar(engine, node, HOMING_METHOD, request.method.as_i8())
            .await
            .map_err(SetterFailure::wrap("While setting the homing method"))?;
        write_scalar(engine, node, HOMING_SEARCH_SPEED, request.search_speed)
            .await
            .map_err(SetterFailure::wrap("While setting the homing search speed"))?;
        write_scalar(engine, node, HOMING_RELEASE_SPEED, request.release_speed)
            .await
            .map_err(SetterFailure::wrap("While setting the homing release speed"))?;
        write_scalar(engine, node, HOMING_ACCELERATION, request.acceleration)
            .await
            .map_err(SetterFailure::wrap("While setting the homing acceleration"))?;
        write_scalar(engine, node, HOME_OFFSET, request.offset)
            .await
            .map_err(SetterFailure::wrap("While setting the home offset"))?;
        write_scalar(engine, node, OPERATION_MODE, OperationMode::Homing.as_i8())
            .await
            .map_err(SetterFailure::wrap("While setting operation mode to 'Homing Mode'"))?;
        write_scalar(engine, node, CONTROL_WORD, control_word::ENABLE_OPERATION)
            .await
            .map_err(SetterFailure::wrap("While setting the control word to 'Enable Operation'"))
    }

    async fn prepare_move(&mut self) -> Result<(), SetterFailure> {
        let Some(request) = self.move_request else {
            warn!("Node {}: PREPARE_MOVE without a move request", self.node);
            return Ok(());
        };
        if self.role().follower().is_some() {
            self.mirror.follower = MotionState::PrepareMove;
        }

        let setters = &self.communication;
        setters
            .operation_mode
            .set(OperationMode::ProfilePosition.as_i8())
            .await
            .map_err(SetterFailure::wrap("While setting operation mode to 'Profile Position Mode'"))?;
        setters
            .control_word
            .set(control_word::SWITCH_ON)
            .await
            .map_err(SetterFailure::wrap("While setting the control word to 'Disable Operation'"))?;
        setters
            .position
            .set(request.position)
            .await
            .map_err(SetterFailure::wrap("While setting the position"))?;
        setters
            .velocity
            .set(request.velocity)
            .await
            .map_err(SetterFailure::wrap("While setting the velocity"))?;
        setters
            .acceleration
            .set(request.acceleration)
            .await
            .map_err(SetterFailure::wrap("While setting the acceleration"))?;
        setters
            .deceleration
            .set(request.deceleration)
            .await
            .map_err(SetterFailure::wrap("While setting the deceleration"))?;
        setters
            .control_word
            .set(request.mode.arm_word())
            .await
            .map_err(SetterFailure::wrap(
                "While setting the control word to 'Enable Operation' + move mode",
            ))
    }

    async fn execute_move(&mut self) -> Result<(), SetterFailure> {
        let mode = self.move_request.map(|r| r.mode).unwrap_or_default();
        let result = self
            .communication
            .control_word
            .set(mode.execute_word())
            .await
            .map_err(SetterFailure::wrap("While switching the motor through the control word"));
        info!("Node {}: move commands finished after {:.3}ms", self.node, self.elapsed_ms());
        result
    }

    // ─── Status Words ───────────────────────────────────────────────

    async fn on_rpdo_written(&mut self, address: ObjectAddress) {
        if let Some(hook) = self.rpdo_hooks.get(&address) {
            hook();
        }
        if address == STATUS_WORD {
            if let Some(raw) = self.rpdo_status_word(self.node) {
                self.handle_status_word(raw, Channel::Own).await;
            }
        }
    }

    async fn on_master_object_changed(&mut self, address: ObjectAddress) {
        let own = self.communication.is_status_word(address, self.node);
        let of_follower = self
            .role()
            .follower()
            .is_some_and(|follower| self.communication.is_status_word(address, follower));
        if !own && !of_follower {
            return;
        }
        match self.engine.read_master(address) {
            Some(ObjectValue::Unsigned16(raw)) => {
                debug!("Node {}: master object {} = 0x{:04x}", self.node, address, raw);
                let channel = if of_follower {
                    Channel::Follower
                } else {
                    Channel::Own
                };
                self.handle_status_word(raw, channel).await;
            }
            other => warn!("Node {}: master object {} holds {:?}", self.node, address, other),
        }
    }

    pub(crate) async fn handle_status_word(&mut self, raw: u16, channel: Channel) {
        let status = StatusWord::from_raw(raw);
        if channel == Channel::Own {
            self.last_status = status;
        }

        match self.role() {
            Role::Standalone => {
                if channel == Channel::Own {
                    let next = next_state(self.state, status, self.node);
                    self.set_state(next).await;
                }
            }
            Role::Leader { follower } => {
                if let Some(next) = self.mirror.observe(self.state, channel, status, self.node, follower) {
                    self.set_state(next).await;
                }
            }
            Role::Follower { .. } => {
                if channel == Channel::Own {
                    let next = next_state(self.state, status, self.node);
                    if follower_commits(self.state, next) {
                        debug!(
                            "Node {}: local follower handling 0x{:04x} {} --> {}",
                            self.node, raw, self.state, next
                        );
                        self.set_state(next).await;
                    }
                }
            }
        }
    }

    // ─── NMT / Emergencies ──────────────────────────────────────────

    fn on_emergency(&mut self, message: EmergencyMessage) {
        self.emergency_seen = message.is_error();
        if self.emergency_seen {
            self.report(message.code, message.describe());
        }
    }

    async fn on_boot(&mut self, state: NmtState, error_status: Option<char>, what: &str) {
        info!("Node {}: boot in NMT state {}, es {:?}", self.node, state, error_status);
        match error_status {
            Some(es) => {
                let what = if what.is_empty() {
                    boot_error_description(es)
                } else {
                    what
                };
                let code = if es == BOOT_ERROR_NODE_MISSING {
                    AdditionalErrorCode::NodeMissing
                } else {
                    AdditionalErrorCode::NodeBootFailed
                };
                self.report(
                    code.code(),
                    format!("In NMT state {state}: CiA-302 slave boot error status: {es} ({what})"),
                );
            }
            None => {
                self.node_state = Some(NmtState::Start);
                self.initial_state_switching().await;
            }
        }
    }

    async fn initial_state_switching(&mut self) {
        if self.master_command != Some(NmtCommand::Start) || self.node_state != Some(NmtState::Start) {
            return;
        }
        debug!("Node {}: initial state switching from {}", self.node, self.state);
        let next = match self.state {
            MotionState::Fault | MotionState::NodeReset => MotionState::FaultReset,
            MotionState::InitialPowerOn => MotionState::CyclePowerShutdown,
            MotionState::InitialPowerOff => MotionState::PowerOnDisableOperation,
            _ => return,
        };
        self.set_state(next).await;
    }

    // ─── State Switching ────────────────────────────────────────────

    pub(crate) async fn set_state(&mut self, next: MotionState) {
        let mut next = next;
        loop {
            if next == self.state {
                debug!("Node {}: already in {}", self.node, next);
                return;
            }
            if next == MotionState::NodeReset
                && !matches!(self.state, MotionState::Fault | MotionState::FaultReset)
            {
                warn!("Node {}: NOT Switching {} --> {}", self.node, self.state, next);
                return;
            }

            let previous = self.state;
            info!("Node {}: Switching {} --> {}", self.node, previous, next);
            self.state = next;
            self.state_tx.send_replace(next);

            match self.enter(previous).await {
                Some(follow_up) => {
                    // A leader's own channel switches along with the follow-up.
                    if self.role().follower().is_some() {
                        self.mirror.own = follow_up;
                    }
                    next = follow_up;
                }
                None => return,
            }
        }
    }

    /// Entry action of the current state; may return a follow-up state.
    async fn enter(&mut self, previous: MotionState) -> Option<MotionState> {
        use MotionState as S;
        let node = self.node;

        match self.state {
            S::Initial => {}
            S::InitialPowerOn | S::InitialPowerOff | S::PrepareHoming => {
                self.job_started = Instant::now();
            }
            S::CyclePowerShutdown => {
                info!("Node {}: Entering CYCLE_POWER_SHUTDOWN after {:.3}ms", node, self.elapsed_ms());
                if let Err(e) =
                    write_scalar(self.engine.as_ref(), node, CONTROL_WORD, control_word::SHUTDOWN).await
                {
                    warn!("Node {}: shutdown command failed: {}", node, e);
                }
            }
            S::PowerOnDisableOperation => {
                info!(
                    "Node {}: Entering POWER_ON_DISABLE_OPERATION after {:.3}ms",
                    node,
                    self.elapsed_ms()
                );
                if let Err(e) = self.communication.control_word.set(control_word::SWITCH_ON).await {
                    warn!("Node {}: switch-on command failed: {}", node, e);
                }
            }
            S::PrepareMove => {
                self.job_started = Instant::now();
                if let Err(e) = self.prepare_move().await {
                    self.report(AdditionalErrorCode::WriteToNodeError.code(), e.to_string());
                }
            }
            S::ReadyToMove => {
                info!("Node {}: READY_TO_MOVE after {:.3}ms", node, self.elapsed_ms());
                if let Err(e) = self.execute_move().await {
                    self.report(AdditionalErrorCode::WriteToNodeError.code(), e.to_string());
                }
            }
            S::Moving => info!("Node {}: Start MOVING after {:.3}ms", node, self.elapsed_ms()),
            S::ReadyForHoming => {
                if let Err(e) =
                    write_scalar(self.engine.as_ref(), node, CONTROL_WORD, control_word::START_HOMING)
                        .await
                {
                    warn!("Node {}: start homing command failed: {}", node, e);
                }
                return Some(S::Homing);
            }
            S::Homing => info!("Node {}: Start HOMING after {:.3}ms", node, self.elapsed_ms()),
            S::Idle => {
                info!("Node {}: Entering IDLE after {:.3}ms", node, self.elapsed_ms());
                self.drain_idle_queue();
            }
            S::Fault => {
                let dropped = self.queue.clear();
                if dropped > 0 {
                    info!("Node {}: dropped {} pending idle entries", node, dropped);
                }
                if previous != S::Initial {
                    self.handle_fault().await;
                }
            }
            S::FaultReset => self.perform_fault_reset().await,
            S::NodeReset => self.engine.nmt_command(NmtCommand::ResetNode, Some(node)),
        }
        None
    }

    async fn handle_fault(&mut self) {
        if self.emergency_seen {
            debug!("Node {}: fault already reported by emergency", self.node);
            return;
        }
        match read_scalar::<u16>(self.engine.as_ref(), self.node, FAULT_REGISTER).await {
            Ok(0) => {}
            Ok(code) => self.report(code, format!("Motor Fault: code: 0x{code:04x}")),
            Err(e) => self.report(
                AdditionalErrorCode::ReadErrorFailed.code(),
                format!("Error while reading the Fault Register: {e}"),
            ),
        }
    }

    async fn perform_fault_reset(&mut self) {
        match next_state(MotionState::Initial, self.last_status, self.node) {
            MotionState::Fault => {
                let result: Result<(), TransportError> =
                    write_scalar(self.engine.as_ref(), self.node, CONTROL_WORD, control_word::FAULT_RESET)
                        .await;
                if let Err(e) = result {
                    warn!("Node {}: fault reset command failed: {}", self.node, e);
                }
            }
            MotionState::InitialPowerOn => {
                self.post(AxisEvent::Transition(MotionState::CyclePowerShutdown))
            }
            MotionState::InitialPowerOff => {
                self.post(AxisEvent::Transition(MotionState::PowerOnDisableOperation))
            }
            _ => {}
        }
    }
}
