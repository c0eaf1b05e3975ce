use super::event::AxisEvent;
use crate::command::{HomingRequest, MoveRequest};
use crate::error::AxisError;
use crate::state::MotionState;
use cia402_common::emcy::EmergencyMessage;
use cia402_common::error::ConfigureError;
use cia402_common::nmt::{NmtCommand, NmtState};
use cia402_common::types::{NodeId, ObjectAddress};
use tokio::sync::{mpsc, oneshot, watch};

/// Cloneable front of a running axis executor.
///
/// Every method only enqueues an event; ordering between calls made from
/// one task is preserved. Fails with [`AxisError::ExecutorGone`] once the
/// executor has stopped.
#[derive(Debug, Clone)]
pub struct AxisHandle {
    node: NodeId,
    tx: mpsc::UnboundedSender<AxisEvent>,
    state: watch::Receiver<MotionState>,
}

impl AxisHandle {
    pub(crate) fn new(
        node: NodeId,
        tx: mpsc::UnboundedSender<AxisEvent>,
        state: watch::Receiver<MotionState>,
    ) -> Self {
        Self { node, tx, state }
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Last published motion state.
    pub fn state(&self) -> MotionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MotionState> {
        self.state.clone()
    }

    /// Resolves once the axis publishes `target` (immediately if already there).
    pub async fn wait_for(&self, target: MotionState) -> Result<(), AxisError> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| AxisError::ExecutorGone(self.node))
    }

    fn post(&self, event: AxisEvent) -> Result<(), AxisError> {
        self.tx
            .send(event)
            .map_err(|_| AxisError::ExecutorGone(self.node))
    }

    // ─── Requests ───────────────────────────────────────────────────

    /// Runs the configuration sequencer on the executor and waits for it.
    pub async fn configure(&self) -> Result<(), AxisError> {
        let (reply, rx) = oneshot::channel::<Result<(), ConfigureError>>();
        self.post(AxisEvent::Configure { reply })?;
        let result = rx.await.map_err(|_| AxisError::ExecutorGone(self.node))?;
        Ok(result?)
    }

    pub fn home(
        &self,
        request: HomingRequest,
        on_idle: impl FnOnce() + Send + 'static,
    ) -> Result<(), AxisError> {
        self.post(AxisEvent::Home {
            request,
            on_idle: Box::new(on_idle),
        })
    }

    pub fn move_to(
        &self,
        request: MoveRequest,
        on_idle: impl FnOnce() + Send + 'static,
    ) -> Result<(), AxisError> {
        self.post(AxisEvent::Move {
            request,
            on_idle: Box::new(on_idle),
        })
    }

    pub fn recover_from_fault(&self, on_idle: impl FnOnce() + Send + 'static) -> Result<(), AxisError> {
        self.post(AxisEvent::RecoverFromFault {
            on_idle: Box::new(on_idle),
        })
    }

    // ─── Engine Notifications ───────────────────────────────────────

    pub fn rpdo_written(&self, address: ObjectAddress) -> Result<(), AxisError> {
        self.post(AxisEvent::RpdoWritten(address))
    }

    /// A follower's RPDO forwarded to its leader.
    pub fn follower_rpdo_written(&self, follower: NodeId, address: ObjectAddress) -> Result<(), AxisError> {
        self.post(AxisEvent::FollowerRpdoWritten { follower, address })
    }

    pub fn master_object_changed(&self, address: ObjectAddress) -> Result<(), AxisError> {
        self.post(AxisEvent::MasterObjectChanged(address))
    }

    pub fn emergency(&self, message: EmergencyMessage) -> Result<(), AxisError> {
        self.post(AxisEvent::Emergency(message))
    }

    pub fn boot(
        &self,
        state: NmtState,
        error_status: Option<char>,
        what: impl Into<String>,
    ) -> Result<(), AxisError> {
        self.post(AxisEvent::Boot {
            state,
            error_status,
            what: what.into(),
        })
    }

    pub fn nmt_command(&self, command: NmtCommand) -> Result<(), AxisError> {
        self.post(AxisEvent::NmtCommand(command))
    }

    pub fn nmt_state(&self, state: NmtState) -> Result<(), AxisError> {
        self.post(AxisEvent::NmtState(state))
    }

    pub fn system_boot_completed(&self) -> Result<(), AxisError> {
        self.post(AxisEvent::SystemBootCompleted)
    }
}
