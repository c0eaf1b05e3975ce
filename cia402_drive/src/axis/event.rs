//! Messages processed by the axis executor.

use crate::command::{HomingRequest, MotionRequest, MoveRequest};
use crate::idle_queue::IdleCallback;
use crate::state::MotionState;
use cia402_common::emcy::EmergencyMessage;
use cia402_common::error::ConfigureError;
use cia402_common::nmt::{NmtCommand, NmtState};
use cia402_common::types::{NodeId, ObjectAddress};
use std::fmt;
use tokio::sync::oneshot;

pub(crate) enum AxisEvent {
    Configure {
        reply: oneshot::Sender<Result<(), ConfigureError>>,
    },
    Home {
        request: HomingRequest,
        on_idle: IdleCallback,
    },
    Move {
        request: MoveRequest,
        on_idle: IdleCallback,
    },
    RecoverFromFault {
        on_idle: IdleCallback,
    },
    /// A deferred request released by the idle queue.
    Start(MotionRequest),
    /// A state switch posted by the executor to itself.
    Transition(MotionState),
    RpdoWritten(ObjectAddress),
    FollowerRpdoWritten {
        follower: NodeId,
        address: ObjectAddress,
    },
    MasterObjectChanged(ObjectAddress),
    Emergency(EmergencyMessage),
    Boot {
        state: NmtState,
        error_status: Option<char>,
        what: String,
    },
    NmtCommand(NmtCommand),
    NmtState(NmtState),
    SystemBootCompleted,
    WatchdogExpired,
}

impl fmt::Debug for AxisEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configure { .. } => f.write_str("Configure"),
            Self::Home { request, .. } => write!(f, "Home({request:?})"),
            Self::Move { request, .. } => write!(f, "Move({request:?})"),
            Self::RecoverFromFault { .. } => f.write_str("RecoverFromFault"),
            Self::Start(request) => write!(f, "Start({request})"),
            Self::Transition(state) => write!(f, "Transition({state})"),
            Self::RpdoWritten(address) => write!(f, "RpdoWritten({address})"),
            Self::FollowerRpdoWritten { follower, address } => {
                write!(f, "FollowerRpdoWritten({follower}, {address})")
            }
            Self::MasterObjectChanged(address) => write!(f, "MasterObjectChanged({address})"),
            Self::Emergency(message) => write!(f, "Emergency(0x{:04x})", message.code),
            Self::Boot {
                state, error_status, ..
            } => write!(f, "Boot({state}, {error_status:?})"),
            Self::NmtCommand(command) => write!(f, "NmtCommand({command:?})"),
            Self::NmtState(state) => write!(f, "NmtState({state})"),
            Self::SystemBootCompleted => f.write_str("SystemBootCompleted"),
            Self::WatchdogExpired => f.write_str("WatchdogExpired"),
        }
    }
}
