//! Axis motion states and the status-word transition function.
//!
//! ## Transitions
//!
//! ```text
//! any ──FAULT bit──► FAULT
//! INITIAL ──switched off──► INITIAL_POWER_OFF      INITIAL ──other──► INITIAL_POWER_ON
//! any ──switched off──► POWER_ON_DISABLE_OPERATION
//!
//! powered, operation disabled:
//!   POWER_ON_DISABLE_OPERATION ──► IDLE
//!   FAULT ──► FAULT_RESET ──► CYCLE_POWER_SHUTDOWN      (manufacturer bit 8 clear)
//!
//! powered, operation enabled:
//!   PREPARE_HOMING ──► READY_FOR_HOMING ──TR=0,b12=0,b13=0──► HOMING
//!   HOMING ──TR=1──► POWER_ON_DISABLE_OPERATION (attained) | FAULT
//!   PREPARE_MOVE ──ack──► READY_TO_MOVE ──TR=0,ack=0──► MOVING ──TR=1──► POWER_ON_DISABLE_OPERATION
//! ```

use cia402_common::status::StatusWord;
use cia402_common::types::NodeId;
use std::fmt;
use tracing::debug;

/// Power and operation state of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MotionState {
    /// Nothing known about the drive yet.
    #[default]
    Initial = 0,
    InitialPowerOn = 1,
    InitialPowerOff = 2,
    CyclePowerShutdown = 3,
    PowerOnDisableOperation = 4,
    Idle = 5,
    PrepareMove = 6,
    ReadyToMove = 7,
    Moving = 8,
    PrepareHoming = 9,
    ReadyForHoming = 10,
    Homing = 11,
    Fault = 12,
    FaultReset = 13,
    NodeReset = 14,
}

impl MotionState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Initial),
            1 => Some(Self::InitialPowerOn),
            2 => Some(Self::InitialPowerOff),
            3 => Some(Self::CyclePowerShutdown),
            4 => Some(Self::PowerOnDisableOperation),
            5 => Some(Self::Idle),
            6 => Some(Self::PrepareMove),
            7 => Some(Self::ReadyToMove),
            8 => Some(Self::Moving),
            9 => Some(Self::PrepareHoming),
            10 => Some(Self::ReadyForHoming),
            11 => Some(Self::Homing),
            12 => Some(Self::Fault),
            13 => Some(Self::FaultReset),
            14 => Some(Self::NodeReset),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::InitialPowerOn => "INITIAL_POWER_ON",
            Self::InitialPowerOff => "INITIAL_POWER_OFF",
            Self::CyclePowerShutdown => "CYCLE_POWER_SHUTDOWN",
            Self::PowerOnDisableOperation => "POWER_ON_DISABLE_OPERATION",
            Self::Idle => "IDLE",
            Self::PrepareMove => "PREPARE_MOVE",
            Self::ReadyToMove => "READY_TO_MOVE",
            Self::Moving => "MOVING",
            Self::PrepareHoming => "PREPARE_HOMING",
            Self::ReadyForHoming => "READY_FOR_HOMING",
            Self::Homing => "HOMING",
            Self::Fault => "FAULT",
            Self::FaultReset => "FAULT_RESET",
            Self::NodeReset => "NODE_RESET",
        }
    }

    /// States driven by the leader's broadcasts for a coupled pair.
    #[inline]
    pub const fn is_motion_sequencing(self) -> bool {
        matches!(
            self,
            Self::PrepareMove | Self::ReadyToMove | Self::Moving | Self::Idle
        )
    }

    /// States in which a start request must not be issued.
    #[inline]
    pub const fn is_fault_handling(self) -> bool {
        matches!(self, Self::Fault | Self::FaultReset | Self::NodeReset)
    }
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Next state of an axis in `current` after observing `status`.
///
/// Pure: unmatched combinations return `current`. `node` only labels the
/// trace output.
pub fn next_state(current: MotionState, status: StatusWord, node: NodeId) -> MotionState {
    use MotionState as S;
    let raw = status.bits();

    if status.contains(StatusWord::FAULT) {
        debug!("Node {}: status 0x{:04x} fault bit set", node, raw);
        return S::Fault;
    }

    if status.is_switched_off() {
        debug!("Node {}: status 0x{:04x} switched off", node, raw);
        return if current == S::Initial {
            S::InitialPowerOff
        } else {
            S::PowerOnDisableOperation
        };
    }

    if current == S::Initial {
        debug!("Node {}: status 0x{:04x} initial power on", node, raw);
        return S::InitialPowerOn;
    }

    if !status.is_powered() {
        debug!("Node {}: status 0x{:04x} not powered, staying {}", node, raw, current);
        return current;
    }

    let target_reached = status.contains(StatusWord::TARGET_REACHED);
    let manufacturer_latched = status.contains(StatusWord::MANUFACTURER_SPECIFIC1);
    let bit12 = status.contains(StatusWord::OP_MODE_SPECIFIC1);
    let bit13 = status.contains(StatusWord::OP_MODE_SPECIFIC2);

    let next = if !status.contains(StatusWord::OPERATION_ENABLED) {
        match current {
            S::PowerOnDisableOperation => S::Idle,
            S::Fault if !manufacturer_latched => S::FaultReset,
            S::FaultReset if !manufacturer_latched => S::CyclePowerShutdown,
            other => other,
        }
    } else {
        match current {
            S::PrepareHoming => S::ReadyForHoming,
            S::ReadyForHoming if !target_reached && !bit12 && !bit13 => S::Homing,
            S::Homing if target_reached => {
                if status.contains(StatusWord::HOMING_ATTAINED) {
                    S::PowerOnDisableOperation
                } else {
                    S::Fault
                }
            }
            S::PrepareMove if status.contains(StatusWord::SETPOINT_ACKNOWLEDGE) => S::ReadyToMove,
            S::ReadyToMove if !target_reached && !bit12 => S::Moving,
            S::Moving if target_reached => S::PowerOnDisableOperation,
            other => other,
        }
    };

    debug!(
        "Node {}: status 0x{:04x} powered, operation {}: {} -> {}",
        node,
        raw,
        if status.contains(StatusWord::OPERATION_ENABLED) {
            "enabled"
        } else {
            "disabled"
        },
        current,
        next
    );
    next
}
