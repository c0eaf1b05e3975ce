//! CiA-402 drive emulation.
//!
//! A small device model: the power state machine reacts to
//! control words at once, while homing and positioning finish after a fixed
//! duration scheduled by the bus.

use cia402_common::status::{OperationMode, StatusWord, control_word};
use tracing::{debug, trace};

const SWITCHED_OFF: u16 = 0x0031;
const SWITCHED_ON: u16 = 0x0033;
const OPERATION_ENABLED: u16 = 0x0037;
/// Control word bit 6: the set-point is relative to the current position.
const RELATIVE: u16 = 0x0040;

/// Work the bus has to finish later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveJob {
    Homing,
    Positioning,
}

/// Emulated drive of one node.
#[derive(Debug, Clone)]
pub struct DriveEmulator {
    status: StatusWord,
    mode: i8,
    fault_code: u16,
    position: i32,
    target: i32,
    relative: bool,
    busy: Option<DriveJob>,
}

impl Default for DriveEmulator {
    fn default() -> Self {
        Self {
            status: StatusWord::from_raw(SWITCHED_OFF),
            mode: 0,
            fault_code: 0,
            position: 0,
            target: 0,
            relative: false,
            busy: None,
        }
    }
}

impl DriveEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn status(&self) -> StatusWord {
        self.status
    }

    #[inline]
    pub fn fault_code(&self) -> u16 {
        self.fault_code
    }

    #[inline]
    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn set_mode(&mut self, mode: i8) {
        self.mode = mode;
    }

    pub fn set_target(&mut self, target: i32) {
        self.target = target;
    }

    /// Latch a fault; motion stops.
    pub fn fault(&mut self, code: u16) {
        self.fault_code = code;
        self.busy = None;
        self.status = StatusWord::from_raw(SWITCHED_OFF) | StatusWord::FAULT;
    }

    /// Power-on state after an NMT reset.
    pub fn reset(&mut self) {
        *self = Self {
            position: self.position,
            ..Self::default()
        };
    }

    /// Apply a control word; returns work to be finished later.
    pub fn control(&mut self, word: u16) -> Option<DriveJob> {
        trace!("control word 0x{:04x} in status 0x{:04x}", word, self.status.bits());

        if self.status.contains(StatusWord::FAULT) {
            if word & control_word::FAULT_RESET != 0 {
                debug!("fault 0x{:04x} cleared", self.fault_code);
                self.fault_code = 0;
                self.status = StatusWord::from_raw(SWITCHED_ON);
            }
            return None;
        }

        match word & 0x000F {
            control_word::SHUTDOWN => {
                self.busy = None;
                self.status = StatusWord::from_raw(SWITCHED_OFF);
                None
            }
            control_word::SWITCH_ON => {
                self.busy = None;
                self.status = StatusWord::from_raw(SWITCHED_ON);
                None
            }
            control_word::ENABLE_OPERATION => self.enabled(word),
            _ => None,
        }
    }

    fn enabled(&mut self, word: u16) -> Option<DriveJob> {
        let new_setpoint = word & control_word::NEW_SETPOINT != 0;
        let halted = word & control_word::HALT != 0;
        let mode = OperationMode::from_i8(self.mode);
        let mut status = StatusWord::from_raw(OPERATION_ENABLED);

        let job = match mode {
            Some(OperationMode::Homing) if new_setpoint => {
                self.busy = Some(DriveJob::Homing);
                Some(DriveJob::Homing)
            }
            Some(OperationMode::ProfilePosition) if new_setpoint && halted => {
                // Armed: acknowledge, wait for the halt bit to drop.
                status |= StatusWord::SETPOINT_ACKNOWLEDGE;
                None
            }
            Some(OperationMode::ProfilePosition) if !halted && self.busy.is_none() => {
                self.relative = word & RELATIVE != 0;
                self.busy = Some(DriveJob::Positioning);
                Some(DriveJob::Positioning)
            }
            _ => None,
        };
        self.status = status;
        job
    }

    /// Finish the pending job, if it is still running.
    pub fn complete(&mut self, job: DriveJob) -> bool {
        if self.busy != Some(job) {
            return false;
        }
        self.busy = None;
        let mut status = StatusWord::from_raw(OPERATION_ENABLED) | StatusWord::TARGET_REACHED;
        match job {
            DriveJob::Homing => {
                self.position = 0;
                status |= StatusWord::HOMING_ATTAINED;
            }
            DriveJob::Positioning if self.relative => {
                self.position = self.position.saturating_add(self.target)
            }
            DriveJob::Positioning => self.position = self.target,
        }
        self.status = status;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_sequence() {
        let mut drive = DriveEmulator::new();
        assert_eq!(drive.status().bits(), SWITCHED_OFF);
        drive.control(control_word::SWITCH_ON);
        assert_eq!(drive.status().bits(), SWITCHED_ON);
        drive.control(control_word::SHUTDOWN);
        assert_eq!(drive.status().bits(), SWITCHED_OFF);
    }

    #[test]
    fn positioning_is_armed_then_started() {
        let mut drive = DriveEmulator::new();
        drive.set_mode(OperationMode::ProfilePosition.as_i8());
        drive.set_target(1200);
        drive.control(control_word::SWITCH_ON);

        assert_eq!(drive.control(control_word::MOVE_ARM), None);
        assert_eq!(drive.status().bits(), 0x1037);

        assert_eq!(drive.control(control_word::MOVE_EXECUTE), Some(DriveJob::Positioning));
        assert_eq!(drive.status().bits(), 0x0037);

        assert!(drive.complete(DriveJob::Positioning));
        assert_eq!(drive.status().bits(), 0x0437);
        assert_eq!(drive.position(), 1200);
    }

    #[test]
    fn relative_positioning_adds_to_position() {
        let mut drive = DriveEmulator::new();
        drive.set_mode(OperationMode::ProfilePosition.as_i8());
        drive.set_target(500);
        drive.control(control_word::SWITCH_ON);
        assert_eq!(drive.control(RELATIVE | control_word::MOVE_EXECUTE), Some(DriveJob::Positioning));
        assert!(drive.complete(DriveJob::Positioning));
        assert_eq!(drive.control(control_word::SWITCH_ON), None);
        assert_eq!(drive.control(RELATIVE | control_word::MOVE_EXECUTE), Some(DriveJob::Positioning));
        assert!(drive.complete(DriveJob::Positioning));
        assert_eq!(drive.position(), 1000);
    }

    #[test]
    fn homing_sets_attained() {
        let mut drive = DriveEmulator::new();
        drive.set_mode(OperationMode::Homing.as_i8());
        assert_eq!(drive.control(control_word::ENABLE_OPERATION), None);
        assert_eq!(drive.control(control_word::START_HOMING), Some(DriveJob::Homing));
        assert!(drive.complete(DriveJob::Homing));
        assert_eq!(drive.status().bits(), 0x1437);
    }

    #[test]
    fn fault_blocks_until_reset() {
        let mut drive = DriveEmulator::new();
        drive.control(control_word::SWITCH_ON);
        drive.fault(0x2310);
        assert!(drive.status().contains(StatusWord::FAULT));
        assert_eq!(drive.control(control_word::SWITCH_ON), None);
        assert!(drive.status().contains(StatusWord::FAULT));

        drive.control(control_word::FAULT_RESET);
        assert_eq!(drive.status().bits(), SWITCHED_ON);
        assert_eq!(drive.fault_code(), 0);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut drive = DriveEmulator::new();
        drive.set_mode(OperationMode::ProfilePosition.as_i8());
        drive.control(control_word::MOVE_EXECUTE);
        drive.fault(0x1000);
        assert!(!drive.complete(DriveJob::Positioning));
    }
}
