//! CiA-402 status word bits, control word values and operation modes.

use bitflags::bitflags;

bitflags! {
    /// Device status word (object 0x6041).
    ///
    /// Bits 12 and 13 are operation-mode specific: in homing mode they mean
    /// "homing attained" / "homing error", in profile-position mode bit 12
    /// acknowledges a new setpoint.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusWord: u16 {
        const READY_TO_SWITCH_ON     = 0x0001;
        const SWITCHED_ON            = 0x0002;
        const OPERATION_ENABLED      = 0x0004;
        const FAULT                  = 0x0008;
        const VOLTAGE_ENABLED        = 0x0010;
        const QUICK_STOP             = 0x0020;
        const SWITCH_ON_DISABLED     = 0x0040;
        const WARNING                = 0x0080;
        /// Set by some drives while a fault is still latched after reset.
        const MANUFACTURER_SPECIFIC1 = 0x0100;
        const REMOTE                 = 0x0200;
        const TARGET_REACHED         = 0x0400;
        const INTERNAL_LIMIT         = 0x0800;
        /// Homing attained / setpoint acknowledge.
        const OP_MODE_SPECIFIC1      = 0x1000;
        /// Homing error / following error.
        const OP_MODE_SPECIFIC2      = 0x2000;
        const MANUFACTURER_SPECIFIC2 = 0x4000;
        const MANUFACTURER_SPECIFIC3 = 0x8000;
    }
}

impl StatusWord {
    /// Alias of [`Self::OP_MODE_SPECIFIC1`] in homing mode.
    pub const HOMING_ATTAINED: Self = Self::OP_MODE_SPECIFIC1;
    /// Alias of [`Self::OP_MODE_SPECIFIC2`] in homing mode.
    pub const HOMING_ERROR: Self = Self::OP_MODE_SPECIFIC2;
    /// Alias of [`Self::OP_MODE_SPECIFIC1`] in profile-position mode.
    pub const SETPOINT_ACKNOWLEDGE: Self = Self::OP_MODE_SPECIFIC1;

    /// Interpret a raw status word; unknown bits are kept.
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self::from_bits_retain(raw)
    }

    /// Ready to switch on, switched on and voltage enabled all set.
    #[inline]
    pub const fn is_powered(&self) -> bool {
        self.contains(
            Self::READY_TO_SWITCH_ON
                .union(Self::SWITCHED_ON)
                .union(Self::VOLTAGE_ENABLED),
        )
    }

    /// Ready to switch on, with neither switched on nor operation enabled.
    #[inline]
    pub const fn is_switched_off(&self) -> bool {
        self.contains(Self::READY_TO_SWITCH_ON)
            && !self.intersects(Self::SWITCHED_ON.union(Self::OPERATION_ENABLED))
    }
}

impl Default for StatusWord {
    fn default() -> Self {
        Self::empty()
    }
}

/// Control word values (object 0x6040).
pub mod control_word {
    pub const SHUTDOWN: u16 = 0x0006;
    /// Switch on, operation disabled.
    pub const SWITCH_ON: u16 = 0x0007;
    pub const ENABLE_OPERATION: u16 = 0x000F;
    /// Enable operation plus bit 4 (homing start / new setpoint).
    pub const START_HOMING: u16 = 0x001F;
    pub const FAULT_RESET: u16 = 0x0080;
    pub const NEW_SETPOINT: u16 = 0x0010;
    pub const HALT: u16 = 0x0100;

    /// Arm a profile-position move: enable operation, new setpoint, halt.
    pub const MOVE_ARM: u16 = 0x011F;
    /// Start the armed move: halt and new-setpoint bits cleared.
    pub const MOVE_EXECUTE: u16 = 0x000F;
}

/// Modes of operation (object 0x6060).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum OperationMode {
    ProfilePosition = 1,
    ProfileVelocity = 3,
    Homing = 6,
}

impl OperationMode {
    #[inline]
    pub const fn from_i8(value: i8) -> Option<Self> {
        match value {
            1 => Some(Self::ProfilePosition),
            3 => Some(Self::ProfileVelocity),
            6 => Some(Self::Homing),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_i8(self) -> i8 {
        self as i8
    }
}
