//! Motion commands captured per invocation.

use cia402_common::status::control_word;
use std::fmt;

/// Positioning mode of a move, OR-ed into the arming control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum MoveMode {
    #[default]
    Absolute = 0x0000,
    Relative = 0x0040,
}

impl MoveMode {
    #[inline]
    pub const fn bits(self) -> u16 {
        self as u16
    }

    /// Control word that arms the move with the halt bit still set.
    #[inline]
    pub const fn arm_word(self) -> u16 {
        self.bits() | control_word::MOVE_ARM
    }

    /// Control word that releases the halt bit and starts motion.
    #[inline]
    pub const fn execute_word(self) -> u16 {
        self.bits() | control_word::MOVE_EXECUTE
    }
}

/// Homing method written to 0x6098.
///
/// The named variants are the predefined CiA-402 methods; any other code
/// (manufacturer-specific methods included) travels as `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HomingMethod {
    PositiveSwitchLeftEdge,
    PositiveSwitchRightEdge,
    NegativeSwitchRightEdge,
    NegativeSwitchLeftEdge,
    IndexPulseNegative,
    IndexPulsePositive,
    Custom(i8),
}

impl HomingMethod {
    #[inline]
    pub const fn as_i8(self) -> i8 {
        match self {
            Self::PositiveSwitchLeftEdge => 19,
            Self::PositiveSwitchRightEdge => 20,
            Self::NegativeSwitchRightEdge => 21,
            Self::NegativeSwitchLeftEdge => 22,
            Self::IndexPulseNegative => 33,
            Self::IndexPulsePositive => 34,
            Self::Custom(code) => code,
        }
    }

    pub const fn from_i8(value: i8) -> Self {
        match value {
            19 => Self::PositiveSwitchLeftEdge,
            20 => Self::PositiveSwitchRightEdge,
            21 => Self::NegativeSwitchRightEdge,
            22 => Self::NegativeSwitchLeftEdge,
            33 => Self::IndexPulseNegative,
            34 => Self::IndexPulsePositive,
            other => Self::Custom(other),
        }
    }
}

impl From<i8> for HomingMethod {
    fn from(value: i8) -> Self {
        Self::from_i8(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomingRequest {
    pub method: HomingMethod,
    pub search_speed: u32,
    pub release_speed: u32,
    pub acceleration: u32,
    pub offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub mode: MoveMode,
    pub position: i32,
    pub velocity: u32,
    pub acceleration: u32,
    pub deceleration: u32,
}

/// A request that can wait in the idle queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionRequest {
    Home(HomingRequest),
    Move(MoveRequest),
}

impl fmt::Display for MotionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home(h) => write!(f, "home(method {})", h.method.as_i8()),
            Self::Move(m) => write!(f, "move({:?} to {})", m.mode, m.position),
        }
    }
}
