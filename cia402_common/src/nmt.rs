//! Network management (NMT) commands and states, CiA-302 boot error status.

use std::fmt;

/// NMT command specifiers (CiA-301).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NmtCommand {
    Start = 0x01,
    Stop = 0x02,
    EnterPreOperational = 0x80,
    ResetNode = 0x81,
    ResetCommunication = 0x82,
}

impl NmtCommand {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Start),
            0x02 => Some(Self::Stop),
            0x80 => Some(Self::EnterPreOperational),
            0x81 => Some(Self::ResetNode),
            0x82 => Some(Self::ResetCommunication),
            _ => None,
        }
    }
}

/// NMT states as reported by boot-up and heartbeat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NmtState {
    BootUp = 0x00,
    Stop = 0x04,
    Start = 0x05,
    ResetNode = 0x06,
    ResetCommunication = 0x07,
    PreOperational = 0x7F,
}

impl NmtState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::BootUp),
            0x04 => Some(Self::Stop),
            0x05 => Some(Self::Start),
            0x06 => Some(Self::ResetNode),
            0x07 => Some(Self::ResetCommunication),
            0x7F => Some(Self::PreOperational),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for NmtState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.as_u8())
    }
}

/// Error status `B`: no response to the upload of object 0x1000.
pub const BOOT_ERROR_NODE_MISSING: char = 'B';

/// Description of a CiA-302 slave boot error status letter.
pub const fn boot_error_description(es: char) -> &'static str {
    match es {
        'A' => "The CANopen device is not listed in object 1F81.",
        'B' => "No response received for upload request of object 1000.",
        'C' => "Value of object 1000 from CANopen device is different to value in object 1F84 (Device type).",
        'D' => "Value of object 1018 sub-index 01 from CANopen device is different to value in object 1F85 (Vendor-ID).",
        'E' => "Heartbeat event. No heartbeat message received from CANopen device.",
        'F' => "Node guarding event. No confirmation for guarding request received from CANopen device.",
        'G' => "Objects for program download are not configured or inconsistent.",
        'H' => "Software update is required, but not allowed because of configuration or current status.",
        'I' => "Software update is required, but program download failed.",
        'J' => "Configuration download failed.",
        'K' => "Heartbeat event during start error control service.",
        'L' => "NMT slave was initially operational.",
        'M' => "Value of object 1018 sub-index 02 from CANopen device is different to value in object 1F86 (Product code).",
        'N' => "Value of object 1018 sub-index 03 from CANopen device is different to value in object 1F87 (Revision number).",
        'O' => "Value of object 1018 sub-index 04 from CANopen device is different to value in object 1F88 (Serial number).",
        _ => "Unknown boot error status.",
    }
}
