//! Object-dictionary constants (CiA-301 communication area, CiA-402 drive profile).

use crate::types::ObjectAddress;
use std::ops::RangeInclusive;

// ─── PDO Parameter Ranges (CiA-301) ─────────────────────────────────

/// Receive-PDO communication parameters.
pub const RPDO_CONTROL: RangeInclusive<u16> = 0x1400..=0x15FF;
/// Receive-PDO mapping parameters.
pub const RPDO_MAPPING: RangeInclusive<u16> = 0x1600..=0x17FF;
/// Transmit-PDO communication parameters.
pub const TPDO_CONTROL: RangeInclusive<u16> = 0x1800..=0x19FF;
/// Transmit-PDO mapping parameters.
pub const TPDO_MAPPING: RangeInclusive<u16> = 0x1A00..=0x1BFF;

/// Distance from a PDO communication object to its mapping object.
pub const PDO_MAPPING_OFFSET: u16 = 0x0200;

/// PDO communication sub-indices.
pub const PDO_COB_ID_SUB: u8 = 0x01;
pub const PDO_TRANSMISSION_TYPE_SUB: u8 = 0x02;
pub const PDO_INHIBIT_TIME_SUB: u8 = 0x03;

/// Mapping object sub-index 0: number of mapped objects.
pub const PDO_MAPPING_COUNT_SUB: u8 = 0x00;

/// 29-bit identifier mask of a COB-ID word.
pub const COB_ID_MASK: u32 = 0x1FFF_FFFF;
/// 11-bit identifier mask (base frame).
pub const COB_ID_BASE_MASK: u32 = 0x0000_07FF;
/// Bit 31 of a PDO COB-ID: PDO does not exist / is not valid.
pub const COB_ID_INVALID: u32 = 0x8000_0000;

/// Master-side RPDO-to-node table used by binary device descriptions.
///
/// Bits 0-7 carry the node id, bits 8-15 the node's RPDO number.
pub const MASTER_NODE_RPDO_TABLE: RangeInclusive<u16> = 0x5C00..=0x5DFF;

/// Restore default parameters (CiA-301 0x1011/1) and the "load" signature.
pub const RESTORE_DEFAULT_PARAMETERS: ObjectAddress = ObjectAddress::new(0x1011, 0x01);
pub const RESTORE_SIGNATURE_LOAD: u32 = 0x6461_6F6C;

// ─── CiA-402 Objects ────────────────────────────────────────────────

pub const FAULT_REGISTER: ObjectAddress = ObjectAddress::new(0x603F, 0);
pub const CONTROL_WORD: ObjectAddress = ObjectAddress::new(0x6040, 0);
pub const STATUS_WORD: ObjectAddress = ObjectAddress::new(0x6041, 0);
pub const OPERATION_MODE: ObjectAddress = ObjectAddress::new(0x6060, 0);
pub const TARGET_POSITION: ObjectAddress = ObjectAddress::new(0x607A, 0);
pub const HOME_OFFSET: ObjectAddress = ObjectAddress::new(0x607C, 0);
pub const PROFILE_VELOCITY: ObjectAddress = ObjectAddress::new(0x6081, 0);
pub const PROFILE_ACCELERATION: ObjectAddress = ObjectAddress::new(0x6083, 0);
pub const PROFILE_DECELERATION: ObjectAddress = ObjectAddress::new(0x6084, 0);
pub const HOMING_METHOD: ObjectAddress = ObjectAddress::new(0x6098, 0);
pub const HOMING_SEARCH_SPEED: ObjectAddress = ObjectAddress::new(0x6099, 1);
pub const HOMING_RELEASE_SPEED: ObjectAddress = ObjectAddress::new(0x6099, 2);
pub const HOMING_ACCELERATION: ObjectAddress = ObjectAddress::new(0x609A, 0);

// ─── SDO Abort Codes ────────────────────────────────────────────────

pub const SDO_ABORT_TIMEOUT: u32 = 0x0504_0000;
pub const SDO_ABORT_NO_OBJECT: u32 = 0x0602_0000;
pub const SDO_ABORT_TYPE_MISMATCH: u32 = 0x0607_0010;
pub const SDO_ABORT_NO_SUB_INDEX: u32 = 0x0609_0011;
pub const SDO_ABORT_DATA: u32 = 0x0800_0020;

/// Human-readable text for common SDO abort codes.
pub const fn sdo_abort_description(code: u32) -> &'static str {
    match code {
        SDO_ABORT_TIMEOUT => "SDO protocol timed out",
        0x0601_0000 => "Unsupported access to an object",
        0x0601_0001 => "Attempt to read a write only object",
        0x0601_0002 => "Attempt to write a read only object",
        SDO_ABORT_NO_OBJECT => "Object does not exist in the object dictionary",
        0x0604_0041 => "Object cannot be mapped to the PDO",
        0x0604_0043 => "General parameter incompatibility reason",
        SDO_ABORT_TYPE_MISMATCH => "Data type does not match, length of service parameter does not match",
        SDO_ABORT_NO_SUB_INDEX => "Sub-index does not exist",
        0x0609_0030 => "Invalid value for parameter",
        SDO_ABORT_DATA => "Data cannot be transferred or stored to the application",
        0x0800_0022 => "Data cannot be transferred or stored because of the present device state",
        _ => "Unknown abort code",
    }
}

/// Whether `index` is a receive- or transmit-PDO mapping object.
#[inline]
pub fn is_pdo_mapping(index: u16) -> bool {
    RPDO_MAPPING.contains(&index) || TPDO_MAPPING.contains(&index)
}
