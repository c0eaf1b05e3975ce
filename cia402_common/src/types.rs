//! Object-dictionary addressing and typed values.
//!
//! Node identities, `index/sub-index` addresses, CiA-301 data type codes and
//! the scalar value carrier shared by the catalog, the sequencer and the
//! protocol engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ─── Node Identity ──────────────────────────────────────────────────

/// Rejected node identity (outside `1..=127`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid node id {0}: must be within 1..=127")]
pub struct InvalidNodeId(pub u8);

/// Identity of one node on the bus (`1..=127`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct NodeId(u8);

impl NodeId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 127;

    /// Returns `None` for identities outside `1..=127`.
    #[inline]
    pub const fn new(raw: u8) -> Option<Self> {
        if raw >= Self::MIN && raw <= Self::MAX {
            Some(Self(raw))
        } else {
            None
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeId;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(InvalidNodeId(raw))
    }
}

impl From<NodeId> for u8 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

// ─── Object Address ─────────────────────────────────────────────────

/// One object-dictionary entry: 16-bit index plus 8-bit sub-index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectAddress {
    pub index: u16,
    pub sub_index: u8,
}

impl ObjectAddress {
    #[inline]
    pub const fn new(index: u16, sub_index: u8) -> Self {
        Self { index, sub_index }
    }

    /// Same index, different sub-index.
    #[inline]
    pub const fn with_sub(self, sub_index: u8) -> Self {
        Self {
            index: self.index,
            sub_index,
        }
    }
}

impl fmt::Display for ObjectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}/0x{:02x}", self.index, self.sub_index)
    }
}

// ─── Data Types ─────────────────────────────────────────────────────

/// CiA-301 static data type (DEFTYPE) codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum DataType {
    Boolean = 0x0001,
    Integer8 = 0x0002,
    Integer16 = 0x0003,
    Integer32 = 0x0004,
    Unsigned8 = 0x0005,
    Unsigned16 = 0x0006,
    Unsigned32 = 0x0007,
    Real32 = 0x0008,
    VisibleString = 0x0009,
    OctetString = 0x000A,
    UnicodeString = 0x000B,
    TimeOfDay = 0x000C,
    TimeDifference = 0x000D,
    Domain = 0x000F,
    Integer24 = 0x0010,
    Real64 = 0x0011,
    Integer64 = 0x0015,
    Unsigned64 = 0x001B,
}

impl DataType {
    /// Convert from a raw DEFTYPE code. Returns `None` for unknown codes.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::Boolean),
            0x0002 => Some(Self::Integer8),
            0x0003 => Some(Self::Integer16),
            0x0004 => Some(Self::Integer32),
            0x0005 => Some(Self::Unsigned8),
            0x0006 => Some(Self::Unsigned16),
            0x0007 => Some(Self::Unsigned32),
            0x0008 => Some(Self::Real32),
            0x0009 => Some(Self::VisibleString),
            0x000A => Some(Self::OctetString),
            0x000B => Some(Self::UnicodeString),
            0x000C => Some(Self::TimeOfDay),
            0x000D => Some(Self::TimeDifference),
            0x000F => Some(Self::Domain),
            0x0010 => Some(Self::Integer24),
            0x0011 => Some(Self::Real64),
            0x0015 => Some(Self::Integer64),
            0x001B => Some(Self::Unsigned64),
            _ => None,
        }
    }

    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Whether the configuration sequencer can copy values of this type.
    ///
    /// Only booleans and 8/16/32-bit integers are transferred; everything
    /// else is rejected as an unsupported type.
    #[inline]
    pub const fn is_transferable(self) -> bool {
        matches!(
            self,
            Self::Boolean
                | Self::Integer8
                | Self::Integer16
                | Self::Integer32
                | Self::Unsigned8
                | Self::Unsigned16
                | Self::Unsigned32
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x} ({:?})", self.code(), self)
    }
}

// ─── Values ─────────────────────────────────────────────────────────

/// A typed object value.
///
/// The variant carries the declared width and signedness, so an
/// `Unsigned32` stays an unsigned 32-bit quantity end to end.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectValue {
    Boolean(bool),
    Integer8(i8),
    Integer16(i16),
    Integer32(i32),
    Integer64(i64),
    Unsigned8(u8),
    Unsigned16(u16),
    Unsigned32(u32),
    Unsigned64(u64),
    Real32(f32),
    Real64(f64),
    VisibleString(String),
    OctetString(Vec<u8>),
    Domain(Vec<u8>),
    /// Encoded value of a type without a native carrier (TIME_OF_DAY,
    /// TIME_DIFFERENCE), kept as described.
    Raw(DataType, Vec<u8>),
}

impl ObjectValue {
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Integer8(_) => DataType::Integer8,
            Self::Integer16(_) => DataType::Integer16,
            Self::Integer32(_) => DataType::Integer32,
            Self::Integer64(_) => DataType::Integer64,
            Self::Unsigned8(_) => DataType::Unsigned8,
            Self::Unsigned16(_) => DataType::Unsigned16,
            Self::Unsigned32(_) => DataType::Unsigned32,
            Self::Unsigned64(_) => DataType::Unsigned64,
            Self::Real32(_) => DataType::Real32,
            Self::Real64(_) => DataType::Real64,
            Self::VisibleString(_) => DataType::VisibleString,
            Self::OctetString(_) => DataType::OctetString,
            Self::Domain(_) => DataType::Domain,
            Self::Raw(data_type, _) => *data_type,
        }
    }

    /// Little-endian wire encoding at the declared width.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Boolean(v) => vec![u8::from(*v)],
            Self::Integer8(v) => v.to_le_bytes().to_vec(),
            Self::Integer16(v) => v.to_le_bytes().to_vec(),
            Self::Integer32(v) => v.to_le_bytes().to_vec(),
            Self::Integer64(v) => v.to_le_bytes().to_vec(),
            Self::Unsigned8(v) => vec![*v],
            Self::Unsigned16(v) => v.to_le_bytes().to_vec(),
            Self::Unsigned32(v) => v.to_le_bytes().to_vec(),
            Self::Unsigned64(v) => v.to_le_bytes().to_vec(),
            Self::Real32(v) => v.to_le_bytes().to_vec(),
            Self::Real64(v) => v.to_le_bytes().to_vec(),
            Self::VisibleString(s) => s.as_bytes().to_vec(),
            Self::OctetString(b) | Self::Domain(b) | Self::Raw(_, b) => b.clone(),
        }
    }

    /// Build a value of `data_type` from a TOML scalar.
    ///
    /// Integers are range-checked against the declared width; returns `None`
    /// when the TOML value does not fit.
    pub fn from_toml(data_type: DataType, value: &toml::Value) -> Option<Self> {
        use toml::Value as V;

        let int = || value.as_integer();
        match (data_type, value) {
            (DataType::Boolean, V::Boolean(b)) => Some(Self::Boolean(*b)),
            (DataType::Boolean, V::Integer(i)) => Some(Self::Boolean(*i != 0)),
            (DataType::Integer8, _) => int().and_then(|i| i8::try_from(i).ok()).map(Self::Integer8),
            (DataType::Integer16, _) => int().and_then(|i| i16::try_from(i).ok()).map(Self::Integer16),
            (DataType::Integer32 | DataType::Integer24, _) => {
                int().and_then(|i| i32::try_from(i).ok()).map(Self::Integer32)
            }
            (DataType::Integer64, _) => int().map(Self::Integer64),
            (DataType::Unsigned8, _) => int().and_then(|i| u8::try_from(i).ok()).map(Self::Unsigned8),
            (DataType::Unsigned16, _) => int().and_then(|i| u16::try_from(i).ok()).map(Self::Unsigned16),
            (DataType::Unsigned32, _) => int().and_then(|i| u32::try_from(i).ok()).map(Self::Unsigned32),
            (DataType::Unsigned64, _) => int().and_then(|i| u64::try_from(i).ok()).map(Self::Unsigned64),
            (DataType::Real32, _) => value.as_float().map(|f| Self::Real32(f as f32)),
            (DataType::Real64, _) => value.as_float().map(Self::Real64),
            (DataType::VisibleString | DataType::UnicodeString, V::String(s)) => {
                Some(Self::VisibleString(s.clone()))
            }
            (DataType::OctetString | DataType::Domain, V::Array(items)) => items
                .iter()
                .map(|item| item.as_integer().and_then(|i| u8::try_from(i).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(|bytes| {
                    if data_type == DataType::Domain {
                        Self::Domain(bytes)
                    } else {
                        Self::OctetString(bytes)
                    }
                }),
            (DataType::TimeOfDay | DataType::TimeDifference, V::Array(items)) => items
                .iter()
                .map(|item| item.as_integer().and_then(|i| u8::try_from(i).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(|bytes| Self::Raw(data_type, bytes)),
            (DataType::TimeOfDay | DataType::TimeDifference, V::Integer(i)) => u64::try_from(*i)
                .ok()
                .filter(|v| *v < 1 << 48)
                .map(|v| Self::Raw(data_type, v.to_le_bytes()[..6].to_vec())),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer8(v) => write!(f, "{v}"),
            Self::Integer16(v) => write!(f, "{v}"),
            Self::Integer32(v) => write!(f, "{v}"),
            Self::Integer64(v) => write!(f, "{v}"),
            Self::Unsigned8(v) => write!(f, "0x{v:02x}"),
            Self::Unsigned16(v) => write!(f, "0x{v:04x}"),
            Self::Unsigned32(v) => write!(f, "0x{v:08x}"),
            Self::Unsigned64(v) => write!(f, "0x{v:016x}"),
            Self::Real32(v) => write!(f, "{v}"),
            Self::Real64(v) => write!(f, "{v}"),
            Self::VisibleString(s) => write!(f, "{s:?}"),
            Self::OctetString(b) | Self::Domain(b) | Self::Raw(_, b) => write!(f, "{} bytes", b.len()),
        }
    }
}

// ─── Scalar Conversions ─────────────────────────────────────────────

/// Scalar types that map one-to-one onto an [`ObjectValue`] variant.
///
/// Used by typed setters and typed engine reads.
pub trait Scalar: Copy + Send + Sync + fmt::Debug + 'static {
    const DATA_TYPE: DataType;

    fn into_value(self) -> ObjectValue;

    fn from_value(value: &ObjectValue) -> Option<Self>;
}

macro_rules! scalar {
    ($ty:ty, $variant:ident) => {
        impl Scalar for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            #[inline]
            fn into_value(self) -> ObjectValue {
                ObjectValue::$variant(self)
            }

            #[inline]
            fn from_value(value: &ObjectValue) -> Option<Self> {
                match value {
                    ObjectValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }
        }

        impl From<$ty> for ObjectValue {
            fn from(v: $ty) -> Self {
                ObjectValue::$variant(v)
            }
        }
    };
}

scalar!(bool, Boolean);
scalar!(i8, Integer8);
scalar!(i16, Integer16);
scalar!(i32, Integer32);
scalar!(u8, Unsigned8);
scalar!(u16, Unsigned16);
scalar!(u32, Unsigned32);
