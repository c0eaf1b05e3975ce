//! Read-only view over a device description.
//!
//! A catalog is built from a TOML description (or programmatically through
//! [`CatalogBuilder`]) and never changes afterwards. It answers two
//! questions for the sequencer: which parameters are explicitly set, in
//! declaration order, and what type an address is declared with.
//!
//! ```toml
//! [device]
//! name = "Servo drive"
//!
//! [[objects]]
//! index = 0x1400
//! name = "RPDO1 communication parameter"
//!
//! [[objects.sub]]
//! sub_index = 1
//! data_type = "unsigned32"
//! value = 0x200
//! ```

use crate::error::CatalogError;
use cia402_common::config::ConfigLoader;
use cia402_common::error::LocalReadError;
use cia402_common::types::{DataType, ObjectAddress, ObjectValue, Scalar};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

// ─── Access ─────────────────────────────────────────────────────────

/// Access type of a sub-object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Ro,
    Wo,
    #[default]
    Rw,
    /// Read/write, mappable into receive PDOs.
    Rww,
    /// Read/write, mappable into transmit PDOs.
    Rwr,
    Const,
}

impl Access {
    #[inline]
    pub const fn is_readable(self) -> bool {
        !matches!(self, Self::Wo)
    }

    #[inline]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Wo | Self::Rw | Self::Rww | Self::Rwr)
    }
}

// ─── Entries ────────────────────────────────────────────────────────

/// One declared sub-object.
#[derive(Debug, Clone, PartialEq)]
pub struct SubObject {
    pub sub_index: u8,
    pub name: String,
    pub data_type: DataType,
    pub access: Access,
    /// Explicitly assigned value; `None` for declared-only entries.
    pub value: Option<ObjectValue>,
}

impl SubObject {
    /// Readable, writable and explicitly set.
    #[inline]
    pub fn is_configurable(&self) -> bool {
        self.value.is_some() && self.access.is_readable() && self.access.is_writable()
    }
}

/// One declared object with its sub-objects in ascending sub-index order.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogObject {
    pub index: u16,
    pub name: String,
    pub subs: Vec<SubObject>,
}

/// An explicitly-configured object: index plus its explicitly-set
/// sub-indices in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterEntry {
    pub index: u16,
    pub sub_indices: Vec<u8>,
}

impl ParameterEntry {
    #[inline]
    pub fn addresses(&self) -> impl Iterator<Item = ObjectAddress> + '_ {
        self.sub_indices
            .iter()
            .map(move |&sub| ObjectAddress::new(self.index, sub))
    }
}

/// Device metadata from the `[device]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor_id: u32,
    pub product_code: u32,
    pub revision: u32,
}

// ─── Catalog ────────────────────────────────────────────────────────

/// Immutable parameter catalog of one device type.
#[derive(Debug, Clone, Default)]
pub struct ParameterCatalog {
    device: DeviceInfo,
    objects: Vec<CatalogObject>,
    lookup: HashMap<ObjectAddress, (usize, usize)>,
    explicit: Vec<ParameterEntry>,
}

impl ParameterCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Load a TOML description from disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let file = CatalogFile::load(path)?;
        file.into_catalog()
    }

    /// Parse a TOML description.
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file = CatalogFile::from_toml_str(content)?;
        file.into_catalog()
    }

    #[inline]
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    #[inline]
    pub fn objects(&self) -> &[CatalogObject] {
        &self.objects
    }

    /// Explicitly-configured parameters in declaration order.
    #[inline]
    pub fn explicit_parameters(&self) -> &[ParameterEntry] {
        &self.explicit
    }

    /// Explicitly-configured parameter with `index`, if any.
    pub fn parameter(&self, index: u16) -> Option<&ParameterEntry> {
        self.explicit.iter().find(|entry| entry.index == index)
    }

    /// Declared type of `address`; `None` when the address is unknown.
    pub fn type_of(&self, address: ObjectAddress) -> Option<DataType> {
        self.sub_object(address).map(|sub| sub.data_type)
    }

    pub fn sub_object(&self, address: ObjectAddress) -> Option<&SubObject> {
        let &(object, sub) = self.lookup.get(&address)?;
        Some(&self.objects[object].subs[sub])
    }

    /// Local value of `address` as declared.
    pub fn value(&self, address: ObjectAddress) -> Result<&ObjectValue, LocalReadError> {
        self.sub_object(address)
            .and_then(|sub| sub.value.as_ref())
            .ok_or(LocalReadError::NotFound(address))
    }

    /// Local value of `address` as `T`.
    pub fn read<T: Scalar>(&self, address: ObjectAddress) -> Result<T, LocalReadError> {
        let value = self.value(address)?;
        T::from_value(value).ok_or(LocalReadError::TypeMismatch {
            address,
            declared: value.data_type(),
            requested: T::DATA_TYPE,
        })
    }

    fn from_objects(device: DeviceInfo, mut objects: Vec<CatalogObject>) -> Result<Self, CatalogError> {
        let mut lookup = HashMap::new();
        let mut explicit = Vec::new();

        for (o, object) in objects.iter_mut().enumerate() {
            object.subs.sort_by_key(|sub| sub.sub_index);
            let mut sub_indices = Vec::new();
            for (s, sub) in object.subs.iter().enumerate() {
                let address = ObjectAddress::new(object.index, sub.sub_index);
                if lookup.insert(address, (o, s)).is_some() {
                    return Err(CatalogError::DuplicateSubObject(address));
                }
                if sub.is_configurable() {
                    sub_indices.push(sub.sub_index);
                }
            }
            if !sub_indices.is_empty() {
                explicit.push(ParameterEntry {
                    index: object.index,
                    sub_indices,
                });
            }
        }

        Ok(Self {
            device,
            objects,
            lookup,
            explicit,
        })
    }
}

// ─── Builder ────────────────────────────────────────────────────────

/// Programmatic catalog construction, keeping declaration order.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    device: DeviceInfo,
    objects: Vec<CatalogObject>,
}

impl CatalogBuilder {
    pub fn device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Declare `address` with an explicit value.
    pub fn entry(self, address: ObjectAddress, value: impl Into<ObjectValue>) -> Self {
        let value = value.into();
        let data_type = value.data_type();
        self.sub_object(address, data_type, Access::Rw, Some(value))
    }

    /// Declare `address` without a value.
    pub fn declare(self, address: ObjectAddress, data_type: DataType) -> Self {
        self.sub_object(address, data_type, Access::Rw, None)
    }

    pub fn sub_object(
        mut self,
        address: ObjectAddress,
        data_type: DataType,
        access: Access,
        value: Option<ObjectValue>,
    ) -> Self {
        let sub = SubObject {
            sub_index: address.sub_index,
            name: String::new(),
            data_type,
            access,
            value,
        };
        match self.objects.iter_mut().find(|o| o.index == address.index) {
            Some(object) => object.subs.push(sub),
            None => self.objects.push(CatalogObject {
                index: address.index,
                name: String::new(),
                subs: vec![sub],
            }),
        }
        self
    }

    /// # Errors
    ///
    /// Returns `CatalogError::DuplicateSubObject` if an address was declared twice.
    pub fn build(self) -> Result<ParameterCatalog, CatalogError> {
        ParameterCatalog::from_objects(self.device, self.objects)
    }
}

// ─── TOML Representation ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    device: DeviceInfo,
    #[serde(default)]
    objects: Vec<RawObject>,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    index: u16,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "sub")]
    subs: Vec<RawSubObject>,
}

#[derive(Debug, Deserialize)]
struct RawSubObject {
    sub_index: u8,
    #[serde(default)]
    name: String,
    data_type: DataType,
    #[serde(default)]
    access: Access,
    #[serde(default)]
    value: Option<toml::Value>,
}

impl CatalogFile {
    fn into_catalog(self) -> Result<ParameterCatalog, CatalogError> {
        let mut objects: Vec<CatalogObject> = Vec::with_capacity(self.objects.len());
        for raw in self.objects {
            if objects.iter().any(|o| o.index == raw.index) {
                return Err(CatalogError::DuplicateObject(raw.index));
            }
            let subs = raw
                .subs
                .into_iter()
                .map(|sub| {
                    let address = ObjectAddress::new(raw.index, sub.sub_index);
                    let value = match &sub.value {
                        Some(v) => Some(ObjectValue::from_toml(sub.data_type, v).ok_or(
                            CatalogError::InvalidValue {
                                address,
                                data_type: sub.data_type,
                            },
                        )?),
                        None => None,
                    };
                    Ok(SubObject {
                        sub_index: sub.sub_index,
                        name: sub.name,
                        data_type: sub.data_type,
                        access: sub.access,
                        value,
                    })
                })
                .collect::<Result<Vec<_>, CatalogError>>()?;
            objects.push(CatalogObject {
                index: raw.index,
                name: raw.name,
                subs,
            });
        }
        ParameterCatalog::from_objects(self.device, objects)
    }
}
