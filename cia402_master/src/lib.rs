//! # CiA-402 Master Library
//!
//! Master side of a CANopen network of CiA-402 drives.
//!
//! # Module Structure
//!
//! - [`core`] - MasterCore: configuration loading, wiring, start-up
//! - [`registry`] - Driver registry and engine-event dispatch
//! - [`sim`] - Simulated bus with CiA-402 drive emulation
//! - [`error`] - Registry and start-up errors
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        cia402_master                         │
//! │  ┌──────────────┐  events   ┌────────────────┐               │
//! │  │ SimulatedBus │──────────►│ DriverRegistry │               │
//! │  │ (Protocol-   │           └───────┬────────┘               │
//! │  │  Engine)     │                   │ AxisHandle per node    │
//! │  └──────▲───────┘                   ▼                        │
//! │         │  SDO / PDO        ┌────────────────┐               │
//! │         └───────────────────│ axis executors │ (cia402_drive)│
//! │                             └────────────────┘               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod core;
pub mod error;
pub mod registry;
pub mod sim;

pub use crate::core::MasterCore;
pub use crate::error::{MasterError, RegistryError};
pub use crate::registry::{DriverRegistry, RegistryCallbacks};
pub use crate::sim::SimulatedBus;

static_assertions::assert_impl_all!(registry::DriverRegistry: Send, Sync);
static_assertions::assert_impl_all!(sim::SimulatedBus: Send, Sync);
