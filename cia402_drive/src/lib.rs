//! CiA-402 Drive Library
//!
//! Per-node side of a CANopen master: device catalogs, the configuration
//! sequencer that pushes a catalog to a drive, and the motion state machine
//! that follows the drive's status word and issues homing and profile
//! position moves.
//!
//! # Module Structure
//!
//! - [`catalog`] - Parameter catalog built from a device description
//! - [`config`] - Per-node driver configuration
//! - [`pairing`] - Leader/follower detection from shared RPDO COB-IDs
//! - [`sequencer`] - Ordered configuration download with PDO protocol
//! - [`command`] - Homing and move requests
//! - [`setter`] - Setter strategies (SDO, master object, mapped TPDO)
//! - [`state`] - Motion states, transition function, leader aggregation
//! - [`idle_queue`] - Work waiting for IDLE
//! - [`axis`] - Per-axis executor, handle and builder
//! - [`error`] - Drive-side errors and the error callback type

pub mod axis;
pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod idle_queue;
pub mod pairing;
pub mod sequencer;
pub mod setter;
pub mod state;

#[cfg(test)]
mod test_support;

pub use axis::{AxisBuilder, AxisHandle, ConfigurableDevice, MotionControllable};
pub use catalog::ParameterCatalog;
pub use config::DriverConfig;
pub use pairing::{PairingRegistry, Role};
pub use state::{MotionState, next_state};

static_assertions::assert_impl_all!(axis::AxisHandle: Send, Sync, Clone);
static_assertions::assert_impl_all!(catalog::ParameterCatalog: Send, Sync);
static_assertions::assert_obj_safe!(sequencer::ClearConfiguration, axis::MotionControllable);
