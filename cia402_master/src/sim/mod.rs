//! Simulated CANopen network for running the master without hardware.

mod bus;
mod drive;

pub use bus::{BusOperation, SimTiming, SimulatedBus};
pub use drive::{DriveEmulator, DriveJob};
