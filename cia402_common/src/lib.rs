//! CiA-402 Common Library
//!
//! Shared vocabulary for the configuration sequencer, the motion state
//! machine and the master: object addresses and typed values, CiA-301 /
//! CiA-402 constants, NMT and emergency types, the error taxonomy, TOML
//! configuration and the abstract protocol engine.
//!
//! # Module Structure
//!
//! - [`types`] - Node identities, object addresses, data types, values
//! - [`consts`] - PDO ranges, drive-profile objects, SDO abort codes
//! - [`status`] - Status word bitflags, control words, operation modes
//! - [`nmt`] - NMT commands/states, boot error descriptions
//! - [`emcy`] - Emergency messages
//! - [`error`] - Transport, catalog, pairing and configuration errors
//! - [`engine`] - `ProtocolEngine` trait and engine events
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod consts;
pub mod emcy;
pub mod engine;
pub mod error;
pub mod nmt;
pub mod prelude;
pub mod status;
pub mod types;

static_assertions::assert_impl_all!(types::NodeId: Send, Sync, Copy, Ord);
static_assertions::assert_obj_safe!(engine::ProtocolEngine);
