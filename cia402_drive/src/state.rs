//! Motion state machine module root.
//!
//! - [`motion`]: `MotionState` and the pure status-word transition function
//! - [`coupling`]: leader/follower aggregation rules

pub mod coupling;
pub mod motion;

pub use coupling::{Channel, LeaderMirror, follower_commits};
pub use motion::{MotionState, next_state};
