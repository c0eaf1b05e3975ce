//! Leader/follower state aggregation.
//!
//! A leader keeps one mirror per observation channel (its own status words
//! and the follower's). The effective state of the pair only advances
//! through the motion-sequencing states when both drives agree; everything
//! else follows the leader's own channel.
//!
//! ```text
//! PREPARE_MOVE   ── own = follower = READY_TO_MOVE ──► READY_TO_MOVE
//! READY_TO_MOVE  ── own or follower = MOVING ────────► MOVING
//! POWER_ON_DISABLE_OPERATION ── own = follower = IDLE ──► IDLE
//! own channel leaves {PREPARE_MOVE, READY_TO_MOVE, MOVING, IDLE} ──► own
//! ```

use super::motion::{MotionState, next_state};
use cia402_common::status::StatusWord;
use cia402_common::types::NodeId;
use tracing::debug;

/// Which drive a status word came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Own,
    Follower,
}

/// Per-channel states tracked by a leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderMirror {
    pub own: MotionState,
    pub follower: MotionState,
}

impl Default for LeaderMirror {
    fn default() -> Self {
        Self {
            own: MotionState::Idle,
            follower: MotionState::Idle,
        }
    }
}

impl LeaderMirror {
    /// Apply a status word to one channel and return the new effective
    /// state, if the pair should switch.
    pub fn observe(
        &mut self,
        effective: MotionState,
        channel: Channel,
        status: StatusWord,
        leader: NodeId,
        follower: NodeId,
    ) -> Option<MotionState> {
        use MotionState as S;

        match channel {
            Channel::Own => self.own = next_state(self.own, status, leader),
            Channel::Follower => self.follower = next_state(self.follower, status, follower),
        }
        debug!(
            "Node {}: aggregate own {}, follower {}, current {}",
            leader, self.own, self.follower, effective
        );

        if self.own == S::ReadyToMove && self.follower == S::ReadyToMove && effective == S::PrepareMove
        {
            Some(S::ReadyToMove)
        } else if (self.own == S::Moving || self.follower == S::Moving) && effective == S::ReadyToMove
        {
            Some(S::Moving)
        } else if self.own == S::Idle
            && self.follower == S::Idle
            && effective == S::PowerOnDisableOperation
        {
            Some(S::Idle)
        } else if channel == Channel::Own && !self.own.is_motion_sequencing() {
            Some(self.own)
        } else {
            None
        }
    }
}

/// Whether a follower commits the locally computed `next` state.
///
/// Motion-sequencing states of a follower are driven by its leader; only
/// the power-on completion `POWER_ON_DISABLE_OPERATION → IDLE` is taken
/// from the follower's own status.
#[inline]
pub fn follower_commits(current: MotionState, next: MotionState) -> bool {
    !next.is_motion_sequencing()
        || (current == MotionState::PowerOnDisableOperation && next == MotionState::Idle)
}
