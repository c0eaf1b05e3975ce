//! Integration test: complete status-word sequences through the transition
//! function and the leader aggregation.

use cia402_common::status::StatusWord;
use cia402_common::types::NodeId;
use cia402_drive::state::{Channel, LeaderMirror, MotionState, follower_commits, next_state};

// ── Helpers ─────────────────────────────────────────────────────────

const SWITCHED_OFF: u16 = 0x0031;
const DISABLED: u16 = 0x0033;
const ENABLED: u16 = 0x0037;
const ACK: u16 = 0x1037;
const REACHED: u16 = 0x0437;
const HOMED: u16 = 0x1437;
const FAULT: u16 = 0x0038;
const FAULT_LATCHED: u16 = 0x0133;

fn n(raw: u8) -> NodeId {
    NodeId::new(raw).unwrap()
}

/// Feed `words` in order, starting in `start`; returns every state visited.
fn walk(start: MotionState, words: &[u16]) -> Vec<MotionState> {
    let mut state = start;
    words
        .iter()
        .map(|&raw| {
            state = next_state(state, StatusWord::from_raw(raw), n(1));
            state
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn power_up_from_switched_off() {
    use MotionState as S;
    assert_eq!(
        walk(S::Initial, &[SWITCHED_OFF, SWITCHED_OFF, DISABLED]),
        vec![S::InitialPowerOff, S::PowerOnDisableOperation, S::Idle]
    );
}

#[test]
fn full_move_cycle() {
    use MotionState as S;
    assert_eq!(
        walk(S::PrepareMove, &[ENABLED, ACK, ENABLED, ENABLED, REACHED, DISABLED]),
        vec![
            S::PrepareMove,
            S::ReadyToMove,
            S::Moving,
            S::Moving,
            S::PowerOnDisableOperation,
            S::Idle,
        ]
    );
}

#[test]
fn homing_cycle_and_failed_homing() {
    use MotionState as S;
    assert_eq!(
        walk(S::PrepareHoming, &[ENABLED, ENABLED, HOMED, DISABLED]),
        vec![S::ReadyForHoming, S::Homing, S::PowerOnDisableOperation, S::Idle]
    );
    assert_eq!(walk(S::Homing, &[REACHED]), vec![S::Fault]);
}

#[test]
fn fault_recovery_waits_for_latched_bit() {
    use MotionState as S;
    assert_eq!(
        walk(S::Moving, &[FAULT, FAULT_LATCHED, DISABLED]),
        vec![S::Fault, S::Fault, S::FaultReset]
    );
    assert_eq!(
        walk(S::FaultReset, &[FAULT_LATCHED, DISABLED, SWITCHED_OFF]),
        vec![
            S::FaultReset,
            S::CyclePowerShutdown,
            S::PowerOnDisableOperation
        ]
    );
}

#[test]
fn leader_moves_when_either_axis_moves() {
    use MotionState as S;
    let (leader, follower) = (n(3), n(4));
    let mut mirror = LeaderMirror {
        own: S::PrepareMove,
        follower: S::PrepareMove,
    };
    let ack = StatusWord::from_raw(ACK);
    let enabled = StatusWord::from_raw(ENABLED);

    assert_eq!(mirror.observe(S::PrepareMove, Channel::Follower, ack, leader, follower), None);
    assert_eq!(
        mirror.observe(S::PrepareMove, Channel::Own, ack, leader, follower),
        Some(S::ReadyToMove)
    );
    assert_eq!(
        mirror.observe(S::ReadyToMove, Channel::Follower, enabled, leader, follower),
        Some(S::Moving)
    );
}

#[test]
fn follower_only_commits_outside_motion_sequencing() {
    use MotionState as S;
    assert!(follower_commits(S::PowerOnDisableOperation, S::Idle));
    assert!(follower_commits(S::Moving, S::Fault));
    assert!(!follower_commits(S::PrepareMove, S::ReadyToMove));
    assert!(!follower_commits(S::ReadyToMove, S::Moving));
}
