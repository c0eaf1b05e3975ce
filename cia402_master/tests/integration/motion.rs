//! Integration test: homing and moves through every communication scheme.

use super::{STEP, n, running_master, wait_state};
use cia402_common::config::CommunicationScheme;
use cia402_common::consts::CONTROL_WORD;
use cia402_common::types::{NodeId, ObjectValue};
use cia402_drive::command::{HomingMethod, HomingRequest, MoveMode, MoveRequest};
use cia402_drive::state::MotionState;
use cia402_master::MasterCore;
use cia402_master::sim::BusOperation;
use tokio::sync::oneshot;

// ── Helpers ─────────────────────────────────────────────────────────

fn move_request(mode: MoveMode, position: i32) -> MoveRequest {
    MoveRequest {
        mode,
        position,
        velocity: 4_000,
        acceleration: 10_000,
        deceleration: 10_000,
    }
}

fn homing_request(method: HomingMethod) -> HomingRequest {
    HomingRequest {
        method,
        search_speed: 500,
        release_speed: 50,
        acceleration: 5_000,
        offset: 0,
    }
}

async fn move_and_wait(core: &MasterCore, node: NodeId, request: MoveRequest) {
    let (done, idle) = oneshot::channel();
    core.registry()
        .get(node)
        .expect("registered node")
        .move_to(request, move || {
            let _ = done.send(());
        })
        .expect("request delivered");
    tokio::time::timeout(STEP, idle)
        .await
        .expect("move finished in time")
        .expect("completion callback ran");
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn demo_moves_every_axis_over_sdo() {
    let core = running_master(CommunicationScheme::Sdo).await;
    core.run_demo(4_000).await.expect("demo runs");

    for node in [n(2), n(3), n(4)] {
        assert_eq!(core.bus().drive_position(node), Some(4_000), "node {node}");
        wait_state(&core, node, MotionState::Idle).await;
    }
    core.shutdown();
}

#[tokio::test]
async fn demo_moves_every_axis_over_mapped_tpdo() {
    let core = running_master(CommunicationScheme::MappedTpdo).await;
    core.run_demo(-1_500).await.expect("demo runs");

    for node in [n(2), n(3), n(4)] {
        assert_eq!(core.bus().drive_position(node), Some(-1_500), "node {node}");
    }
    core.shutdown();
}

#[tokio::test]
async fn demo_moves_every_axis_over_master_objects() {
    let core = running_master(CommunicationScheme::MasterObject).await;
    core.run_demo(2_500).await.expect("demo runs");

    for node in [n(2), n(3), n(4)] {
        assert_eq!(core.bus().drive_position(node), Some(2_500), "node {node}");
    }
    core.shutdown();
}

#[tokio::test]
async fn move_requested_while_homing_runs_afterwards() {
    let core = running_master(CommunicationScheme::Sdo).await;
    let handle = core.registry().get(n(4)).expect("registered node");

    let (homed_tx, homed) = oneshot::channel();
    handle
        .home(
            homing_request(HomingMethod::PositiveSwitchLeftEdge),
            move || {
                let _ = homed_tx.send(());
            },
        )
        .expect("homing delivered");
    move_and_wait(&core, n(4), move_request(MoveMode::Absolute, 700)).await;

    assert!(homed.await.is_ok());
    assert_eq!(core.bus().drive_position(n(4)), Some(700));
    core.shutdown();
}

#[tokio::test]
async fn follower_position_tracks_its_leader() {
    let core = running_master(CommunicationScheme::MappedTpdo).await;

    move_and_wait(&core, n(2), move_request(MoveMode::Absolute, 900)).await;
    assert_eq!(core.bus().drive_position(n(2)), Some(900));
    assert_eq!(core.bus().drive_position(n(3)), Some(900));
    assert_eq!(core.registry().get(n(3)).map(|h| h.state()), Some(MotionState::Idle));
    core.shutdown();
}

#[tokio::test]
async fn relative_moves_accumulate() {
    let core = running_master(CommunicationScheme::MappedTpdo).await;

    move_and_wait(&core, n(4), move_request(MoveMode::Absolute, 1_000)).await;
    move_and_wait(&core, n(4), move_request(MoveMode::Relative, 250)).await;
    move_and_wait(&core, n(4), move_request(MoveMode::Relative, -100)).await;
    assert_eq!(core.bus().drive_position(n(4)), Some(1_150));
    core.shutdown();
}

#[tokio::test]
async fn gantry_leader_homes_once_with_its_follower() {
    let core = running_master(CommunicationScheme::Sdo).await;
    move_and_wait(&core, n(2), move_request(MoveMode::Absolute, 900)).await;
    core.bus().clear_operations();

    let (homed_tx, homed) = oneshot::channel();
    core.registry()
        .get(n(2))
        .expect("registered node")
        .home(homing_request(HomingMethod::Custom(35)), move || {
            let _ = homed_tx.send(());
        })
        .expect("homing delivered");
    tokio::time::timeout(STEP, homed)
        .await
        .expect("homing finished in time")
        .expect("completion callback ran");

    let start_homing = core
        .bus()
        .operations()
        .into_iter()
        .filter(|op| {
            *op == BusOperation::SdoWrite(n(2), CONTROL_WORD, ObjectValue::Unsigned16(0x001F))
        })
        .count();
    assert_eq!(start_homing, 1);
    assert_eq!(core.bus().drive_position(n(2)), Some(0));
    assert_eq!(core.bus().drive_position(n(3)), Some(0));
    wait_state(&core, n(2), MotionState::Idle).await;
    wait_state(&core, n(3), MotionState::Idle).await;
    core.shutdown();
}
