//! Integration test: drive faults, emergency handling and recovery.

use super::{STEP, eventually, n, running_master, wait_state};
use cia402_common::config::CommunicationScheme;
use cia402_common::consts::{CONTROL_WORD, FAULT_REGISTER};
use cia402_common::nmt::NmtCommand;
use cia402_common::types::{NodeId, ObjectValue};
use cia402_drive::command::{MoveMode, MoveRequest};
use cia402_drive::state::MotionState;
use cia402_master::MasterCore;
use cia402_master::sim::BusOperation;
use tokio::sync::oneshot;

// ── Helpers ─────────────────────────────────────────────────────────

async fn recover(core: &MasterCore, node: NodeId) {
    let (done, idle) = oneshot::channel();
    core.registry()
        .get(node)
        .expect("registered node")
        .recover_from_fault(move || {
            let _ = done.send(());
        })
        .expect("request delivered");
    tokio::time::timeout(STEP, idle)
        .await
        .expect("recovered in time")
        .expect("completion callback ran");
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn fault_register_is_read_without_emergency() {
    let core = running_master(CommunicationScheme::Sdo).await;
    core.bus().clear_operations();

    core.bus().inject_fault(n(4), 0x5441, false);
    wait_state(&core, n(4), MotionState::Fault).await;

    let bus = core.bus().clone();
    assert!(eventually(|| bus.operations().contains(&BusOperation::SdoRead(n(4), FAULT_REGISTER))).await);
    core.shutdown();
}

#[tokio::test]
async fn emergency_suppresses_fault_register_read() {
    let core = running_master(CommunicationScheme::Sdo).await;
    core.bus().clear_operations();

    core.bus().inject_fault(n(4), 0x2310, true);
    wait_state(&core, n(4), MotionState::Fault).await;
    recover(&core, n(4)).await;

    assert!(!core
        .bus()
        .operations()
        .contains(&BusOperation::SdoRead(n(4), FAULT_REGISTER)));
    core.shutdown();
}

#[tokio::test]
async fn recovery_resets_node_and_returns_to_idle() {
    let core = running_master(CommunicationScheme::MappedTpdo).await;
    core.bus().clear_operations();

    core.bus().inject_fault(n(4), 0x7300, false);
    wait_state(&core, n(4), MotionState::Fault).await;
    recover(&core, n(4)).await;

    let ops = core.bus().operations();
    assert!(ops.contains(&BusOperation::Nmt(NmtCommand::ResetNode, Some(n(4)))));
    assert!(ops.contains(&BusOperation::ConfigurationFinished(n(4), true)));
    assert!(ops.contains(&BusOperation::SdoWrite(
        n(4),
        CONTROL_WORD,
        ObjectValue::Unsigned16(0x0080)
    )));
    assert_eq!(core.registry().get(n(4)).map(|h| h.state()), Some(MotionState::Idle));

    // The other axes are untouched.
    for node in [n(2), n(3)] {
        assert_eq!(core.registry().get(node).map(|h| h.state()), Some(MotionState::Idle));
    }
    core.shutdown();
}

#[tokio::test]
async fn moves_run_again_after_recovery() {
    let core = running_master(CommunicationScheme::Sdo).await;

    core.bus().inject_fault(n(4), 0x7300, true);
    wait_state(&core, n(4), MotionState::Fault).await;
    recover(&core, n(4)).await;

    core.run_demo(600).await.expect("demo runs");
    assert_eq!(core.bus().drive_position(n(4)), Some(600));
    core.shutdown();
}

#[tokio::test]
async fn motion_requested_in_fault_runs_after_recovery() {
    let core = running_master(CommunicationScheme::Sdo).await;
    let handle = core.registry().get(n(4)).expect("registered node").clone();

    core.bus().inject_fault(n(4), 0x7300, false);
    wait_state(&core, n(4), MotionState::Fault).await;

    let (moved_tx, moved) = oneshot::channel::<()>();
    handle
        .move_to(
            MoveRequest {
                mode: MoveMode::Absolute,
                position: 5_000,
                velocity: 1_000,
                acceleration: 1_000,
                deceleration: 1_000,
            },
            move || {
                let _ = moved_tx.send(());
            },
        )
        .expect("request delivered");
    handle.recover_from_fault(|| {}).expect("request delivered");

    tokio::time::timeout(STEP, moved)
        .await
        .expect("move finished in time")
        .expect("completion callback ran");
    assert_eq!(core.bus().drive_position(n(4)), Some(5_000));
    core.shutdown();
}
