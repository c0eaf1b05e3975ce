mod bring_up;
mod faults;
mod motion;

use cia402_common::config::{CommunicationScheme, MasterConfig};
use cia402_common::types::NodeId;
use cia402_drive::state::MotionState;
use cia402_master::MasterCore;
use cia402_master::sim::SimTiming;
use std::path::Path;
use std::time::Duration;

// ── Helpers ─────────────────────────────────────────────────────────

pub const STEP: Duration = Duration::from_secs(2);

pub fn n(raw: u8) -> NodeId {
    NodeId::new(raw).expect("valid node id")
}

pub fn shipped_config() -> MasterConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/master.toml");
    MasterCore::load_config(&path).expect("shipped configuration loads")
}

pub fn fast_timing() -> SimTiming {
    SimTiming {
        homing: Duration::from_millis(5),
        positioning: Duration::from_millis(5),
        sdo_timeout: Duration::from_millis(50),
    }
}

/// Started master over the shipped configuration, every axis IDLE.
pub async fn running_master(scheme: CommunicationScheme) -> MasterCore {
    let mut config = shipped_config();
    config.communication = scheme;
    let core = MasterCore::with_timing(config, fast_timing()).expect("master builds");
    core.start(STEP).await.expect("system becomes ready");
    for node in core.registry().nodes() {
        wait_state(&core, node, MotionState::Idle).await;
    }
    core
}

pub async fn wait_state(core: &MasterCore, node: NodeId, state: MotionState) {
    let handle = core.registry().get(node).expect("registered node");
    tokio::time::timeout(STEP, handle.wait_for(state))
        .await
        .unwrap_or_else(|_| panic!("node {node} did not reach {state}, still {}", handle.state()))
        .expect("executor alive");
}

/// Poll `condition` until it holds or `STEP` elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + STEP;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
