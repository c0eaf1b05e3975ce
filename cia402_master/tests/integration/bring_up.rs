//! Integration test: network start-up from the master configuration.

use super::{STEP, fast_timing, n, running_master, shipped_config};
use cia402_common::config::{CommunicationScheme, ConfigError, MasterConfig};
use cia402_common::types::{ObjectAddress, ObjectValue};
use cia402_drive::pairing::Role;
use cia402_master::sim::BusOperation;
use cia402_master::{MasterCore, MasterError};
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create file");
    file.write_all(content.as_bytes()).expect("write file");
    path
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn shipped_configuration_brings_every_axis_to_idle() {
    let core = running_master(CommunicationScheme::MappedTpdo).await;

    assert_eq!(core.registry().nodes(), vec![n(2), n(3), n(4)]);
    assert!(core.registry().is_system_ready());

    let pairing = core.registry().pairing();
    assert_eq!(pairing.lock().pairs(), vec![(n(2), n(3))]);
    assert_eq!(pairing.lock().role_of(n(4)), Role::Standalone);

    let ops = core.bus().operations();
    for node in [n(2), n(3), n(4)] {
        assert!(ops.contains(&BusOperation::ConfigurationFinished(node, true)));
    }
    core.shutdown();
}

#[tokio::test]
async fn catalog_values_reach_the_drive() {
    let core = running_master(CommunicationScheme::Sdo).await;
    assert_eq!(
        core.bus().object(n(2), ObjectAddress::new(0x6065, 0)),
        Some(ObjectValue::Unsigned32(2000))
    );
    assert_eq!(
        core.bus().object(n(4), ObjectAddress::new(0x607F, 0)),
        Some(ObjectValue::Unsigned32(12000))
    );
    core.shutdown();
}

#[tokio::test]
async fn second_reset_reports_system_ready_again() {
    let core = running_master(CommunicationScheme::Sdo).await;
    core.bus().clear_operations();

    core.start(STEP).await.expect("ready after second reset");
    let configured = core
        .bus()
        .operations()
        .iter()
        .filter(|op| matches!(op, BusOperation::ConfigurationFinished(_, true)))
        .count();
    assert_eq!(configured, 3);
    core.shutdown();
}

#[tokio::test]
async fn missing_node_never_becomes_ready() {
    let core = MasterCore::with_timing(shipped_config(), fast_timing()).expect("master builds");
    core.bus().set_online(n(4), false);

    let result = core.start(Duration::from_millis(200)).await;
    assert!(matches!(result, Err(MasterError::BootTimeout(200))));
    assert!(!core.registry().is_system_ready());
    core.shutdown();
}

#[tokio::test]
async fn rejected_parameter_blocks_ready() {
    let core = MasterCore::with_timing(shipped_config(), fast_timing()).expect("master builds");
    let max_velocity = ObjectAddress::new(0x607F, 0);
    core.bus().fail_writes_to(n(4), max_velocity);

    let result = core.start(Duration::from_millis(200)).await;
    assert!(matches!(result, Err(MasterError::BootTimeout(200))));
    assert!(
        core.bus()
            .operations()
            .contains(&BusOperation::ConfigurationFinished(n(4), false))
    );
    assert!(
        core.bus()
            .operations()
            .contains(&BusOperation::ConfigurationFinished(n(2), true))
    );
    core.shutdown();
}

#[tokio::test]
async fn missing_description_fails_start_up() {
    let dir = TempDir::new().expect("temp dir");
    let path = write(
        &dir,
        "master.toml",
        r#"
        [shared]
        service_name = "test"

        [[nodes]]
        id = 5
        description = "absent.toml"
        "#,
    );
    let config = MasterCore::load_config(&path).expect("config itself is valid");
    assert!(matches!(
        MasterCore::new(config),
        Err(MasterError::Catalog { node, .. }) if node == n(5)
    ));
}

#[test]
fn configuration_without_nodes_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let path = write(
        &dir,
        "master.toml",
        r#"
        [shared]
        service_name = "test"
        "#,
    );
    assert!(matches!(
        MasterCore::load_config(&path),
        Err(MasterError::Config(ConfigError::ValidationError(_)))
    ));
}

#[test]
fn relative_descriptions_resolve_against_the_master_file() {
    let config: MasterConfig = shipped_config();
    let expected = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/gantry_drive.toml");
    assert_eq!(config.nodes[0].description, expected);
    assert_eq!(config.communication, CommunicationScheme::MappedTpdo);
}
