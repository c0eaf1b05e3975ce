//! Integration test: device descriptions loaded from disk.

use cia402_common::config::{ConfigError, NodeConfig};
use cia402_common::types::{DataType, NodeId, ObjectAddress, ObjectValue};
use cia402_drive::catalog::ParameterCatalog;
use cia402_drive::config::DriverConfig;
use cia402_drive::error::CatalogError;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

// ── Helpers ─────────────────────────────────────────────────────────

const DRIVE: &str = r#"
[device]
name = "Servo drive"
vendor_id = 0x0000_02A1
product_code = 0x0001_0300

[[objects]]
index = 0x6083
name = "Profile acceleration"

[[objects.sub]]
sub_index = 0
data_type = "unsigned32"
value = 2500

[[objects]]
index = 0x1400
name = "RPDO1 communication parameter"

[[objects.sub]]
sub_index = 2
data_type = "unsigned8"
value = 255

[[objects.sub]]
sub_index = 1
data_type = "unsigned32"
value = 0x203

[[objects]]
index = 0x6041
name = "Statusword"

[[objects.sub]]
sub_index = 0
data_type = "unsigned16"
access = "ro"
value = 0
"#;

fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create file");
    file.write_all(content).expect("write file");
    path
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn description_keeps_declaration_order() {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(DRIVE.as_bytes()).expect("write description");

    let catalog = ParameterCatalog::load(file.path()).expect("catalog loads");
    assert_eq!(catalog.device().name, "Servo drive");

    let indices: Vec<u16> = catalog.explicit_parameters().iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![0x6083, 0x1400]);

    let rpdo = catalog.parameter(0x1400).expect("rpdo entry");
    assert_eq!(rpdo.sub_indices, vec![1, 2]);
    assert_eq!(catalog.read::<u32>(ObjectAddress::new(0x1400, 1)).unwrap(), 0x203);
    assert_eq!(
        catalog.type_of(ObjectAddress::new(0x6041, 0)),
        Some(DataType::Unsigned16)
    );
}

#[test]
fn driver_config_loads_catalog_and_blob() {
    let dir = TempDir::new().expect("temp dir");
    let description = write(&dir, "drive.toml", DRIVE.as_bytes());
    let blob = write(&dir, "drive.bin", &[0xAA; 12]);

    let node = NodeConfig {
        id: NodeId::new(9).unwrap(),
        description,
        binary_description: Some(blob),
    };
    let config = DriverConfig::from_node_config(&node).expect("driver config");

    assert_eq!(config.node.get(), 9);
    assert_eq!(config.binary_description.as_deref().map(<[u8]>::len), Some(12));
    assert_eq!(
        config.catalog.value(ObjectAddress::new(0x6083, 0)).unwrap(),
        &ObjectValue::Unsigned32(2500)
    );
}

#[test]
fn missing_files_are_reported() {
    let dir = TempDir::new().expect("temp dir");
    let description = write(&dir, "drive.toml", DRIVE.as_bytes());

    let missing_description = NodeConfig {
        id: NodeId::new(2).unwrap(),
        description: dir.path().join("absent.toml"),
        binary_description: None,
    };
    assert!(matches!(
        DriverConfig::from_node_config(&missing_description),
        Err(CatalogError::Config(ConfigError::FileNotFound(_)))
    ));

    let missing_blob = NodeConfig {
        id: NodeId::new(2).unwrap(),
        description,
        binary_description: Some(dir.path().join("absent.bin")),
    };
    assert!(matches!(
        DriverConfig::from_node_config(&missing_blob),
        Err(CatalogError::Io { .. })
    ));
}

#[test]
fn value_outside_declared_type_is_rejected() {
    let err = ParameterCatalog::from_toml_str(
        r#"
        [[objects]]
        index = 0x2000

        [[objects.sub]]
        sub_index = 1
        data_type = "unsigned8"
        value = 300
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidValue { .. }));
}
