//! Configuration sequencer.
//!
//! Walks the explicitly-set parameters of a catalog in declaration order and
//! transfers them to the remote node, one awaited write at a time. The first
//! failure aborts the run and is returned with the failing step and address.
//!
//! ## PDO entries
//!
//! ```text
//! (a) read  COB-ID            (idx, 1)
//! (b) write COB-ID | invalid  (idx, 1)
//! (c) copy  transmission type (idx, 2), inhibit time (idx, 3) if described
//!     ── no mapping entry in the catalog: done, PDO stays invalid
//! (d) write 0                 (idx + 0x200, 0)
//! (e) copy  mapped objects    (idx + 0x200, 1..), then count (idx + 0x200, 0)
//! (f) copy  COB-ID            (idx, 1)
//! ```
//!
//! Receive-PDO control entries additionally feed their COB-ID into the
//! [`PairingRegistry`] before the PDO is touched.

use crate::catalog::{ParameterCatalog, ParameterEntry};
use crate::config::DriverConfig;
use crate::pairing::{PairingOutcome, PairingRegistry};
use async_trait::async_trait;
use cia402_common::consts::{
    COB_ID_BASE_MASK, COB_ID_INVALID, COB_ID_MASK, MASTER_NODE_RPDO_TABLE, PDO_COB_ID_SUB,
    PDO_INHIBIT_TIME_SUB, PDO_MAPPING_COUNT_SUB, PDO_MAPPING_OFFSET, PDO_TRANSMISSION_TYPE_SUB,
    RESTORE_DEFAULT_PARAMETERS, RESTORE_SIGNATURE_LOAD, RPDO_CONTROL, TPDO_CONTROL, is_pdo_mapping,
};
use cia402_common::engine::{ProtocolEngine, read_scalar, write_scalar};
use cia402_common::error::{ConfigureError, LocalReadError, TransportError};
use cia402_common::types::{NodeId, ObjectAddress, ObjectValue};
use parking_lot::Mutex;
use tracing::{debug, info};

// ─── Clear Strategy ─────────────────────────────────────────────────

/// Result of a clear-configuration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Device cleared, continue with the transfer.
    Cleared,
    /// Skip the transfer; the configuration counts as successful.
    Cancelled,
}

/// Brings a device back to a known state before it is configured.
#[async_trait]
pub trait ClearConfiguration: Send + Sync {
    async fn clear(
        &self,
        engine: &dyn ProtocolEngine,
        node: NodeId,
    ) -> Result<ClearOutcome, TransportError>;
}

/// Writes the "load" signature to 0x1011/1 (restore all default parameters).
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreDefaults;

#[async_trait]
impl ClearConfiguration for RestoreDefaults {
    async fn clear(
        &self,
        engine: &dyn ProtocolEngine,
        node: NodeId,
    ) -> Result<ClearOutcome, TransportError> {
        write_scalar(engine, node, RESTORE_DEFAULT_PARAMETERS, RESTORE_SIGNATURE_LOAD).await?;
        Ok(ClearOutcome::Cleared)
    }
}

// ─── Sequencer ──────────────────────────────────────────────────────

/// One configuration run for one node.
///
/// Runs are not guarded against re-entry; the axis executor serializes them.
pub struct ConfigurationSequencer<'a> {
    engine: &'a dyn ProtocolEngine,
    config: &'a DriverConfig,
    pairing: &'a Mutex<PairingRegistry>,
}

impl<'a> ConfigurationSequencer<'a> {
    pub fn new(
        engine: &'a dyn ProtocolEngine,
        config: &'a DriverConfig,
        pairing: &'a Mutex<PairingRegistry>,
    ) -> Self {
        Self {
            engine,
            config,
            pairing,
        }
    }

    #[inline]
    fn node(&self) -> NodeId {
        self.config.node
    }

    #[inline]
    fn catalog(&self) -> &ParameterCatalog {
        &self.config.catalog
    }

    /// Transfer every explicit parameter.
    pub async fn run(&self) -> Result<(), ConfigureError> {
        let entries = self.catalog().explicit_parameters();
        info!("Node {}: transferring {} parameters", self.node(), entries.len());

        for entry in entries {
            let index = entry.index;
            if RPDO_CONTROL.contains(&index) {
                self.detect_pairing(index)?;
                self.configure_pdo(index).await?;
            } else if TPDO_CONTROL.contains(&index) {
                self.configure_pdo(index).await?;
            } else if is_pdo_mapping(index) {
                debug!("Node {}: 0x{:04x} handled with its PDO", self.node(), index);
            } else {
                self.configure_scalar(entry).await?;
            }
        }

        info!("Node {}: configuration transferred", self.node());
        Ok(())
    }

    /// Full run including the optional clear strategy and blob download.
    pub async fn run_with(&self, clear: Option<&dyn ClearConfiguration>) -> Result<(), ConfigureError> {
        if self.config.binary_description.is_some() {
            detect_master_table_pairing(self.engine, self.node(), self.pairing)?;
        }

        let Some(clear) = clear else {
            return self.run().await;
        };

        match clear.clear(self.engine, self.node()).await {
            Ok(ClearOutcome::Cancelled) => {
                info!("Node {}: configuration cancelled by clear strategy", self.node());
                return Ok(());
            }
            Ok(ClearOutcome::Cleared) => {}
            Err(e) => return Err(ConfigureError::ClearConfiguration(e)),
        }

        self.run().await?;

        if let Some(blob) = &self.config.binary_description {
            info!("Node {}: downloading {} byte description", self.node(), blob.len());
            self.engine
                .download_description(self.node(), blob)
                .await
                .map_err(ConfigureError::DescriptionDownload)?;
        }
        Ok(())
    }

    fn detect_pairing(&self, index: u16) -> Result<(), ConfigureError> {
        let address = ObjectAddress::new(index, PDO_COB_ID_SUB);
        let cob_id = self
            .catalog()
            .read::<u32>(address)
            .map_err(|source| ConfigureError::LocalRead { address, source })?
            & COB_ID_MASK;

        let outcome = self.pairing.lock().observe(cob_id, self.node())?;
        match outcome {
            PairingOutcome::Follows(leader) => {
                info!("Node {} follows node {}", self.node(), leader)
            }
            PairingOutcome::Leads(follower) => {
                info!("Node {} follows node {}", follower, self.node())
            }
            PairingOutcome::Claimed | PairingOutcome::Unchanged => {}
        }
        Ok(())
    }

    async fn configure_pdo(&self, index: u16) -> Result<(), ConfigureError> {
        let node = self.node();
        let cob_address = ObjectAddress::new(index, PDO_COB_ID_SUB);
        debug!("Node {}: configuring PDO 0x{:04x}", node, index);

        let current: u32 = read_scalar(self.engine, node, cob_address)
            .await
            .map_err(|source| ConfigureError::RemoteRead {
                address: cob_address,
                source,
            })?;
        self.write(cob_address, ObjectValue::Unsigned32(current | COB_ID_INVALID))
            .await?;

        self.copy(ObjectAddress::new(index, PDO_TRANSMISSION_TYPE_SUB)).await?;
        self.copy_if_described(ObjectAddress::new(index, PDO_INHIBIT_TIME_SUB))
            .await?;

        let mapping_index = index + PDO_MAPPING_OFFSET;
        let Some(mapping) = self.catalog().parameter(mapping_index) else {
            debug!(
                "Node {}: no mapping described for PDO 0x{:04x}, leaving it disabled",
                node, index
            );
            return Ok(());
        };

        let count_address = ObjectAddress::new(mapping_index, PDO_MAPPING_COUNT_SUB);
        self.write(count_address, ObjectValue::Unsigned8(0)).await?;
        for sub in mapping
            .sub_indices
            .iter()
            .copied()
            .filter(|&sub| sub != PDO_MAPPING_COUNT_SUB)
        {
            self.copy(ObjectAddress::new(mapping_index, sub)).await?;
        }
        self.copy(count_address).await?;

        self.copy(cob_address).await
    }

    async fn configure_scalar(&self, entry: &ParameterEntry) -> Result<(), ConfigureError> {
        for address in entry.addresses() {
            let data_type = self
                .catalog()
                .type_of(address)
                .ok_or(ConfigureError::UnknownType { address })?;
            if !data_type.is_transferable() {
                return Err(ConfigureError::UnsupportedType { address, data_type });
            }
            self.copy(address).await?;
        }
        Ok(())
    }

    /// Write the catalog value of `address` to the node.
    async fn copy(&self, address: ObjectAddress) -> Result<(), ConfigureError> {
        let value = self
            .catalog()
            .value(address)
            .map_err(|source| ConfigureError::LocalRead { address, source })?
            .clone();
        self.write(address, value).await
    }

    async fn copy_if_described(&self, address: ObjectAddress) -> Result<(), ConfigureError> {
        match self.catalog().value(address) {
            Err(LocalReadError::NotFound(_)) => {
                debug!("Node {}: {} not described, skipped", self.node(), address);
                Ok(())
            }
            _ => self.copy(address).await,
        }
    }

    async fn write(&self, address: ObjectAddress, value: ObjectValue) -> Result<(), ConfigureError> {
        debug!("Node {}: write {} = {}", self.node(), address, value);
        self.engine
            .write(self.node(), address, value)
            .await
            .map_err(|source| ConfigureError::RemoteWrite { address, source })
    }
}

// ─── Master Table Pairing ───────────────────────────────────────────

fn master_u32(engine: &dyn ProtocolEngine, address: ObjectAddress) -> Option<u32> {
    match engine.read_master(address)? {
        ObjectValue::Unsigned32(v) => Some(v),
        _ => None,
    }
}

/// Detect pairing from the master's own node/RPDO tables.
///
/// Entries `0x5C00..=0x5DFF` hold `node id | rpdo << 8`; the master TPDO at
/// the same offset from 0x1800 carries the COB-ID. Two first-RPDO entries
/// whose master TPDOs share an 11-bit COB-ID belong to a pair. The scan ends
/// at the first missing entry.
pub fn detect_master_table_pairing(
    engine: &dyn ProtocolEngine,
    node: NodeId,
    pairing: &Mutex<PairingRegistry>,
) -> Result<Option<PairingOutcome>, ConfigureError> {
    const FIRST_RPDO: u32 = 0x0100;
    let table_start = *MASTER_NODE_RPDO_TABLE.start();
    let tpdo_start = *TPDO_CONTROL.start();

    for table_index in MASTER_NODE_RPDO_TABLE {
        let Some(entry) = master_u32(engine, ObjectAddress::new(table_index, 0)) else {
            return Ok(None);
        };
        if entry & 0xFFFF != FIRST_RPDO + u32::from(node.get()) {
            continue;
        }

        let own_tpdo = table_index - table_start + tpdo_start;
        let Some(cob_id) = master_u32(engine, ObjectAddress::new(own_tpdo, PDO_COB_ID_SUB)) else {
            return Ok(None);
        };
        let cob_id = cob_id & COB_ID_BASE_MASK;

        for other_tpdo in TPDO_CONTROL {
            if other_tpdo == own_tpdo {
                continue;
            }
            let Some(other_cob) = master_u32(engine, ObjectAddress::new(other_tpdo, PDO_COB_ID_SUB))
            else {
                return Ok(None);
            };
            if other_cob & COB_ID_BASE_MASK != cob_id {
                continue;
            }

            let other_table = other_tpdo - tpdo_start + table_start;
            let Some(other_entry) = master_u32(engine, ObjectAddress::new(other_table, 0)) else {
                return Ok(None);
            };
            if other_entry & 0xFF00 != FIRST_RPDO {
                return Ok(None);
            }
            let Some(other) = NodeId::new((other_entry & 0xFF) as u8) else {
                return Ok(None);
            };
            if other == node {
                return Ok(None);
            }
            let outcome = pairing.lock().link(cob_id, node, other)?;
            debug!("Node {}: master table pairing with node {}: {:?}", node, other, outcome);
            return Ok(Some(outcome));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::Role;
    use crate::test_support::{Op, ScriptedEngine, node};
    use cia402_common::consts::SDO_ABORT_NO_OBJECT;
    use cia402_common::error::ConfigStep;
    use cia402_common::types::DataType;
    use std::sync::Arc;

    fn addr(index: u16, sub: u8) -> ObjectAddress {
        ObjectAddress::new(index, sub)
    }

    fn rpdo_catalog(cob: u32, with_mapping: bool) -> ParameterCatalog {
        let mut builder = ParameterCatalog::builder()
            .entry(addr(0x1400, 1), cob)
            .entry(addr(0x1400, 2), 0xFFu8);
        if with_mapping {
            builder = builder
                .entry(addr(0x1600, 0), 2u8)
                .entry(addr(0x1600, 1), 0x6040_0010u32)
                .entry(addr(0x1600, 2), 0x6060_0008u32);
        }
        builder.build().unwrap()
    }

    fn config(id: u8, catalog: ParameterCatalog) -> DriverConfig {
        DriverConfig::new(node(id), Arc::new(catalog))
    }

    async fn run(engine: &ScriptedEngine, config: &DriverConfig, pairing: &Mutex<PairingRegistry>) -> Result<(), ConfigureError> {
        ConfigurationSequencer::new(engine, config, pairing).run().await
    }

    #[tokio::test]
    async fn scalar_writes_in_ascending_sub_order() {
        let catalog = ParameterCatalog::builder()
            .entry(addr(0x2000, 3), 3u16)
            .entry(addr(0x2000, 1), 1u16)
            .entry(addr(0x6083, 0), 1000u32)
            .build()
            .unwrap();
        let engine = ScriptedEngine::new();
        let pairing = Mutex::new(PairingRegistry::new());
        run(&engine, &config(2, catalog), &pairing).await.unwrap();

        assert_eq!(
            engine.writes(),
            vec![
                (addr(0x2000, 1), ObjectValue::Unsigned16(1)),
                (addr(0x2000, 3), ObjectValue::Unsigned16(3)),
                (addr(0x6083, 0), ObjectValue::Unsigned32(1000)),
            ]
        );
        assert_eq!(
            engine.remote(node(2), addr(0x6083, 0)),
            Some(ObjectValue::Unsigned32(1000))
        );
    }

    #[tokio::test]
    async fn first_failing_write_halts() {
        let catalog = ParameterCatalog::builder()
            .entry(addr(0x2000, 1), 1u8)
            .entry(addr(0x2000, 2), 2u8)
            .entry(addr(0x2001, 0), 3u8)
            .build()
            .unwrap();
        let engine = ScriptedEngine::new();
        engine.fail_write(addr(0x2000, 2));
        let pairing = Mutex::new(PairingRegistry::new());
        let err = run(&engine, &config(2, catalog), &pairing).await.unwrap_err();

        assert_eq!(err.step(), Some(ConfigStep::WriteRemote));
        assert_eq!(err.address(), Some(addr(0x2000, 2)));
        assert_eq!(engine.writes().len(), 2);
    }

    #[tokio::test]
    async fn unsupported_type_is_fatal() {
        let catalog = ParameterCatalog::builder()
            .entry(addr(0x2000, 1), ObjectValue::Real32(1.5))
            .build()
            .unwrap();
        let engine = ScriptedEngine::new();
        let pairing = Mutex::new(PairingRegistry::new());
        let err = run(&engine, &config(2, catalog), &pairing).await.unwrap_err();
        assert_eq!(
            err,
            ConfigureError::UnsupportedType {
                address: addr(0x2000, 1),
                data_type: DataType::Real32,
            }
        );
        assert!(engine.writes().is_empty());
    }

    #[tokio::test]
    async fn time_parameter_is_refused_at_transfer() {
        let catalog = ParameterCatalog::builder()
            .entry(addr(0x2000, 1), 7u16)
            .entry(
                addr(0x2010, 0),
                ObjectValue::Raw(DataType::TimeDifference, vec![0; 6]),
            )
            .build()
            .unwrap();
        let engine = ScriptedEngine::new();
        let pairing = Mutex::new(PairingRegistry::new());
        let err = run(&engine, &config(2, catalog), &pairing).await.unwrap_err();
        assert_eq!(
            err,
            ConfigureError::UnsupportedType {
                address: addr(0x2010, 0),
                data_type: DataType::TimeDifference,
            }
        );
        assert_eq!(engine.writes(), vec![(addr(0x2000, 1), ObjectValue::Unsigned16(7))]);
    }

    #[tokio::test]
    async fn pdo_protocol_order() {
        let engine = ScriptedEngine::new();
        engine.set_remote(node(2), addr(0x1400, 1), 0x8000_0180u32);
        let pairing = Mutex::new(PairingRegistry::new());
        run(&engine, &config(2, rpdo_catalog(0x202, true)), &pairing)
            .await
            .unwrap();

        assert_eq!(
            engine.writes(),
            vec![
                (addr(0x1400, 1), ObjectValue::Unsigned32(0x8000_0180)),
                (addr(0x1400, 2), ObjectValue::Unsigned8(0xFF)),
                (addr(0x1600, 0), ObjectValue::Unsigned8(0)),
                (addr(0x1600, 1), ObjectValue::Unsigned32(0x6040_0010)),
                (addr(0x1600, 2), ObjectValue::Unsigned32(0x6060_0008)),
                (addr(0x1600, 0), ObjectValue::Unsigned8(2)),
                (addr(0x1400, 1), ObjectValue::Unsigned32(0x202)),
            ]
        );
    }

    #[tokio::test]
    async fn pdo_without_mapping_stays_invalid() {
        let engine = ScriptedEngine::new();
        engine.set_remote(node(2), addr(0x1400, 1), 0x180u32);
        let pairing = Mutex::new(PairingRegistry::new());
        run(&engine, &config(2, rpdo_catalog(0x202, false)), &pairing)
            .await
            .unwrap();

        let writes = engine.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], (addr(0x1400, 1), ObjectValue::Unsigned32(0x8000_0180)));
        assert!(writes.iter().all(|(a, _)| a.index != 0x1600));
    }

    #[tokio::test]
    async fn remote_cob_read_failure_is_tagged() {
        let engine = ScriptedEngine::new();
        let pairing = Mutex::new(PairingRegistry::new());
        let err = run(&engine, &config(2, rpdo_catalog(0x202, true)), &pairing)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConfigureError::RemoteRead {
                address: addr(0x1400, 1),
                source: TransportError::Aborted {
                    code: SDO_ABORT_NO_OBJECT
                },
            }
        );
    }

    #[tokio::test]
    async fn shared_rpdo_cob_pairs_nodes() {
        let engine = ScriptedEngine::new();
        engine.set_remote(node(3), addr(0x1400, 1), 0x180u32);
        engine.set_remote(node(4), addr(0x1400, 1), 0x180u32);
        engine.set_remote(node(5), addr(0x1400, 1), 0x180u32);
        let pairing = Mutex::new(PairingRegistry::new());

        run(&engine, &config(4, rpdo_catalog(0x203, true)), &pairing)
            .await
            .unwrap();
        run(&engine, &config(3, rpdo_catalog(0x203, true)), &pairing)
            .await
            .unwrap();
        assert_eq!(pairing.lock().role_of(node(3)), Role::Leader { follower: node(4) });

        let err = run(&engine, &config(5, rpdo_catalog(0x203, true)), &pairing)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigureError::Pairing(_)));
        // Aborted before the PDO was touched.
        assert!(!engine.ops().contains(&Op::Read(node(5), addr(0x1400, 1))));
    }

    #[tokio::test]
    async fn clear_cancelled_transfers_nothing() {
        struct Cancel;
        #[async_trait]
        impl ClearConfiguration for Cancel {
            async fn clear(&self, _: &dyn ProtocolEngine, _: NodeId) -> Result<ClearOutcome, TransportError> {
                Ok(ClearOutcome::Cancelled)
            }
        }

        let engine = ScriptedEngine::new();
        let pairing = Mutex::new(PairingRegistry::new());
        let config = config(2, rpdo_catalog(0x202, true));
        ConfigurationSequencer::new(&engine, &config, &pairing)
            .run_with(Some(&Cancel))
            .await
            .unwrap();
        assert!(engine.ops().is_empty());
    }

    #[tokio::test]
    async fn restore_defaults_then_transfer_then_download() {
        let engine = ScriptedEngine::new();
        let pairing = Mutex::new(PairingRegistry::new());
        let catalog = ParameterCatalog::builder()
            .entry(addr(0x6083, 0), 1000u32)
            .build()
            .unwrap();
        let config = config(2, catalog).with_binary_description(vec![1u8, 2, 3]);
        ConfigurationSequencer::new(&engine, &config, &pairing)
            .run_with(Some(&RestoreDefaults))
            .await
            .unwrap();

        let ops = engine.ops();
        assert_eq!(
            ops,
            vec![
                Op::Write(node(2), addr(0x1011, 1), ObjectValue::Unsigned32(0x6461_6F6C)),
                Op::Write(node(2), addr(0x6083, 0), ObjectValue::Unsigned32(1000)),
                Op::Download(node(2), 3),
            ]
        );
    }

    #[test]
    fn master_table_pairing() {
        let engine = ScriptedEngine::new();
        engine.set_master(addr(0x5C00, 0), 0x0102u32);
        engine.set_master(addr(0x5C01, 0), 0x0103u32);
        engine.set_master(addr(0x1800, 1), 0x0000_0202u32);
        engine.set_master(addr(0x1801, 1), 0x8000_0202u32);
        let pairing = Mutex::new(PairingRegistry::new());

        let outcome = detect_master_table_pairing(&engine, node(3), &pairing).unwrap();
        assert_eq!(outcome, Some(PairingOutcome::Follows(node(2))));
        assert_eq!(pairing.lock().role_of(node(2)), Role::Leader { follower: node(3) });
    }

    #[test]
    fn master_table_without_entry_is_standalone() {
        let engine = ScriptedEngine::new();
        let pairing = Mutex::new(PairingRegistry::new());
        assert_eq!(detect_master_table_pairing(&engine, node(3), &pairing), Ok(None));
    }
}
