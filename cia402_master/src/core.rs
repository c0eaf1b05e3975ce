//! Master core: configuration loading, wiring and network start-up.
//!
//! `MasterCore` turns a [`MasterConfig`] into a running network: one catalog
//! and one axis executor per node, a [`DriverRegistry`] fed by the
//! engine-event dispatch loop, and a [`SimulatedBus`] standing in for the
//! CANopen stack.

use crate::error::{MasterError, RegistryError};
use crate::registry::{DriverRegistry, RegistryCallbacks};
use crate::sim::{SimTiming, SimulatedBus};
use cia402_common::config::{CommunicationScheme, ConfigLoader, MasterConfig};
use cia402_common::engine::ProtocolEngine;
use cia402_common::types::{NodeId, ObjectAddress, ObjectValue};
use cia402_drive::axis::AxisBuilder;
use cia402_drive::command::{HomingMethod, HomingRequest, MoveMode, MoveRequest};
use cia402_drive::config::DriverConfig;
use cia402_drive::error::AxisError;
use cia402_drive::pairing::Role;
use cia402_drive::setter::CommunicationConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Time allowed for one demo motion to return to IDLE.
const DEMO_MOTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Running master: registry, bus and dispatch loop.
pub struct MasterCore {
    config: MasterConfig,
    bus: Arc<SimulatedBus>,
    registry: Arc<DriverRegistry>,
    ready: Arc<Notify>,
    dispatch: JoinHandle<()>,
}

impl MasterCore {
    /// Load `path`, resolve node paths against its directory and validate.
    pub fn load_config(path: &Path) -> Result<MasterConfig, MasterError> {
        info!("Loading configuration from {:?}", path);
        let mut config = MasterConfig::load(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(base);
        config.validate()?;
        info!(
            "Loaded config: {} nodes, communication {:?}",
            config.nodes.len(),
            config.communication
        );
        Ok(config)
    }

    /// Build catalogs and axes, then start the dispatch loop.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: MasterConfig) -> Result<Self, MasterError> {
        Self::with_timing(config, SimTiming::default())
    }

    pub fn with_timing(config: MasterConfig, timing: SimTiming) -> Result<Self, MasterError> {
        config.validate()?;
        let timing = SimTiming {
            sdo_timeout: config.sdo_timeout(),
            ..timing
        };

        let mut drivers = Vec::with_capacity(config.nodes.len());
        for node in &config.nodes {
            let driver = DriverConfig::from_node_config(node).map_err(|source| MasterError::Catalog {
                node: node.id,
                source,
            })?;
            info!(
                "Node {}: catalog '{}' with {} parameters",
                node.id,
                driver.catalog.device().name,
                driver.catalog.explicit_parameters().len()
            );
            drivers.push(driver);
        }

        let (bus, events) = match config.communication {
            CommunicationScheme::MasterObject => {
                SimulatedBus::with_master_objects(config.master_objects, timing)
            }
            CommunicationScheme::Sdo | CommunicationScheme::MappedTpdo => {
                SimulatedBus::with_timing(timing)
            }
        };
        let engine: Arc<dyn ProtocolEngine> = bus.clone();

        let ready = Arc::new(Notify::new());
        let notify = Arc::clone(&ready);
        let callbacks = RegistryCallbacks {
            system_ready: Some(Arc::new(move || notify.notify_one())),
            ..RegistryCallbacks::default()
        };
        let mut registry = DriverRegistry::new(Arc::clone(&engine)).with_callbacks(callbacks);

        for driver in drivers {
            let node = driver.node;
            bus.add_drive(node);
            bus.seed(node, catalog_defaults(&driver));

            let communication = CommunicationConfig::for_scheme(
                config.communication,
                Arc::clone(&engine),
                node,
                &config.master_objects,
            );
            let handle = AxisBuilder::new(driver, Arc::clone(&engine))
                .pairing(registry.pairing())
                .communication(communication)
                .on_error(Arc::new(move |code: u16, message: String| {
                    error!("Node {}: error 0x{:04x}: {}", node, code, message);
                }))
                .fault_reset_delay(config.fault_reset_delay())
                .spawn();
            registry.register(handle)?;
        }

        let registry = Arc::new(registry);
        let dispatch = tokio::spawn(Arc::clone(&registry).run(events));

        Ok(Self {
            config,
            bus,
            registry,
            ready,
            dispatch,
        })
    }

    #[inline]
    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    #[inline]
    pub fn bus(&self) -> &Arc<SimulatedBus> {
        &self.bus
    }

    /// Reset the network and wait until every node booted.
    ///
    /// Pairs detected during configuration are mechanically coupled on the
    /// simulated bus afterwards.
    pub async fn start(&self, timeout: Duration) -> Result<(), MasterError> {
        self.registry.reset();
        tokio::time::timeout(timeout, self.ready.notified())
            .await
            .map_err(|_| MasterError::BootTimeout(timeout.as_millis() as u64))?;

        for (leader, follower) in self.registry.pairing().lock().pairs() {
            info!("Coupling follower {} to leader {}", follower, leader);
            self.bus.couple(leader, follower);
        }
        info!("System ready ({} nodes)", self.registry.len());
        Ok(())
    }

    /// Home every standalone and leader axis, then move it to `target`.
    pub async fn run_demo(&self, target: i32) -> Result<(), MasterError> {
        let pairing = self.registry.pairing();
        for node in self.registry.nodes() {
            if matches!(pairing.lock().role_of(node), Role::Follower { .. }) {
                continue;
            }
            self.demo_axis(node, target).await?;
        }
        Ok(())
    }

    async fn demo_axis(&self, node: NodeId, target: i32) -> Result<(), MasterError> {
        let handle = self.registry.require(node)?;
        let axis_error = |source: AxisError| RegistryError::Axis { node, source };

        info!("Node {}: demo homing", node);
        let (done, idle) = oneshot::channel();
        handle
            .home(demo_homing(), move || {
                let _ = done.send(());
            })
            .map_err(axis_error)?;
        self.wait_idle(node, idle).await;

        info!("Node {}: demo move to {}", node, target);
        let (done, idle) = oneshot::channel();
        handle
            .move_to(demo_move(target), move || {
                let _ = done.send(());
            })
            .map_err(axis_error)?;
        self.wait_idle(node, idle).await;

        info!(
            "Node {}: demo finished at {:?}",
            node,
            self.bus.drive_position(node)
        );
        Ok(())
    }

    async fn wait_idle(&self, node: NodeId, idle: oneshot::Receiver<()>) {
        match tokio::time::timeout(DEMO_MOTION_TIMEOUT, idle).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("Node {}: motion dropped before completion", node),
            Err(_) => warn!("Node {}: motion did not finish in time", node),
        }
    }

    /// Stop the dispatch loop.
    pub fn shutdown(self) {
        self.dispatch.abort();
        info!("Master stopped");
    }
}

/// Factory values a fresh drive holds: every described value of its catalog.
fn catalog_defaults(driver: &DriverConfig) -> Vec<(ObjectAddress, ObjectValue)> {
    driver
        .catalog
        .objects()
        .iter()
        .flat_map(|object| {
            object.subs.iter().filter_map(move |sub| {
                sub.value
                    .clone()
                    .map(|value| (ObjectAddress::new(object.index, sub.sub_index), value))
            })
        })
        .collect()
}

fn demo_homing() -> HomingRequest {
    HomingRequest {
        method: HomingMethod::IndexPulsePositive,
        search_speed: 1_000,
        release_speed: 100,
        acceleration: 10_000,
        offset: 0,
    }
}

fn demo_move(target: i32) -> MoveRequest {
    MoveRequest {
        mode: MoveMode::Absolute,
        position: target,
        velocity: 5_000,
        acceleration: 20_000,
        deceleration: 20_000,
    }
}
