//! Setter strategies: how motion commands reach the drive.
//!
//! The motion state machine only calls [`SetterStrategy::set`]; whether the
//! value travels as an SDO, through a master-side mirror object or a
//! reverse-mapped TPDO is decided when the [`CommunicationConfig`] is built.
//!
//! | Scheme        | Transport                          | Leader/follower |
//! |---------------|------------------------------------|-----------------|
//! | SDO           | point-to-point write               | no              |
//! | Master object | master dictionary + TPDO event     | yes             |
//! | Mapped TPDO   | reverse-mapped drive object + event| yes             |

use async_trait::async_trait;
use cia402_common::config::{CommunicationScheme, MasterObjectLayout};
use cia402_common::consts::{
    CONTROL_WORD, OPERATION_MODE, PROFILE_ACCELERATION, PROFILE_DECELERATION, PROFILE_VELOCITY,
    TARGET_POSITION,
};
use cia402_common::engine::{ProtocolEngine, write_scalar};
use cia402_common::error::TransportError;
use cia402_common::types::{NodeId, ObjectAddress, Scalar};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Delivers one value of type `T` to a drive.
#[async_trait]
pub trait SetterStrategy<T: Scalar>: Send + Sync {
    async fn set(&self, value: T) -> Result<(), TransportError>;
}

// ─── SDO ────────────────────────────────────────────────────────────

/// Direct point-to-point write.
pub struct SdoSetter<T> {
    engine: Arc<dyn ProtocolEngine>,
    node: NodeId,
    address: ObjectAddress,
    _value: PhantomData<fn(T)>,
}

impl<T> SdoSetter<T> {
    pub fn new(engine: Arc<dyn ProtocolEngine>, node: NodeId, address: ObjectAddress) -> Self {
        Self {
            engine,
            node,
            address,
            _value: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Scalar> SetterStrategy<T> for SdoSetter<T> {
    async fn set(&self, value: T) -> Result<(), TransportError> {
        write_scalar(self.engine.as_ref(), self.node, self.address, value).await
    }
}

// ─── Master Object ──────────────────────────────────────────────────

/// Write a master-side mirror object, then trigger its TPDO group.
pub struct MasterObjectSetter<T> {
    engine: Arc<dyn ProtocolEngine>,
    address: ObjectAddress,
    tpdo_event: Option<u16>,
    _value: PhantomData<fn(T)>,
}

impl<T> MasterObjectSetter<T> {
    pub fn new(engine: Arc<dyn ProtocolEngine>, address: ObjectAddress, tpdo_event: Option<u16>) -> Self {
        Self {
            engine,
            address,
            tpdo_event,
            _value: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Scalar> SetterStrategy<T> for MasterObjectSetter<T> {
    async fn set(&self, value: T) -> Result<(), TransportError> {
        self.engine.write_master(self.address, value.into_value())?;
        if let Some(group) = self.tpdo_event {
            self.engine.tpdo_event(group);
        }
        Ok(())
    }
}

// ─── Mapped TPDO ────────────────────────────────────────────────────

/// Write a reverse-mapped TPDO object of the drive.
pub struct MappedTpdoSetter<T> {
    engine: Arc<dyn ProtocolEngine>,
    node: NodeId,
    address: ObjectAddress,
    send_event: bool,
    _value: PhantomData<fn(T)>,
}

impl<T> MappedTpdoSetter<T> {
    pub fn new(
        engine: Arc<dyn ProtocolEngine>,
        node: NodeId,
        address: ObjectAddress,
        send_event: bool,
    ) -> Self {
        Self {
            engine,
            node,
            address,
            send_event,
            _value: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Scalar> SetterStrategy<T> for MappedTpdoSetter<T> {
    async fn set(&self, value: T) -> Result<(), TransportError> {
        self.engine
            .write_tpdo_mapped(self.node, self.address, value.into_value(), self.send_event)
    }
}

// ─── Communication Config ───────────────────────────────────────────

/// `(master object address, node) -> is that node's status word`.
pub type StatusWordPredicate = Arc<dyn Fn(ObjectAddress, NodeId) -> bool + Send + Sync>;

/// The six setters used by the motion state machine.
#[derive(Clone)]
pub struct CommunicationConfig {
    pub operation_mode: Arc<dyn SetterStrategy<i8>>,
    pub control_word: Arc<dyn SetterStrategy<u16>>,
    pub position: Arc<dyn SetterStrategy<i32>>,
    pub velocity: Arc<dyn SetterStrategy<u32>>,
    pub acceleration: Arc<dyn SetterStrategy<u32>>,
    pub deceleration: Arc<dyn SetterStrategy<u32>>,
    /// Recognizes status words published into the master dictionary.
    pub is_status_word: Option<StatusWordPredicate>,
}

impl CommunicationConfig {
    pub fn for_scheme(
        scheme: CommunicationScheme,
        engine: Arc<dyn ProtocolEngine>,
        node: NodeId,
        layout: &MasterObjectLayout,
    ) -> Self {
        match scheme {
            CommunicationScheme::Sdo => Self::sdo(engine, node),
            CommunicationScheme::MappedTpdo => Self::mapped_tpdo(engine, node),
            CommunicationScheme::MasterObject => Self::master_objects(engine, node, layout),
        }
    }

    pub fn sdo(engine: Arc<dyn ProtocolEngine>, node: NodeId) -> Self {
        fn sdo<T: Scalar>(
            engine: &Arc<dyn ProtocolEngine>,
            node: NodeId,
            address: ObjectAddress,
        ) -> Arc<dyn SetterStrategy<T>> {
            Arc::new(SdoSetter::<T>::new(Arc::clone(engine), node, address))
        }

        Self {
            operation_mode: sdo(&engine, node, OPERATION_MODE),
            control_word: sdo(&engine, node, CONTROL_WORD),
            position: sdo(&engine, node, TARGET_POSITION),
            velocity: sdo(&engine, node, PROFILE_VELOCITY),
            acceleration: sdo(&engine, node, PROFILE_ACCELERATION),
            deceleration: sdo(&engine, node, PROFILE_DECELERATION),
            is_status_word: None,
        }
    }

    /// Reverse-mapped TPDO objects; events fire for the control word,
    /// velocity and deceleration, which close their PDOs.
    pub fn mapped_tpdo(engine: Arc<dyn ProtocolEngine>, node: NodeId) -> Self {
        fn mapped<T: Scalar>(
            engine: &Arc<dyn ProtocolEngine>,
            node: NodeId,
            address: ObjectAddress,
            send_event: bool,
        ) -> Arc<dyn SetterStrategy<T>> {
            Arc::new(MappedTpdoSetter::<T>::new(
                Arc::clone(engine),
                node,
                address,
                send_event,
            ))
        }

        Self {
            operation_mode: mapped(&engine, node, OPERATION_MODE, false),
            control_word: mapped(&engine, node, CONTROL_WORD, true),
            position: mapped(&engine, node, TARGET_POSITION, false),
            velocity: mapped(&engine, node, PROFILE_VELOCITY, true),
            acceleration: mapped(&engine, node, PROFILE_ACCELERATION, false),
            deceleration: mapped(&engine, node, PROFILE_DECELERATION, true),
            is_status_word: None,
        }
    }

    /// Master-side mirror objects with sub-index = node id. The PDO group
    /// of a node is the layout group plus its id.
    pub fn master_objects(
        engine: Arc<dyn ProtocolEngine>,
        node: NodeId,
        layout: &MasterObjectLayout,
    ) -> Self {
        fn mirror<T: Scalar>(
            engine: &Arc<dyn ProtocolEngine>,
            node: NodeId,
            index: u16,
            group: Option<u16>,
        ) -> Arc<dyn SetterStrategy<T>> {
            Arc::new(MasterObjectSetter::<T>::new(
                Arc::clone(engine),
                MasterObjectLayout::address(index, node),
                group.map(|g| g + u16::from(node.get())),
            ))
        }

        let status_index = layout.status_word;
        Self {
            operation_mode: mirror(&engine, node, layout.operation_mode, None),
            control_word: mirror(&engine, node, layout.control_word, Some(layout.control_pdo_group)),
            position: mirror(&engine, node, layout.position, None),
            velocity: mirror(
                &engine,
                node,
                layout.velocity,
                Some(layout.position_velocity_pdo_group),
            ),
            acceleration: mirror(&engine, node, layout.acceleration, None),
            deceleration: mirror(
                &engine,
                node,
                layout.deceleration,
                Some(layout.deceleration_pdo_group),
            ),
            is_status_word: Some(Arc::new(move |address: ObjectAddress, node: NodeId| {
                address.index == status_index && address.sub_index == node.get()
            })),
        }
    }

    /// Whether `address` carries `node`'s status word.
    #[inline]
    pub fn is_status_word(&self, address: ObjectAddress, node: NodeId) -> bool {
        self.is_status_word
            .as_ref()
            .is_some_and(|predicate| predicate(address, node))
    }
}

impl fmt::Debug for CommunicationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunicationConfig")
            .field("is_status_word", &self.is_status_word.is_some())
            .finish_non_exhaustive()
    }
}
