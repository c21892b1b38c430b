//! # Instance Source
//!
//! What a remote mirror sees of the published namespace: records fetched by
//! identifier, named actions and the structural event feed. The remote side
//! never touches tree nodes.

use hwmirror_core::{ControlMode, HardwareType, Identifier, SensorType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MirrorResult;
use crate::feed::Subscription;
use crate::schema::EntityKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareRecord {
    pub identifier: Identifier,
    pub parent: Option<Identifier>,
    pub name: String,
    pub hardware_type: HardwareType,
    pub sub_hardware: Vec<Identifier>,
    pub sensors: Vec<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub identifier: Identifier,
    pub parent: Identifier,
    pub name: String,
    pub index: u32,
    pub sensor_type: SensorType,
    pub value: Option<f32>,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub default_hidden: bool,
    pub parameters: Vec<Identifier>,
    pub control: Option<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub identifier: Identifier,
    pub parent: Identifier,
    pub name: String,
    pub description: String,
    pub value: f32,
    pub default_value: f32,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub identifier: Identifier,
    pub parent: Identifier,
    pub mode: ControlMode,
    pub software_value: f32,
    pub min_software_value: f32,
    pub max_software_value: f32,
}

/// Read/act access to published instances.
///
/// Lookups of revoked identifiers fail with
/// [`MirrorError::InstanceGone`](crate::MirrorError::InstanceGone).
pub trait InstanceSource: Send + Sync + 'static {
    /// Every top-level hardware currently published.
    fn enumerate_hardware(&self) -> Vec<HardwareRecord>;

    fn hardware(&self, identifier: &Identifier) -> MirrorResult<HardwareRecord>;

    fn sensor(&self, identifier: &Identifier) -> MirrorResult<SensorRecord>;

    fn parameter(&self, identifier: &Identifier) -> MirrorResult<ParameterRecord>;

    fn control(&self, identifier: &Identifier) -> MirrorResult<ControlRecord>;

    /// Current value of a sensor.
    fn sensor_value(&self, identifier: &Identifier) -> MirrorResult<Option<f32>> {
        self.sensor(identifier).map(|record| record.value)
    }

    /// Invokes a named action with float arguments.
    fn invoke(&self, identifier: &Identifier, action: &str, args: &[f32]) -> MirrorResult<Option<Value>>;

    /// Subscribes to structural events of the given classes.
    fn subscribe(&self, classes: &[EntityKind]) -> Subscription;
}
