//! # Mirror Instances
//!
//! Value-free projections of tree nodes. An instance carries descriptive
//! fields and child-reference identifiers; values (sensor readings,
//! parameter values, control state, names) are read through the node link
//! whenever a property is asked for.

use hwmirror_core::{HardwareType, Identifier, SensorType};
use serde_json::{json, Value};

use crate::error::{MirrorError, MirrorResult};
use crate::node::{
    ControlLink, ControlSnapshot, HardwareLink, HardwareSnapshot, ParameterLink, ParameterSnapshot,
    SensorLink, SensorSnapshot,
};
use crate::schema::{EntityKind, EntitySchema};

/// Published projection of one node.
#[derive(Debug, Clone)]
pub struct MirrorInstance {
    pub identifier: Identifier,
    pub parent: Option<Identifier>,
    pub body: InstanceBody,
}

/// Class-specific part of a [`MirrorInstance`].
#[derive(Debug, Clone)]
pub enum InstanceBody {
    Hardware {
        hardware_type: HardwareType,
        sub_hardware: Vec<Identifier>,
        sensors: Vec<Identifier>,
        link: HardwareLink,
    },
    Sensor {
        index: u32,
        sensor_type: SensorType,
        default_hidden: bool,
        parameters: Vec<Identifier>,
        control: Option<Identifier>,
        link: SensorLink,
    },
    Parameter {
        name: String,
        description: String,
        link: ParameterLink,
    },
    Control {
        link: ControlLink,
    },
}

impl MirrorInstance {
    /// Hardware projection with empty child lists.
    pub fn hardware(snapshot: &HardwareSnapshot) -> Self {
        MirrorInstance {
            identifier: snapshot.identifier.clone(),
            parent: snapshot.parent.clone(),
            body: InstanceBody::Hardware {
                hardware_type: snapshot.hardware_type,
                sub_hardware: Vec::new(),
                sensors: Vec::new(),
                link: snapshot.link.clone(),
            },
        }
    }

    /// Sensor projection with empty child lists.
    pub fn sensor(snapshot: &SensorSnapshot) -> Self {
        MirrorInstance {
            identifier: snapshot.identifier.clone(),
            parent: Some(snapshot.hardware.clone()),
            body: InstanceBody::Sensor {
                index: snapshot.index,
                sensor_type: snapshot.sensor_type,
                default_hidden: snapshot.default_hidden,
                parameters: Vec::new(),
                control: None,
                link: snapshot.link.clone(),
            },
        }
    }

    pub fn parameter(snapshot: &ParameterSnapshot) -> Self {
        MirrorInstance {
            identifier: snapshot.identifier.clone(),
            parent: Some(snapshot.sensor.clone()),
            body: InstanceBody::Parameter {
                name: snapshot.name.clone(),
                description: snapshot.description.clone(),
                link: snapshot.link.clone(),
            },
        }
    }

    pub fn control(snapshot: &ControlSnapshot) -> Self {
        MirrorInstance {
            identifier: snapshot.identifier.clone(),
            parent: Some(snapshot.sensor.clone()),
            body: InstanceBody::Control {
                link: snapshot.link.clone(),
            },
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self.body {
            InstanceBody::Hardware { .. } => EntityKind::Hardware,
            InstanceBody::Sensor { .. } => EntityKind::Sensor,
            InstanceBody::Parameter { .. } => EntityKind::Parameter,
            InstanceBody::Control { .. } => EntityKind::Control,
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.kind().schema()
    }

    // =========================================================================
    // Child References
    // =========================================================================

    /// Child identifiers in revocation order: sensors before sub-hardware,
    /// parameters before the control.
    pub fn children(&self) -> Vec<Identifier> {
        match &self.body {
            InstanceBody::Hardware {
                sub_hardware,
                sensors,
                ..
            } => sensors.iter().chain(sub_hardware).cloned().collect(),
            InstanceBody::Sensor {
                parameters,
                control,
                ..
            } => parameters.iter().chain(control).cloned().collect(),
            InstanceBody::Parameter { .. } | InstanceBody::Control { .. } => Vec::new(),
        }
    }

    /// Links a child of `kind` into the matching reference list. Returns
    /// false if this class cannot own that kind or it is already linked.
    pub fn add_child(&mut self, kind: EntityKind, child: Identifier) -> bool {
        let list = match (&mut self.body, kind) {
            (InstanceBody::Hardware { sub_hardware, .. }, EntityKind::Hardware) => sub_hardware,
            (InstanceBody::Hardware { sensors, .. }, EntityKind::Sensor) => sensors,
            (InstanceBody::Sensor { parameters, .. }, EntityKind::Parameter) => parameters,
            (InstanceBody::Sensor { control, .. }, EntityKind::Control) => {
                if control.as_ref() == Some(&child) {
                    return false;
                }
                *control = Some(child);
                return true;
            }
            _ => return false,
        };
        if list.contains(&child) {
            return false;
        }
        list.push(child);
        true
    }

    /// Unlinks `child` from whichever reference list holds it.
    pub fn remove_child(&mut self, child: &Identifier) -> bool {
        match &mut self.body {
            InstanceBody::Hardware {
                sub_hardware,
                sensors,
                ..
            } => {
                let before = sub_hardware.len() + sensors.len();
                sub_hardware.retain(|id| id != child);
                sensors.retain(|id| id != child);
                before != sub_hardware.len() + sensors.len()
            }
            InstanceBody::Sensor {
                parameters,
                control,
                ..
            } => {
                let before = parameters.len();
                parameters.retain(|id| id != child);
                if control.as_ref() == Some(child) {
                    *control = None;
                    return true;
                }
                before != parameters.len()
            }
            InstanceBody::Parameter { .. } | InstanceBody::Control { .. } => false,
        }
    }

    // =========================================================================
    // Properties and Actions
    // =========================================================================

    /// Reads a schema field by name. `None` if this class has no such field.
    pub fn property(&self, name: &str) -> Option<Value> {
        self.schema().field(name)?;

        let value = match (name, &self.body) {
            ("Identifier", _) => json!(self.identifier),
            ("Parent", _) => json!(self.parent.as_ref().map_or("", |p| p.as_str())),

            ("Name", InstanceBody::Hardware { link, .. }) => json!(link.name()),
            ("HardwareType", InstanceBody::Hardware { hardware_type, .. }) => {
                json!(hardware_type.to_string())
            }
            ("SubHardware", InstanceBody::Hardware { sub_hardware, .. }) => json!(sub_hardware),
            ("Sensors", InstanceBody::Hardware { sensors, .. }) => json!(sensors),

            ("Name", InstanceBody::Sensor { link, .. }) => json!(link.name()),
            ("Index", InstanceBody::Sensor { index, .. }) => json!(index),
            ("SensorType", InstanceBody::Sensor { sensor_type, .. }) => {
                json!(sensor_type.to_string())
            }
            ("Value", InstanceBody::Sensor { link, .. }) => json!(link.value()),
            ("Min", InstanceBody::Sensor { link, .. }) => json!(link.min()),
            ("Max", InstanceBody::Sensor { link, .. }) => json!(link.max()),
            ("IsDefaultHidden", InstanceBody::Sensor { default_hidden, .. }) => {
                json!(default_hidden)
            }
            ("Parameters", InstanceBody::Sensor { parameters, .. }) => json!(parameters),
            ("Control", InstanceBody::Sensor { control, .. }) => json!(control),

            ("Name", InstanceBody::Parameter { name, .. }) => json!(name),
            ("Description", InstanceBody::Parameter { description, .. }) => json!(description),
            ("Value", InstanceBody::Parameter { link, .. }) => json!(link.value()),
            ("DefaultValue", InstanceBody::Parameter { link, .. }) => json!(link.default_value()),
            ("IsDefault", InstanceBody::Parameter { link, .. }) => json!(link.is_default()),

            ("ControlMode", InstanceBody::Control { link }) => json!(link.mode().as_i32()),
            ("SoftwareValue", InstanceBody::Control { link }) => json!(link.software_value()),
            ("MinSoftwareValue", InstanceBody::Control { link }) => {
                json!(link.min_software_value())
            }
            ("MaxSoftwareValue", InstanceBody::Control { link }) => {
                json!(link.max_software_value())
            }

            _ => return None,
        };
        Some(value)
    }

    /// Invokes a schema action by name with float arguments.
    pub fn invoke(&self, action: &str, args: &[f32]) -> MirrorResult<Option<Value>> {
        let spec = self
            .schema()
            .action(action)
            .ok_or_else(|| MirrorError::UnknownAction {
                class: self.kind(),
                action: action.to_string(),
            })?;
        if spec.arguments.len() != args.len() {
            return Err(MirrorError::InvalidArguments {
                action: action.to_string(),
                expected: spec.arguments.len(),
                actual: args.len(),
            });
        }

        match (action, &self.body) {
            ("GetReport", InstanceBody::Hardware { link, .. }) => Ok(Some(json!(link.report()))),
            ("SetValue", InstanceBody::Parameter { link, .. }) => {
                link.set_value(args[0]);
                Ok(None)
            }
            ("SetDefault", InstanceBody::Parameter { link, .. }) => {
                link.set_default();
                Ok(None)
            }
            ("SetDefault", InstanceBody::Control { link }) => {
                link.set_default();
                Ok(None)
            }
            ("SetSoftware", InstanceBody::Control { link }) => {
                link.set_software(args[0]);
                Ok(None)
            }
            _ => Err(MirrorError::UnknownAction {
                class: self.kind(),
                action: action.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{HardwareDescription, SensingEngine, SensorDescription, StaticEngine};
    use crate::node::Hardware;
    use hwmirror_core::{ElementState, Settings};
    use std::sync::Arc;

    fn snapshot() -> HardwareSnapshot {
        let gpu = Identifier::parse("/nvidiagpu/0").unwrap();
        let description = HardwareDescription::new(gpu.clone(), "RTX 4070", HardwareType::GpuNvidia)
            .with_sensor(
                SensorDescription::new(&gpu, "GPU Fan", SensorType::Control, 0)
                    .with_parameter("Offset", "Added to the reading", 0.0)
                    .with_control(0.0, 100.0),
            );
        let engine: Arc<dyn SensingEngine> = Arc::new(StaticEngine::new());
        Hardware::new(&description, None, ElementState::Visible, &Settings::in_memory(), &engine)
            .snapshot()
    }

    fn all_instances(hw: &HardwareSnapshot) -> Vec<MirrorInstance> {
        let sensor = &hw.sensors[0];
        vec![
            MirrorInstance::hardware(hw),
            MirrorInstance::sensor(sensor),
            MirrorInstance::parameter(&sensor.parameters[0]),
            MirrorInstance::control(sensor.control.as_ref().unwrap()),
        ]
    }

    #[test]
    fn test_every_schema_field_resolves() {
        for instance in all_instances(&snapshot()) {
            for field in instance.schema().fields {
                assert!(
                    instance.property(field.name).is_some(),
                    "{}.{} missing",
                    instance.kind(),
                    field.name
                );
            }
            assert!(instance.property("NoSuchField").is_none());
        }
    }

    #[test]
    fn test_live_values_read_through_link() {
        let hw = snapshot();
        let sensor = MirrorInstance::sensor(&hw.sensors[0]);
        assert_eq!(sensor.property("Value"), Some(Value::Null));

        hw.sensors[0].link.set_value(Some(42.0), chrono::Utc::now());
        assert_eq!(sensor.property("Value"), Some(json!(42.0)));
        assert_eq!(sensor.property("Parent"), Some(json!("/nvidiagpu/0")));
    }

    #[test]
    fn test_child_links() {
        let hw = snapshot();
        let mut instance = MirrorInstance::hardware(&hw);
        let sensor_id = hw.sensors[0].identifier.clone();

        assert!(instance.add_child(EntityKind::Sensor, sensor_id.clone()));
        assert!(!instance.add_child(EntityKind::Sensor, sensor_id.clone()));
        assert!(!instance.add_child(EntityKind::Parameter, sensor_id.clone()));
        assert_eq!(instance.property("Sensors"), Some(json!(["/nvidiagpu/0/control/0"])));

        assert!(instance.remove_child(&sensor_id));
        assert!(instance.children().is_empty());
    }

    #[test]
    fn test_actions_validate_against_schema() {
        let hw = snapshot();
        let [_, _, parameter, control]: [MirrorInstance; 4] =
            all_instances(&hw).try_into().unwrap();

        parameter.invoke("SetValue", &[3.0]).unwrap();
        assert_eq!(parameter.property("IsDefault"), Some(json!(false)));
        assert!(matches!(
            parameter.invoke("SetValue", &[]),
            Err(MirrorError::InvalidArguments { expected: 1, actual: 0, .. })
        ));
        assert!(matches!(
            control.invoke("GetReport", &[]),
            Err(MirrorError::UnknownAction { class: EntityKind::Control, .. })
        ));

        control.invoke("SetSoftware", &[55.0]).unwrap();
        assert_eq!(control.property("ControlMode"), Some(json!(2)));
    }
}
