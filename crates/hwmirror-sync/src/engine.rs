//! # Sensing Engine
//!
//! The boundary between the tree and whatever actually reads hardware.
//!
//! The tree never talks to drivers. It asks a [`SensingEngine`] to describe
//! hardware and sensors (structure) and to read values (data). Everything
//! here is synchronous: reads are expected to be cheap cached lookups, and
//! the tree calls them from its own task.
//!
//! [`StaticEngine`] is an in-memory engine whose structure and values are
//! set by hand. Tests and demos drive the whole pipeline with it.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use hwmirror_core::{ControlMode, HardwareType, Identifier, SensorType};

// =============================================================================
// Descriptions
// =============================================================================

/// Structure of one hardware node as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareDescription {
    pub identifier: Identifier,
    pub name: String,
    pub hardware_type: HardwareType,
    pub sub_hardware: Vec<HardwareDescription>,
    pub sensors: Vec<SensorDescription>,
}

impl HardwareDescription {
    pub fn new(identifier: Identifier, name: impl Into<String>, hardware_type: HardwareType) -> Self {
        HardwareDescription {
            identifier,
            name: name.into(),
            hardware_type,
            sub_hardware: Vec::new(),
            sensors: Vec::new(),
        }
    }

    pub fn with_sensor(mut self, sensor: SensorDescription) -> Self {
        self.sensors.push(sensor);
        self
    }

    pub fn with_sub_hardware(mut self, hardware: HardwareDescription) -> Self {
        self.sub_hardware.push(hardware);
        self
    }

    /// Finds this node or a descendant by identifier.
    pub fn find(&self, identifier: &Identifier) -> Option<&HardwareDescription> {
        if &self.identifier == identifier {
            return Some(self);
        }
        self.sub_hardware.iter().find_map(|h| h.find(identifier))
    }

    /// Finds a sensor on this node or a descendant.
    pub fn find_sensor(&self, identifier: &Identifier) -> Option<&SensorDescription> {
        self.sensors
            .iter()
            .find(|s| &s.identifier == identifier)
            .or_else(|| self.sub_hardware.iter().find_map(|h| h.find_sensor(identifier)))
    }

    /// Mutable form of [`find`](Self::find).
    fn find_mut(&mut self, identifier: &Identifier) -> Option<&mut HardwareDescription> {
        if &self.identifier == identifier {
            return Some(self);
        }
        self.sub_hardware.iter_mut().find_map(|h| h.find_mut(identifier))
    }
}

/// Structure of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescription {
    pub identifier: Identifier,
    pub name: String,
    pub sensor_type: SensorType,
    pub index: u32,
    pub default_hidden: bool,
    pub parameters: Vec<ParameterDescription>,
    pub control: Option<ControlDescription>,
}

impl SensorDescription {
    /// Describes sensor `index` of `sensor_type` on `hardware`.
    pub fn new(
        hardware: &Identifier,
        name: impl Into<String>,
        sensor_type: SensorType,
        index: u32,
    ) -> Self {
        SensorDescription {
            identifier: Identifier::for_sensor(hardware, sensor_type, index),
            name: name.into(),
            sensor_type,
            index,
            default_hidden: false,
            parameters: Vec::new(),
            control: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.default_hidden = true;
        self
    }

    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        default_value: f32,
    ) -> Self {
        self.parameters.push(ParameterDescription {
            name: name.into(),
            description: description.into(),
            default_value,
        });
        self
    }

    pub fn with_control(mut self, min_software_value: f32, max_software_value: f32) -> Self {
        self.control = Some(ControlDescription {
            min_software_value,
            max_software_value,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescription {
    pub name: String,
    pub description: String,
    pub default_value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlDescription {
    pub min_software_value: f32,
    pub max_software_value: f32,
}

// =============================================================================
// Engine Contract
// =============================================================================

/// Source of hardware structure and readings.
pub trait SensingEngine: Send + Sync {
    /// Top-level hardware currently present.
    fn hardware(&self) -> Vec<HardwareDescription>;

    /// Describes one top-level or nested hardware node.
    fn describe_hardware(&self, identifier: &Identifier) -> Option<HardwareDescription> {
        self.hardware()
            .iter()
            .find_map(|h| h.find(identifier).cloned())
    }

    /// Describes one sensor anywhere in the hardware list.
    fn describe_sensor(&self, identifier: &Identifier) -> Option<SensorDescription> {
        self.hardware()
            .iter()
            .find_map(|h| h.find_sensor(identifier).cloned())
    }

    /// Current value of a sensor. `None` means "no reading".
    fn read(&self, sensor: &Identifier) -> Option<f32>;

    /// Applies a control mode to the device.
    fn apply_control(&self, _control: &Identifier, _mode: ControlMode, _value: f32) {}

    /// Free-form diagnostic text for one hardware node.
    fn report(&self, _hardware: &Identifier) -> Option<String> {
        None
    }
}

// =============================================================================
// Static Engine
// =============================================================================

/// Hand-driven in-memory engine.
#[derive(Debug, Default)]
pub struct StaticEngine {
    hardware: RwLock<Vec<HardwareDescription>>,
    values: RwLock<HashMap<Identifier, f32>>,
    applied: RwLock<Vec<(Identifier, ControlMode, f32)>>,
}

impl StaticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a top-level hardware node.
    pub fn insert_hardware(&self, hardware: HardwareDescription) {
        let mut list = self.hardware.write().unwrap_or_else(PoisonError::into_inner);
        list.retain(|h| h.identifier != hardware.identifier);
        list.push(hardware);
    }

    pub fn remove_hardware(&self, identifier: &Identifier) {
        self.hardware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|h| &h.identifier != identifier);
    }

    /// Appends a sensor to a (possibly nested) hardware node. Returns false
    /// if the hardware is unknown.
    pub fn insert_sensor(&self, hardware: &Identifier, sensor: SensorDescription) -> bool {
        let mut list = self.hardware.write().unwrap_or_else(PoisonError::into_inner);
        match list.iter_mut().find_map(|h| h.find_mut(hardware)) {
            Some(node) => {
                node.sensors.retain(|s| s.identifier != sensor.identifier);
                node.sensors.push(sensor);
                true
            }
            None => false,
        }
    }

    pub fn remove_sensor(&self, hardware: &Identifier, sensor: &Identifier) {
        let mut list = self.hardware.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(node) = list.iter_mut().find_map(|h| h.find_mut(hardware)) {
            node.sensors.retain(|s| &s.identifier != sensor);
        }
    }

    pub fn set_value(&self, sensor: &Identifier, value: f32) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sensor.clone(), value);
    }

    pub fn clear_value(&self, sensor: &Identifier) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sensor);
    }

    /// Every control application seen so far, oldest first.
    pub fn applied_controls(&self) -> Vec<(Identifier, ControlMode, f32)> {
        self.applied
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SensingEngine for StaticEngine {
    fn hardware(&self) -> Vec<HardwareDescription> {
        self.hardware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read(&self, sensor: &Identifier) -> Option<f32> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sensor)
            .copied()
    }

    fn apply_control(&self, control: &Identifier, mode: ControlMode, value: f32) {
        self.applied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((control.clone(), mode, value));
    }

    fn report(&self, hardware: &Identifier) -> Option<String> {
        self.describe_hardware(hardware)
            .map(|h| format!("{} sensor(s) registered\n", h.sensors.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    #[test]
    fn test_sensor_identifier_derived_from_type_and_index() {
        let sensor = SensorDescription::new(&id("/lpc/it8728"), "Fan #2", SensorType::Fan, 1);
        assert_eq!(sensor.identifier.as_str(), "/lpc/it8728/fan/1");
    }

    #[test]
    fn test_nested_lookup() {
        let engine = StaticEngine::new();
        let board = id("/mainboard");
        let chip = id("/lpc/it8728");
        engine.insert_hardware(
            HardwareDescription::new(board.clone(), "Board", HardwareType::Mainboard)
                .with_sub_hardware(HardwareDescription::new(chip.clone(), "IT8728F", HardwareType::SuperIO)),
        );
        assert!(engine.insert_sensor(
            &chip,
            SensorDescription::new(&chip, "CPU Fan", SensorType::Fan, 0)
        ));

        assert_eq!(engine.describe_hardware(&chip).unwrap().name, "IT8728F");
        let fan = id("/lpc/it8728/fan/0");
        assert_eq!(engine.describe_sensor(&fan).unwrap().name, "CPU Fan");

        engine.remove_sensor(&chip, &fan);
        assert!(engine.describe_sensor(&fan).is_none());
        assert!(!engine.insert_sensor(&id("/nope"), SensorDescription::new(&chip, "x", SensorType::Fan, 1)));
    }

    #[test]
    fn test_values_and_controls() {
        let engine = StaticEngine::new();
        let fan = id("/lpc/it8728/fan/0");
        assert_eq!(engine.read(&fan), None);
        engine.set_value(&fan, 1200.0);
        assert_eq!(engine.read(&fan), Some(1200.0));
        engine.clear_value(&fan);
        assert_eq!(engine.read(&fan), None);

        engine.apply_control(&fan.child("control"), ControlMode::Software, 40.0);
        assert_eq!(engine.applied_controls().len(), 1);
    }
}
