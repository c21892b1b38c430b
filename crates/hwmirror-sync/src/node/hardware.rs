//! Hardware node: a named device with sensors and nested sub-hardware.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use hwmirror_core::{ElementState, HardwareType, Identifier, Settings};

use super::sensor::{Sensor, SensorSnapshot};
use crate::engine::{HardwareDescription, SensingEngine, SensorDescription};

/// Shared handle to a hardware node's live name and engine report.
#[derive(Clone)]
pub struct HardwareLink {
    identifier: Identifier,
    name: Arc<RwLock<String>>,
    engine: Arc<dyn SensingEngine>,
}

impl HardwareLink {
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn name(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Engine diagnostic text; empty if the engine has none.
    pub fn report(&self) -> String {
        self.engine.report(&self.identifier).unwrap_or_default()
    }

    fn set_name(&self, name: String) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = name;
    }
}

impl std::fmt::Debug for HardwareLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareLink")
            .field("identifier", &self.identifier)
            .field("name", &self.name())
            .finish()
    }
}

/// Hardware node in the engine tree.
#[derive(Debug)]
pub struct Hardware {
    identifier: Identifier,
    parent: Option<Identifier>,
    hardware_type: HardwareType,
    default_name: String,
    sub_hardware: Vec<Hardware>,
    sensors: Vec<Sensor>,
    state: ElementState,
    link: HardwareLink,
    settings: Settings,
}

impl Hardware {
    pub(crate) fn new(
        description: &HardwareDescription,
        parent: Option<Identifier>,
        state: ElementState,
        settings: &Settings,
        engine: &Arc<dyn SensingEngine>,
    ) -> Self {
        let now = Utc::now();
        let identifier = description.identifier.clone();
        let name = settings.get_string(&identifier.settings_key("name"), &description.name);

        let sub_hardware = description
            .sub_hardware
            .iter()
            .map(|h| Hardware::new(h, Some(identifier.clone()), ElementState::Visible, settings, engine))
            .collect();
        let sensors = description
            .sensors
            .iter()
            .map(|s| Sensor::new(s, &identifier, settings, engine, now))
            .collect();

        Hardware {
            parent,
            hardware_type: description.hardware_type,
            default_name: description.name.clone(),
            sub_hardware,
            sensors,
            state,
            link: HardwareLink {
                identifier: identifier.clone(),
                name: Arc::new(RwLock::new(name)),
                engine: Arc::clone(engine),
            },
            settings: settings.clone(),
            identifier,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn parent(&self) -> Option<&Identifier> {
        self.parent.as_ref()
    }

    pub fn hardware_type(&self) -> HardwareType {
        self.hardware_type
    }

    pub fn name(&self) -> String {
        self.link.name()
    }

    pub fn state(&self) -> ElementState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ElementState) {
        self.state = state;
    }

    pub fn sub_hardware(&self) -> &[Hardware] {
        &self.sub_hardware
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn link(&self) -> &HardwareLink {
        &self.link
    }

    /// This node or one of its sub-hardware.
    pub fn find(&self, identifier: &Identifier) -> Option<&Hardware> {
        if &self.identifier == identifier {
            return Some(self);
        }
        self.sub_hardware.iter().find(|h| &h.identifier == identifier)
    }

    pub(crate) fn find_mut(&mut self, identifier: &Identifier) -> Option<&mut Hardware> {
        if &self.identifier == identifier {
            return Some(self);
        }
        self.sub_hardware
            .iter_mut()
            .find(|h| &h.identifier == identifier)
    }

    /// A sensor on this node or one of its sub-hardware.
    pub fn find_sensor(&self, identifier: &Identifier) -> Option<&Sensor> {
        self.sensors
            .iter()
            .find(|s| s.identifier() == identifier)
            .or_else(|| self.sub_hardware.iter().find_map(|h| h.find_sensor(identifier)))
    }

    /// Renames the hardware. An empty name restores the engine's name.
    pub fn set_name(&self, name: &str) {
        let name = if name.is_empty() { self.default_name.as_str() } else { name };
        self.settings.set_string(&self.identifier.settings_key("name"), name);
        self.link.set_name(name.to_string());
    }

    /// Adds a sensor unless one with the same identifier exists.
    pub(crate) fn add_sensor(
        &mut self,
        description: &SensorDescription,
        engine: &Arc<dyn SensingEngine>,
    ) -> Option<&Sensor> {
        if self.sensors.iter().any(|s| s.identifier() == &description.identifier) {
            return None;
        }
        let sensor = Sensor::new(description, &self.identifier, &self.settings, engine, Utc::now());
        self.sensors.push(sensor);
        self.sensors.last()
    }

    /// Removes a sensor and stores its history.
    pub(crate) fn remove_sensor(&mut self, identifier: &Identifier) -> Option<Sensor> {
        let position = self.sensors.iter().position(|s| s.identifier() == identifier)?;
        let sensor = self.sensors.remove(position);
        sensor.close();
        Some(sensor)
    }

    pub(crate) fn update(&self, engine: &dyn SensingEngine, now: DateTime<Utc>) {
        for sensor in &self.sensors {
            sensor.update(engine, now);
        }
        for hardware in &self.sub_hardware {
            hardware.update(engine, now);
        }
    }

    /// Stores history for every sensor below this node.
    pub(crate) fn close(&self) {
        for sensor in &self.sensors {
            sensor.close();
        }
        for hardware in &self.sub_hardware {
            hardware.close();
        }
    }

    pub fn snapshot(&self) -> HardwareSnapshot {
        HardwareSnapshot {
            identifier: self.identifier.clone(),
            parent: self.parent.clone(),
            hardware_type: self.hardware_type,
            sub_hardware: self.sub_hardware.iter().map(Hardware::snapshot).collect(),
            sensors: self.sensors.iter().map(Sensor::snapshot).collect(),
            link: self.link.clone(),
        }
    }
}

/// Structure of a hardware subtree plus live links, carried by tree events.
#[derive(Debug, Clone)]
pub struct HardwareSnapshot {
    pub identifier: Identifier,
    pub parent: Option<Identifier>,
    pub hardware_type: HardwareType,
    pub sub_hardware: Vec<HardwareSnapshot>,
    pub sensors: Vec<SensorSnapshot>,
    pub link: HardwareLink,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StaticEngine;
    use hwmirror_core::SensorType;

    fn board() -> HardwareDescription {
        let board = Identifier::parse("/mainboard").unwrap();
        let chip = Identifier::parse("/lpc/nct6798d").unwrap();
        HardwareDescription::new(board, "ROG STRIX", HardwareType::Mainboard).with_sub_hardware(
            HardwareDescription::new(chip.clone(), "NCT6798D", HardwareType::SuperIO)
                .with_sensor(SensorDescription::new(&chip, "CPU Fan", SensorType::Fan, 0)),
        )
    }

    #[test]
    fn test_sub_hardware_points_at_parent() {
        let engine: Arc<dyn SensingEngine> = Arc::new(StaticEngine::new());
        let hw = Hardware::new(&board(), None, ElementState::New, &Settings::in_memory(), &engine);

        let snapshot = hw.snapshot();
        assert_eq!(snapshot.sub_hardware.len(), 1);
        assert_eq!(snapshot.sub_hardware[0].parent.as_ref(), Some(hw.identifier()));
        assert!(hw
            .find_sensor(&Identifier::parse("/lpc/nct6798d/fan/0").unwrap())
            .is_some());
    }

    #[test]
    fn test_duplicate_sensor_is_ignored() {
        let engine: Arc<dyn SensingEngine> = Arc::new(StaticEngine::new());
        let mut hw = Hardware::new(&board(), None, ElementState::New, &Settings::in_memory(), &engine);
        let voltage = SensorDescription::new(hw.identifier(), "Vcore", SensorType::Voltage, 0);

        assert!(hw.add_sensor(&voltage, &engine).is_some());
        assert!(hw.add_sensor(&voltage, &engine).is_none());
        assert!(hw.remove_sensor(&voltage.identifier).is_some());
        assert!(hw.remove_sensor(&voltage.identifier).is_none());
    }

    #[test]
    fn test_rename_is_live_through_link() {
        let engine: Arc<dyn SensingEngine> = Arc::new(StaticEngine::new());
        let hw = Hardware::new(&board(), None, ElementState::New, &Settings::in_memory(), &engine);
        let link = hw.link().clone();

        hw.set_name("Workstation");
        assert_eq!(link.name(), "Workstation");
        hw.set_name("");
        assert_eq!(link.name(), "ROG STRIX");
    }
}
