//! Sensor node: a named reading with history, optional parameters and an
//! optional control.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use hwmirror_core::{History, Identifier, Reading, Restore, SensorType, SensorValue, Settings};
use tracing::{debug, warn};

use super::control::{Control, ControlSnapshot};
use super::parameter::{Parameter, ParameterSnapshot};
use crate::engine::{SensingEngine, SensorDescription};

struct SensorCell {
    name: String,
    reading: Reading,
}

/// Shared handle to a sensor's live name and reading.
///
/// The tree writes through it on update; published instances read through
/// it, so mirrors always see current values without re-publishing.
#[derive(Clone)]
pub struct SensorLink {
    cell: Arc<Mutex<SensorCell>>,
}

impl SensorLink {
    fn new(name: String, reading: Reading) -> Self {
        SensorLink {
            cell: Arc::new(Mutex::new(SensorCell { name, reading })),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut SensorCell) -> T) -> T {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut cell)
    }

    pub fn name(&self) -> String {
        self.with(|c| c.name.clone())
    }

    pub fn value(&self) -> Option<f32> {
        self.with(|c| c.reading.value())
    }

    pub fn min(&self) -> Option<f32> {
        self.with(|c| c.reading.min())
    }

    pub fn max(&self) -> Option<f32> {
        self.with(|c| c.reading.max())
    }

    pub fn reset_min(&self) {
        self.with(|c| c.reading.reset_min())
    }

    pub fn reset_max(&self) {
        self.with(|c| c.reading.reset_max())
    }

    /// Copy of the history buffer, oldest first.
    pub fn history(&self) -> Vec<SensorValue> {
        self.with(|c| c.reading.history().iter().copied().collect())
    }

    pub(crate) fn set_value(&self, value: Option<f32>, now: DateTime<Utc>) {
        self.with(|c| c.reading.set_value(value, now))
    }

    fn set_name(&self, name: String) {
        self.with(|c| c.name = name)
    }

    fn flush(&self, settings: &Settings, identifier: &Identifier) {
        let result = self.with(|c| c.reading.history().flush(settings, identifier));
        if let Err(e) = result {
            warn!(sensor = %identifier, error = %e, "Failed to store sensor history");
        }
    }
}

impl std::fmt::Debug for SensorLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorLink")
            .field("name", &self.name())
            .field("value", &self.value())
            .finish()
    }
}

/// Sensor owned by a hardware node in the engine tree.
#[derive(Debug)]
pub struct Sensor {
    identifier: Identifier,
    hardware: Identifier,
    sensor_type: SensorType,
    index: u32,
    default_hidden: bool,
    default_name: String,
    parameters: Vec<Parameter>,
    control: Option<Control>,
    link: SensorLink,
    settings: Settings,
}

impl Sensor {
    /// Builds the sensor, restoring its name override and history.
    pub(crate) fn new(
        description: &SensorDescription,
        hardware: &Identifier,
        settings: &Settings,
        engine: &Arc<dyn SensingEngine>,
        now: DateTime<Utc>,
    ) -> Self {
        let identifier = description.identifier.clone();
        let name = settings.get_string(&identifier.settings_key("name"), &description.name);

        let (history, outcome) = History::restore(settings, &identifier, now);
        match outcome {
            Restore::Corrupt(e) => {
                warn!(sensor = %identifier, error = %e, "Discarding unreadable sensor history")
            }
            Restore::Restored(count) => debug!(sensor = %identifier, count, "Sensor history restored"),
            Restore::Absent => {}
        }

        let parameters = description
            .parameters
            .iter()
            .map(|p| Parameter::new(p, &identifier, settings))
            .collect();
        let control = description
            .control
            .as_ref()
            .map(|c| Control::new(c, &identifier, settings, engine));

        Sensor {
            hardware: hardware.clone(),
            sensor_type: description.sensor_type,
            index: description.index,
            default_hidden: description.default_hidden,
            default_name: description.name.clone(),
            parameters,
            control,
            link: SensorLink::new(name, Reading::new(history)),
            settings: settings.clone(),
            identifier,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Owning hardware.
    pub fn hardware(&self) -> &Identifier {
        &self.hardware
    }

    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_default_hidden(&self) -> bool {
        self.default_hidden
    }

    pub fn name(&self) -> String {
        self.link.name()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn control(&self) -> Option<&Control> {
        self.control.as_ref()
    }

    pub fn link(&self) -> &SensorLink {
        &self.link
    }

    /// Renames the sensor. An empty name restores the engine's name.
    pub fn set_name(&self, name: &str) {
        let name = if name.is_empty() { self.default_name.as_str() } else { name };
        self.settings.set_string(&self.identifier.settings_key("name"), name);
        self.link.set_name(name.to_string());
    }

    pub(crate) fn update(&self, engine: &dyn SensingEngine, now: DateTime<Utc>) {
        self.link.set_value(engine.read(&self.identifier), now);
    }

    /// Stores the history buffer.
    pub(crate) fn close(&self) {
        self.link.flush(&self.settings, &self.identifier);
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            identifier: self.identifier.clone(),
            hardware: self.hardware.clone(),
            sensor_type: self.sensor_type,
            index: self.index,
            default_hidden: self.default_hidden,
            parameters: self.parameters.iter().map(Parameter::snapshot).collect(),
            control: self.control.as_ref().map(Control::snapshot),
            link: self.link.clone(),
        }
    }
}

/// Structure of a sensor plus its live link, carried by tree events.
#[derive(Debug, Clone)]
pub struct SensorSnapshot {
    pub identifier: Identifier,
    pub hardware: Identifier,
    pub sensor_type: SensorType,
    pub index: u32,
    pub default_hidden: bool,
    pub parameters: Vec<ParameterSnapshot>,
    pub control: Option<ControlSnapshot>,
    pub link: SensorLink,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StaticEngine;

    fn sensor(settings: &Settings) -> Sensor {
        let hw = Identifier::parse("/hdd/0").unwrap();
        let description = SensorDescription::new(&hw, "Temperature", SensorType::Temperature, 0);
        let engine: Arc<dyn SensingEngine> = Arc::new(StaticEngine::new());
        Sensor::new(&description, &hw, settings, &engine, Utc::now())
    }

    #[test]
    fn test_name_override_round_trip() {
        let settings = Settings::in_memory();
        let s = sensor(&settings);
        s.set_name("Drive bay");
        assert_eq!(s.name(), "Drive bay");

        let again = sensor(&settings);
        assert_eq!(again.name(), "Drive bay");

        again.set_name("");
        assert_eq!(again.name(), "Temperature");
        assert_eq!(settings.get_string("/hdd/0/temperature/0/name", ""), "Temperature");
    }

    #[test]
    fn test_close_then_reopen_restores_history_with_gap() {
        let settings = Settings::in_memory();
        let engine = StaticEngine::new();
        let s = sensor(&settings);
        engine.set_value(s.identifier(), 35.0);
        for _ in 0..4 {
            s.update(&engine, Utc::now());
        }
        s.close();

        let again = sensor(&settings);
        let history = again.link().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value(), 35.0);
        assert!(history[1].is_gap());
        assert!(!settings.contains("/hdd/0/temperature/0/values"));
    }
}
