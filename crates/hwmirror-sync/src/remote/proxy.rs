//! Client-side proxies rebuilt from source records.
//!
//! Proxies hold plain copies of what the source reported plus their own
//! reading/history. Every lookup or action that hits a revoked instance
//! fails with a transient error; the proxy keeps its cached state and the
//! next update tries again.

use chrono::{DateTime, Utc};
use hwmirror_core::{
    ControlMode, ElementState, HardwareType, History, Identifier, Reading, Restore, SensorType,
    SensorValue, Settings,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{MirrorError, MirrorResult};
use crate::source::{ControlRecord, HardwareRecord, InstanceSource, ParameterRecord, SensorRecord};

fn log_source_error(identifier: &Identifier, error: &MirrorError, what: &str) {
    if error.is_transient() {
        debug!(instance = %identifier, error = %error, "{} skipped, instance gone", what);
    } else {
        warn!(instance = %identifier, error = %error, "{} failed", what);
    }
}

// =============================================================================
// Parameter
// =============================================================================

#[derive(Debug, Clone)]
pub struct RemoteParameter {
    identifier: Identifier,
    sensor: Identifier,
    name: String,
    description: String,
    default_value: f32,
    value: f32,
    is_default: bool,
}

impl RemoteParameter {
    /// Builds the proxy; a value stored in the client settings is pushed to
    /// the source.
    pub(crate) fn build<S: InstanceSource + ?Sized>(
        source: &S,
        settings: &Settings,
        record: ParameterRecord,
    ) -> Self {
        let mut parameter = RemoteParameter {
            identifier: record.identifier,
            sensor: record.parent,
            name: record.name,
            description: record.description,
            default_value: record.default_value,
            value: record.value,
            is_default: record.is_default,
        };

        let key = parameter.identifier.as_str();
        if settings.contains(key) {
            let stored = settings.get_f32(key, parameter.default_value);
            match source.invoke(&parameter.identifier, "SetValue", &[stored]) {
                Ok(_) => {
                    parameter.value = stored;
                    parameter.is_default = false;
                }
                Err(e) => log_source_error(&parameter.identifier, &e, "Parameter restore"),
            }
        }
        parameter
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn sensor(&self) -> &Identifier {
        &self.sensor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn default_value(&self) -> f32 {
        self.default_value
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub(crate) fn set_value<S: InstanceSource + ?Sized>(
        &mut self,
        source: &S,
        settings: &Settings,
        value: f32,
    ) -> MirrorResult<()> {
        source.invoke(&self.identifier, "SetValue", &[value])?;
        self.value = value;
        self.is_default = false;
        settings.set_f32(self.identifier.as_str(), value);
        Ok(())
    }

    pub(crate) fn set_default<S: InstanceSource + ?Sized>(
        &mut self,
        source: &S,
        settings: &Settings,
    ) -> MirrorResult<()> {
        source.invoke(&self.identifier, "SetDefault", &[])?;
        self.value = self.default_value;
        self.is_default = true;
        settings.remove(self.identifier.as_str());
        Ok(())
    }

    fn refresh<S: InstanceSource + ?Sized>(&mut self, source: &S) {
        match source.parameter(&self.identifier) {
            Ok(record) => {
                self.value = record.value;
                self.is_default = record.is_default;
            }
            Err(e) => log_source_error(&self.identifier, &e, "Parameter refresh"),
        }
    }

    fn view(&self) -> ParameterView {
        ParameterView {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            value: self.value,
            is_default: self.is_default,
        }
    }
}

// =============================================================================
// Control
// =============================================================================

#[derive(Debug, Clone)]
pub struct RemoteControl {
    identifier: Identifier,
    sensor: Identifier,
    mode: ControlMode,
    software_value: f32,
    min_software_value: f32,
    max_software_value: f32,
}

impl RemoteControl {
    /// Builds the proxy; a Software mode stored in the client settings is
    /// re-applied to the source.
    pub(crate) fn build<S: InstanceSource + ?Sized>(
        source: &S,
        settings: &Settings,
        record: ControlRecord,
    ) -> Self {
        let mut control = RemoteControl {
            identifier: record.identifier,
            sensor: record.parent,
            mode: record.mode,
            software_value: record.software_value,
            min_software_value: record.min_software_value,
            max_software_value: record.max_software_value,
        };

        let stored = ControlMode::from_i32(settings.get_i32(&control.mode_key(), 0));
        if stored == ControlMode::Software {
            let value = settings.get_f32(&control.value_key(), control.software_value);
            match source.invoke(&control.identifier, "SetSoftware", &[value]) {
                Ok(_) => {
                    control.mode = ControlMode::Software;
                    control.software_value = control.clamp(value);
                }
                Err(e) => log_source_error(&control.identifier, &e, "Control restore"),
            }
        }
        control
    }

    fn mode_key(&self) -> String {
        self.identifier.settings_key("mode")
    }

    fn value_key(&self) -> String {
        self.identifier.settings_key("value")
    }

    fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min_software_value, self.max_software_value)
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn sensor(&self) -> &Identifier {
        &self.sensor
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn software_value(&self) -> f32 {
        self.software_value
    }

    pub(crate) fn set_default<S: InstanceSource + ?Sized>(
        &mut self,
        source: &S,
        settings: &Settings,
    ) -> MirrorResult<()> {
        source.invoke(&self.identifier, "SetDefault", &[])?;
        self.mode = ControlMode::Default;
        settings.set_i32(&self.mode_key(), self.mode.as_i32());
        Ok(())
    }

    pub(crate) fn set_software<S: InstanceSource + ?Sized>(
        &mut self,
        source: &S,
        settings: &Settings,
        value: f32,
    ) -> MirrorResult<()> {
        source.invoke(&self.identifier, "SetSoftware", &[value])?;
        self.mode = ControlMode::Software;
        self.software_value = self.clamp(value);
        settings.set_i32(&self.mode_key(), self.mode.as_i32());
        settings.set_f32(&self.value_key(), self.software_value);
        Ok(())
    }

    fn refresh<S: InstanceSource + ?Sized>(&mut self, source: &S) {
        match source.control(&self.identifier) {
            Ok(record) => {
                self.mode = record.mode;
                self.software_value = record.software_value;
            }
            Err(e) => log_source_error(&self.identifier, &e, "Control refresh"),
        }
    }

    fn view(&self) -> ControlView {
        ControlView {
            identifier: self.identifier.clone(),
            mode: self.mode,
            software_value: self.software_value,
        }
    }
}

// =============================================================================
// Sensor
// =============================================================================

#[derive(Debug, Clone)]
pub struct RemoteSensor {
    identifier: Identifier,
    hardware: Identifier,
    sensor_type: SensorType,
    index: u32,
    default_hidden: bool,
    default_name: String,
    name: String,
    reading: Reading,
    parameters: Vec<RemoteParameter>,
    control: Option<RemoteControl>,
}

impl RemoteSensor {
    pub(crate) fn build<S: InstanceSource + ?Sized>(
        source: &S,
        settings: &Settings,
        record: SensorRecord,
        now: DateTime<Utc>,
    ) -> Self {
        let identifier = record.identifier;
        let name = settings.get_string(&identifier.settings_key("name"), &record.name);

        let (history, outcome) = History::restore(settings, &identifier, now);
        match outcome {
            Restore::Corrupt(e) => {
                warn!(sensor = %identifier, error = %e, "Discarding unreadable sensor history")
            }
            Restore::Restored(count) => debug!(sensor = %identifier, count, "Sensor history restored"),
            Restore::Absent => {}
        }
        let mut reading = Reading::new(history);
        reading.seed(record.value);

        let parameters = record
            .parameters
            .iter()
            .filter_map(|id| match source.parameter(id) {
                Ok(p) => Some(RemoteParameter::build(source, settings, p)),
                Err(e) => {
                    log_source_error(id, &e, "Parameter lookup");
                    None
                }
            })
            .collect();
        let control = record.control.as_ref().and_then(|id| match source.control(id) {
            Ok(c) => Some(RemoteControl::build(source, settings, c)),
            Err(e) => {
                log_source_error(id, &e, "Control lookup");
                None
            }
        });

        RemoteSensor {
            hardware: record.parent,
            sensor_type: record.sensor_type,
            index: record.index,
            default_hidden: record.default_hidden,
            default_name: record.name,
            name,
            reading,
            parameters,
            control,
            identifier,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<f32> {
        self.reading.value()
    }

    pub fn min(&self) -> Option<f32> {
        self.reading.min()
    }

    pub fn max(&self) -> Option<f32> {
        self.reading.max()
    }

    pub fn history(&self) -> Vec<SensorValue> {
        self.reading.history().iter().copied().collect()
    }

    pub fn parameters(&self) -> &[RemoteParameter] {
        &self.parameters
    }

    pub fn control(&self) -> Option<&RemoteControl> {
        self.control.as_ref()
    }

    pub(crate) fn parameter_mut(&mut self, identifier: &Identifier) -> Option<&mut RemoteParameter> {
        self.parameters.iter_mut().find(|p| &p.identifier == identifier)
    }

    pub(crate) fn control_mut(&mut self, identifier: &Identifier) -> Option<&mut RemoteControl> {
        self.control.as_mut().filter(|c| &c.identifier == identifier)
    }

    /// Renames the sensor locally. An empty name restores the source's name.
    pub(crate) fn set_name(&mut self, settings: &Settings, name: &str) {
        let key = self.identifier.settings_key("name");
        if name.is_empty() {
            settings.remove(&key);
            self.name = self.default_name.clone();
        } else {
            settings.set_string(&key, name);
            self.name = name.to_string();
        }
    }

    pub(crate) fn reset_min(&mut self) {
        self.reading.reset_min();
    }

    pub(crate) fn reset_max(&mut self) {
        self.reading.reset_max();
    }

    pub(crate) fn update<S: InstanceSource + ?Sized>(&mut self, source: &S, now: DateTime<Utc>) {
        match source.sensor_value(&self.identifier) {
            Ok(value) => self.reading.set_value(value, now),
            Err(e) => log_source_error(&self.identifier, &e, "Sensor refresh"),
        }
        for parameter in &mut self.parameters {
            parameter.refresh(source);
        }
        if let Some(control) = &mut self.control {
            control.refresh(source);
        }
    }

    /// Stores the history buffer in the client settings.
    pub(crate) fn close(&self, settings: &Settings) {
        if let Err(e) = self.reading.history().flush(settings, &self.identifier) {
            warn!(sensor = %self.identifier, error = %e, "Failed to store sensor history");
        }
    }

    fn view(&self) -> SensorView {
        SensorView {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            sensor_type: self.sensor_type,
            value: self.value(),
            min: self.min(),
            max: self.max(),
            parameters: self.parameters.iter().map(RemoteParameter::view).collect(),
            control: self.control.as_ref().map(RemoteControl::view),
        }
    }
}

// =============================================================================
// Hardware
// =============================================================================

#[derive(Debug, Clone)]
pub struct RemoteHardware {
    identifier: Identifier,
    parent: Option<Identifier>,
    hardware_type: HardwareType,
    default_name: String,
    name: String,
    state: ElementState,
    sub_hardware: Vec<RemoteHardware>,
    sensors: Vec<RemoteSensor>,
}

impl RemoteHardware {
    /// Builds the proxy and, recursively, its sub-hardware and sensors.
    /// Children that vanished since the record was read are skipped.
    pub(crate) fn build<S: InstanceSource + ?Sized>(
        source: &S,
        settings: &Settings,
        record: HardwareRecord,
        state: ElementState,
        now: DateTime<Utc>,
    ) -> Self {
        let sub_hardware = record
            .sub_hardware
            .iter()
            .filter_map(|id| match source.hardware(id) {
                Ok(sub) => Some(RemoteHardware::build(source, settings, sub, ElementState::Visible, now)),
                Err(e) => {
                    log_source_error(id, &e, "Sub-hardware lookup");
                    None
                }
            })
            .collect();
        let sensors = record
            .sensors
            .iter()
            .filter_map(|id| match source.sensor(id) {
                Ok(sensor) => Some(RemoteSensor::build(source, settings, sensor, now)),
                Err(e) => {
                    log_source_error(id, &e, "Sensor lookup");
                    None
                }
            })
            .collect();

        let name = settings.get_string(&record.identifier.settings_key("name"), &record.name);

        RemoteHardware {
            identifier: record.identifier,
            parent: record.parent,
            hardware_type: record.hardware_type,
            default_name: record.name,
            name,
            state,
            sub_hardware,
            sensors,
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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ElementState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ElementState) {
        self.state = state;
    }

    /// Renames the hardware locally. An empty name restores the source's name.
    pub(crate) fn set_name(&mut self, settings: &Settings, name: &str) {
        let key = self.identifier.settings_key("name");
        if name.is_empty() {
            settings.remove(&key);
            self.name = self.default_name.clone();
        } else {
            settings.set_string(&key, name);
            self.name = name.to_string();
        }
    }

    /// Asks the source for the engine report of this hardware.
    pub fn report<S: InstanceSource + ?Sized>(&self, source: &S) -> MirrorResult<String> {
        let report = source.invoke(&self.identifier, "GetReport", &[])?;
        Ok(match report {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        })
    }

    pub fn sub_hardware(&self) -> &[RemoteHardware] {
        &self.sub_hardware
    }

    pub fn sensors(&self) -> &[RemoteSensor] {
        &self.sensors
    }

    /// This hardware or any sub-hardware below it.
    pub(crate) fn find_hardware_mut(&mut self, identifier: &Identifier) -> Option<&mut RemoteHardware> {
        if &self.identifier == identifier {
            return Some(self);
        }
        self.sub_hardware
            .iter_mut()
            .find_map(|h| h.find_hardware_mut(identifier))
    }

    pub fn find_hardware(&self, identifier: &Identifier) -> Option<&RemoteHardware> {
        if &self.identifier == identifier {
            return Some(self);
        }
        self.sub_hardware.iter().find_map(|h| h.find_hardware(identifier))
    }

    /// This hardware or one of its direct sub-hardware.
    pub(crate) fn find_mut(&mut self, identifier: &Identifier) -> Option<&mut RemoteHardware> {
        if &self.identifier == identifier {
            return Some(self);
        }
        self.sub_hardware.iter_mut().find(|h| &h.identifier == identifier)
    }

    pub fn find_sensor(&self, identifier: &Identifier) -> Option<&RemoteSensor> {
        self.sensors
            .iter()
            .find(|s| &s.identifier == identifier)
            .or_else(|| self.sub_hardware.iter().find_map(|h| h.find_sensor(identifier)))
    }

    pub(crate) fn find_sensor_mut(&mut self, identifier: &Identifier) -> Option<&mut RemoteSensor> {
        if let Some(position) = self.sensors.iter().position(|s| &s.identifier == identifier) {
            return self.sensors.get_mut(position);
        }
        self.sub_hardware
            .iter_mut()
            .find_map(|h| h.find_sensor_mut(identifier))
    }

    /// Sensor owning a parameter or control, searched recursively.
    pub(crate) fn owner_of_mut(&mut self, child: &Identifier) -> Option<&mut RemoteSensor> {
        let parent = child.parent()?;
        let sensor = if parent.last_segment() == "parameter" { parent.parent()? } else { parent };
        self.find_sensor_mut(&sensor)
    }

    /// Fetches and attaches a sensor. Returns false for duplicates and for
    /// sensors the source no longer knows.
    pub(crate) fn add_sensor<S: InstanceSource + ?Sized>(
        &mut self,
        source: &S,
        settings: &Settings,
        identifier: &Identifier,
        now: DateTime<Utc>,
    ) -> bool {
        if self.sensors.iter().any(|s| &s.identifier == identifier) {
            return false;
        }
        match source.sensor(identifier) {
            Ok(record) => {
                self.sensors.push(RemoteSensor::build(source, settings, record, now));
                true
            }
            Err(e) => {
                log_source_error(identifier, &e, "Sensor lookup");
                false
            }
        }
    }

    pub(crate) fn remove_sensor(&mut self, settings: &Settings, identifier: &Identifier) -> bool {
        match self.sensors.iter().position(|s| &s.identifier == identifier) {
            Some(position) => {
                self.sensors.remove(position).close(settings);
                true
            }
            None => false,
        }
    }

    pub(crate) fn update<S: InstanceSource + ?Sized>(&mut self, source: &S, now: DateTime<Utc>) {
        for sensor in &mut self.sensors {
            sensor.update(source, now);
        }
        for sub in &mut self.sub_hardware {
            sub.update(source, now);
        }
    }

    pub(crate) fn close(&self, settings: &Settings) {
        for sensor in &self.sensors {
            sensor.close(settings);
        }
        for sub in &self.sub_hardware {
            sub.close(settings);
        }
    }

    pub(crate) fn view(&self) -> HardwareView {
        HardwareView {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            hardware_type: self.hardware_type,
            sub_hardware: self.sub_hardware.iter().map(RemoteHardware::view).collect(),
            sensors: self.sensors.iter().map(RemoteSensor::view).collect(),
        }
    }
}

// =============================================================================
// Views
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HardwareView {
    pub identifier: Identifier,
    pub name: String,
    pub hardware_type: HardwareType,
    pub sub_hardware: Vec<HardwareView>,
    pub sensors: Vec<SensorView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorView {
    pub identifier: Identifier,
    pub name: String,
    pub sensor_type: SensorType,
    pub value: Option<f32>,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub parameters: Vec<ParameterView>,
    pub control: Option<ControlView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterView {
    pub identifier: Identifier,
    pub name: String,
    pub value: f32,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlView {
    pub identifier: Identifier,
    pub mode: ControlMode,
    pub software_value: f32,
}
