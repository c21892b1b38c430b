//! Fan/pump control attached to a sensor.
//!
//! The mode and software value persist under `<control>/mode` and
//! `<control>/value`; a stored mode is re-applied to the engine when the
//! control is built.

use std::sync::{Arc, Mutex, PoisonError};

use hwmirror_core::{ControlMode, Identifier, Settings};
use tracing::debug;

use crate::engine::{ControlDescription, SensingEngine};

#[derive(Debug, Clone, Copy)]
struct ControlState {
    mode: ControlMode,
    software_value: f32,
}

/// Shared handle to a control's mode and target value.
#[derive(Clone)]
pub struct ControlLink {
    identifier: Identifier,
    min_software_value: f32,
    max_software_value: f32,
    state: Arc<Mutex<ControlState>>,
    settings: Settings,
    engine: Arc<dyn SensingEngine>,
}

impl ControlLink {
    fn new(
        identifier: Identifier,
        description: &ControlDescription,
        settings: &Settings,
        engine: &Arc<dyn SensingEngine>,
    ) -> Self {
        let mode = ControlMode::from_i32(settings.get_i32(&identifier.settings_key("mode"), 0));
        let software_value = settings.get_f32(&identifier.settings_key("value"), 0.0);
        let link = ControlLink {
            identifier,
            min_software_value: description.min_software_value,
            max_software_value: description.max_software_value,
            state: Arc::new(Mutex::new(ControlState {
                mode,
                software_value,
            })),
            settings: settings.clone(),
            engine: Arc::clone(engine),
        };
        if mode != ControlMode::Undefined {
            link.engine.apply_control(&link.identifier, mode, software_value);
        }
        link
    }

    fn state(&self) -> ControlState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, state: ControlState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.settings
            .set_i32(&self.identifier.settings_key("mode"), state.mode.as_i32());
        self.settings
            .set_f32(&self.identifier.settings_key("value"), state.software_value);
        self.engine
            .apply_control(&self.identifier, state.mode, state.software_value);
        debug!(control = %self.identifier, mode = %state.mode, value = state.software_value, "Control applied");
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn mode(&self) -> ControlMode {
        self.state().mode
    }

    pub fn software_value(&self) -> f32 {
        self.state().software_value
    }

    pub fn min_software_value(&self) -> f32 {
        self.min_software_value
    }

    pub fn max_software_value(&self) -> f32 {
        self.max_software_value
    }

    /// Hands the device back to its own firmware curve.
    pub fn set_default(&self) {
        let software_value = self.software_value();
        self.store(ControlState {
            mode: ControlMode::Default,
            software_value,
        });
    }

    /// Drives the device at `value`, clamped to the software range.
    pub fn set_software(&self, value: f32) {
        let value = value.clamp(self.min_software_value, self.max_software_value);
        let current = self.state();
        if current.mode == ControlMode::Software
            && (current.software_value - value).abs() <= f32::EPSILON
        {
            return;
        }
        self.store(ControlState {
            mode: ControlMode::Software,
            software_value: value,
        });
    }
}

impl std::fmt::Debug for ControlLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ControlLink")
            .field("identifier", &self.identifier)
            .field("mode", &state.mode)
            .field("software_value", &state.software_value)
            .finish()
    }
}

#[derive(Debug)]
pub struct Control {
    identifier: Identifier,
    sensor: Identifier,
    link: ControlLink,
}

impl Control {
    pub(crate) fn new(
        description: &ControlDescription,
        sensor: &Identifier,
        settings: &Settings,
        engine: &Arc<dyn SensingEngine>,
    ) -> Self {
        let identifier = Identifier::for_control(sensor);
        Control {
            sensor: sensor.clone(),
            link: ControlLink::new(identifier.clone(), description, settings, engine),
            identifier,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn sensor(&self) -> &Identifier {
        &self.sensor
    }

    pub fn link(&self) -> &ControlLink {
        &self.link
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            identifier: self.identifier.clone(),
            sensor: self.sensor.clone(),
            link: self.link.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlSnapshot {
    pub identifier: Identifier,
    pub sensor: Identifier,
    pub link: ControlLink,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StaticEngine;

    const RANGE: ControlDescription = ControlDescription {
        min_software_value: 0.0,
        max_software_value: 100.0,
    };

    #[test]
    fn test_software_value_is_clamped_and_applied() {
        let settings = Settings::in_memory();
        let static_engine = Arc::new(StaticEngine::new());
        let engine: Arc<dyn SensingEngine> = static_engine.clone();
        let sensor = Identifier::parse("/lpc/it8728/control/0").unwrap();

        let control = Control::new(&RANGE, &sensor, &settings, &engine);
        assert_eq!(control.link().mode(), ControlMode::Undefined);
        assert!(static_engine.applied_controls().is_empty());

        control.link().set_software(140.0);
        assert_eq!(control.link().software_value(), 100.0);
        assert_eq!(
            static_engine.applied_controls(),
            vec![(control.identifier().clone(), ControlMode::Software, 100.0)]
        );
    }

    #[test]
    fn test_stored_mode_reapplied_on_build() {
        let settings = Settings::in_memory();
        let static_engine = Arc::new(StaticEngine::new());
        let engine: Arc<dyn SensingEngine> = static_engine.clone();
        let sensor = Identifier::parse("/lpc/it8728/control/0").unwrap();

        Control::new(&RANGE, &sensor, &settings, &engine)
            .link()
            .set_software(30.0);
        let rebuilt = Control::new(&RANGE, &sensor, &settings, &engine);

        assert_eq!(rebuilt.link().mode(), ControlMode::Software);
        assert_eq!(rebuilt.link().software_value(), 30.0);
        assert_eq!(static_engine.applied_controls().len(), 2);
    }
}
