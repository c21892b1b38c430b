//! Sensor parameter: a tunable value with an engine default, persisted under
//! the parameter's own identifier while overridden.

use std::sync::{Arc, Mutex, PoisonError};

use hwmirror_core::{Identifier, Settings};
use tracing::debug;

use crate::engine::ParameterDescription;

#[derive(Debug, Clone, Copy)]
struct ParameterState {
    value: f32,
    is_default: bool,
}

/// Shared handle to a parameter's value.
#[derive(Clone)]
pub struct ParameterLink {
    identifier: Identifier,
    default_value: f32,
    state: Arc<Mutex<ParameterState>>,
    settings: Settings,
}

impl ParameterLink {
    fn new(identifier: Identifier, default_value: f32, settings: &Settings) -> Self {
        let state = if settings.contains(identifier.as_str()) {
            ParameterState {
                value: settings.get_f32(identifier.as_str(), default_value),
                is_default: false,
            }
        } else {
            ParameterState {
                value: default_value,
                is_default: true,
            }
        };
        ParameterLink {
            identifier,
            default_value,
            state: Arc::new(Mutex::new(state)),
            settings: settings.clone(),
        }
    }

    fn state(&self) -> ParameterState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn value(&self) -> f32 {
        self.state().value
    }

    pub fn is_default(&self) -> bool {
        self.state().is_default
    }

    pub fn default_value(&self) -> f32 {
        self.default_value
    }

    /// Overrides the value and persists it.
    pub fn set_value(&self, value: f32) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ParameterState {
            value,
            is_default: false,
        };
        self.settings.set_f32(self.identifier.as_str(), value);
        debug!(parameter = %self.identifier, value, "Parameter overridden");
    }

    /// Returns to the engine default and forgets the override.
    pub fn set_default(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ParameterState {
            value: self.default_value,
            is_default: true,
        };
        self.settings.remove(self.identifier.as_str());
    }
}

impl std::fmt::Debug for ParameterLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ParameterLink")
            .field("identifier", &self.identifier)
            .field("value", &state.value)
            .field("is_default", &state.is_default)
            .finish()
    }
}

#[derive(Debug)]
pub struct Parameter {
    identifier: Identifier,
    sensor: Identifier,
    name: String,
    description: String,
    link: ParameterLink,
}

impl Parameter {
    pub(crate) fn new(description: &ParameterDescription, sensor: &Identifier, settings: &Settings) -> Self {
        let identifier = Identifier::for_parameter(sensor, &description.name);
        Parameter {
            sensor: sensor.clone(),
            name: description.name.clone(),
            description: description.description.clone(),
            link: ParameterLink::new(identifier.clone(), description.default_value, settings),
            identifier,
        }
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

    pub fn link(&self) -> &ParameterLink {
        &self.link
    }

    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            identifier: self.identifier.clone(),
            sensor: self.sensor.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            link: self.link.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterSnapshot {
    pub identifier: Identifier,
    pub sensor: Identifier,
    pub name: String,
    pub description: String,
    pub link: ParameterLink,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameter(settings: &Settings) -> Parameter {
        let sensor = Identifier::parse("/lpc/it8728/temperature/0").unwrap();
        let description = ParameterDescription {
            name: "Offset [°C]".to_string(),
            description: "Temperature = Value + Offset".to_string(),
            default_value: 0.0,
        };
        Parameter::new(&description, &sensor, settings)
    }

    #[test]
    fn test_identifier_uses_sanitized_name() {
        let p = parameter(&Settings::in_memory());
        assert_eq!(p.identifier().as_str(), "/lpc/it8728/temperature/0/parameter/offsetc");
    }

    #[test]
    fn test_override_persists_and_default_clears() {
        let settings = Settings::in_memory();
        let p = parameter(&settings);
        assert!(p.link().is_default());

        p.link().set_value(2.5);
        let reopened = parameter(&settings);
        assert_eq!(reopened.link().value(), 2.5);
        assert!(!reopened.link().is_default());

        reopened.link().set_default();
        assert!(!settings.contains(reopened.identifier().as_str()));
        assert_eq!(parameter(&settings).link().value(), 0.0);
    }
}
