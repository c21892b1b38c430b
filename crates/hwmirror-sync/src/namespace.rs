//! # Instrumentation Namespace
//!
//! In-process stand-in for an external instrumentation service. The publish
//! mirror registers instances here; remote mirrors enumerate, fetch and act
//! on them and follow the event feed.
//!
//! ```text
//! PublishMirror ──publish/update/revoke──► Namespace ──emit──► EventFeed
//!                                             ▲                   │
//!                                             │ records, invoke   │ events
//!                                        RemoteMirror ◄───────────┘
//! ```
//!
//! The instance map lock is never held while a node link or the feed is
//! called: instances are cloned out first.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use hwmirror_core::Identifier;
use serde_json::Value;
use tracing::debug;

use crate::error::{MirrorError, MirrorResult};
use crate::feed::{EventFeed, InstanceEvent, InstanceEventKind, Subscription};
use crate::instance::{InstanceBody, MirrorInstance};
use crate::publish::InstanceRegistry;
use crate::schema::EntityKind;
use crate::source::{ControlRecord, HardwareRecord, InstanceSource, ParameterRecord, SensorRecord};

/// Shared registry of published instances. Clones share the same map.
#[derive(Clone)]
pub struct Namespace {
    instances: Arc<Mutex<BTreeMap<Identifier, MirrorInstance>>>,
    feed: EventFeed,
}

impl Namespace {
    pub fn new(feed: EventFeed) -> Self {
        Namespace {
            instances: Arc::new(Mutex::new(BTreeMap::new())),
            feed,
        }
    }

    pub fn feed(&self) -> &EventFeed {
        &self.feed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Identifier, MirrorInstance>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.lock().contains_key(identifier)
    }

    /// Clone of a published instance.
    pub fn get(&self, identifier: &Identifier) -> MirrorResult<MirrorInstance> {
        self.lock()
            .get(identifier)
            .cloned()
            .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))
    }

    fn get_kind(&self, identifier: &Identifier, expected: EntityKind) -> MirrorResult<MirrorInstance> {
        let instance = self.get(identifier)?;
        if instance.kind() != expected {
            return Err(MirrorError::KindMismatch {
                identifier: identifier.clone(),
                expected,
                actual: instance.kind(),
            });
        }
        Ok(instance)
    }

    /// Reads one schema property of a published instance.
    pub fn property(&self, identifier: &Identifier, name: &str) -> MirrorResult<Value> {
        let instance = self.get(identifier)?;
        instance
            .property(name)
            .ok_or_else(|| MirrorError::UnknownProperty {
                class: instance.kind(),
                property: name.to_string(),
            })
    }

    fn notify(&self, kind: InstanceEventKind, instance: &MirrorInstance) {
        self.feed.emit(InstanceEvent {
            kind,
            class: instance.kind(),
            identifier: instance.identifier.to_string(),
            parent: instance
                .parent
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        });
    }
}

// =============================================================================
// Registry Side
// =============================================================================

impl InstanceRegistry for Namespace {
    fn publish(&mut self, instance: &MirrorInstance) -> MirrorResult<()> {
        {
            let mut instances = self.lock();
            if instances.contains_key(&instance.identifier) {
                return Err(MirrorError::AlreadyPublished(instance.identifier.clone()));
            }
            instances.insert(instance.identifier.clone(), instance.clone());
        }
        debug!(instance = %instance.identifier, class = %instance.kind(), "Instance registered");
        self.notify(InstanceEventKind::Created, instance);
        Ok(())
    }

    fn update(&mut self, instance: &MirrorInstance) -> MirrorResult<()> {
        let mut instances = self.lock();
        match instances.get_mut(&instance.identifier) {
            Some(slot) => {
                *slot = instance.clone();
                Ok(())
            }
            None => Err(MirrorError::NotPublished(instance.identifier.clone())),
        }
    }

    fn revoke(&mut self, identifier: &Identifier) -> MirrorResult<()> {
        let removed = self.lock().remove(identifier);
        match removed {
            Some(instance) => {
                debug!(instance = %identifier, "Instance withdrawn");
                self.notify(InstanceEventKind::Deleted, &instance);
                Ok(())
            }
            None => Err(MirrorError::NotPublished(identifier.clone())),
        }
    }
}

// =============================================================================
// Source Side
// =============================================================================

fn hardware_record(instance: &MirrorInstance) -> Option<HardwareRecord> {
    match &instance.body {
        InstanceBody::Hardware {
            hardware_type,
            sub_hardware,
            sensors,
            link,
        } => Some(HardwareRecord {
            identifier: instance.identifier.clone(),
            parent: instance.parent.clone(),
            name: link.name(),
            hardware_type: *hardware_type,
            sub_hardware: sub_hardware.clone(),
            sensors: sensors.clone(),
        }),
        _ => None,
    }
}

impl InstanceSource for Namespace {
    fn enumerate_hardware(&self) -> Vec<HardwareRecord> {
        let top_level: Vec<MirrorInstance> = self
            .lock()
            .values()
            .filter(|i| i.kind() == EntityKind::Hardware && i.parent.is_none())
            .cloned()
            .collect();
        top_level.iter().filter_map(hardware_record).collect()
    }

    fn hardware(&self, identifier: &Identifier) -> MirrorResult<HardwareRecord> {
        let instance = self.get_kind(identifier, EntityKind::Hardware)?;
        hardware_record(&instance).ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))
    }

    fn sensor(&self, identifier: &Identifier) -> MirrorResult<SensorRecord> {
        let instance = self.get_kind(identifier, EntityKind::Sensor)?;
        match instance.body {
            InstanceBody::Sensor {
                index,
                sensor_type,
                default_hidden,
                parameters,
                control,
                link,
            } => Ok(SensorRecord {
                parent: instance
                    .parent
                    .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))?,
                identifier: instance.identifier,
                name: link.name(),
                index,
                sensor_type,
                value: link.value(),
                min: link.min(),
                max: link.max(),
                default_hidden,
                parameters,
                control,
            }),
            _ => Err(MirrorError::InstanceGone(identifier.clone())),
        }
    }

    fn parameter(&self, identifier: &Identifier) -> MirrorResult<ParameterRecord> {
        let instance = self.get_kind(identifier, EntityKind::Parameter)?;
        match instance.body {
            InstanceBody::Parameter {
                name,
                description,
                link,
            } => Ok(ParameterRecord {
                parent: instance
                    .parent
                    .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))?,
                identifier: instance.identifier,
                name,
                description,
                value: link.value(),
                default_value: link.default_value(),
                is_default: link.is_default(),
            }),
            _ => Err(MirrorError::InstanceGone(identifier.clone())),
        }
    }

    fn control(&self, identifier: &Identifier) -> MirrorResult<ControlRecord> {
        let instance = self.get_kind(identifier, EntityKind::Control)?;
        match instance.body {
            InstanceBody::Control { link } => Ok(ControlRecord {
                parent: instance
                    .parent
                    .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))?,
                identifier: instance.identifier,
                mode: link.mode(),
                software_value: link.software_value(),
                min_software_value: link.min_software_value(),
                max_software_value: link.max_software_value(),
            }),
            _ => Err(MirrorError::InstanceGone(identifier.clone())),
        }
    }

    fn sensor_value(&self, identifier: &Identifier) -> MirrorResult<Option<f32>> {
        match self.get_kind(identifier, EntityKind::Sensor)?.body {
            InstanceBody::Sensor { link, .. } => Ok(link.value()),
            _ => Err(MirrorError::InstanceGone(identifier.clone())),
        }
    }

    fn invoke(&self, identifier: &Identifier, action: &str, args: &[f32]) -> MirrorResult<Option<Value>> {
        self.get(identifier)?.invoke(action, args)
    }

    fn subscribe(&self, classes: &[EntityKind]) -> Subscription {
        self.feed.subscribe(classes)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
