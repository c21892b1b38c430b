//! # Publish Mirror
//!
//! Projects engine tree mutations into an external instance registry.
//!
//! ## Construction and Cascade Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  publish_hardware(H)                                                    │
//! │    1. insert H, link into parent's SubHardware                          │
//! │    2. publish every sub-hardware of H (recursively)                     │
//! │    3. registry.publish(H)                                               │
//! │    4. publish every sensor S of H:                                      │
//! │         insert S; insert + link + publish each Parameter / Control;     │
//! │         link S into H.Sensors; registry.publish(S)                      │
//! │                                                                         │
//! │  revoke(H)                                                              │
//! │    remove H from the map                                                │
//! │    revoke children depth-first (sensors → their parameters/control,     │
//! │    then sub-hardware), each before its owner                            │
//! │    unlink H from its parent, registry.update(parent)                    │
//! │    registry.revoke(H)                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Registry failures are logged and dropped: the map is updated regardless
//! and nothing is retried.

use std::collections::BTreeMap;

use hwmirror_core::Identifier;
use tracing::{debug, info, warn};

use crate::error::MirrorResult;
use crate::instance::MirrorInstance;
use crate::node::{HardwareSnapshot, SensorSnapshot};
use crate::tree::TreeEvent;

// =============================================================================
// Registry Contract
// =============================================================================

/// External registration of published instances.
pub trait InstanceRegistry {
    /// Exposes a new instance.
    fn publish(&mut self, instance: &MirrorInstance) -> MirrorResult<()>;

    /// Replaces an exposed instance (its child-reference lists changed).
    fn update(&mut self, instance: &MirrorInstance) -> MirrorResult<()>;

    /// Withdraws an instance.
    fn revoke(&mut self, identifier: &Identifier) -> MirrorResult<()>;
}

#[derive(Debug)]
struct Entry {
    instance: MirrorInstance,
    exposed: bool,
}

// =============================================================================
// Publish Mirror
// =============================================================================

pub struct PublishMirror<R: InstanceRegistry> {
    registry: R,
    instances: BTreeMap<Identifier, Entry>,
}

impl<R: InstanceRegistry> PublishMirror<R> {
    /// Publishes every visible hardware subtree.
    pub fn new(registry: R, visible: &[HardwareSnapshot]) -> Self {
        let mut mirror = PublishMirror {
            registry,
            instances: BTreeMap::new(),
        };
        for hardware in visible {
            mirror.publish_hardware(hardware);
        }
        info!(instances = mirror.instances.len(), "Publish mirror ready");
        mirror
    }

    /// Applies one tree event.
    pub fn apply(&mut self, event: &TreeEvent) {
        match event {
            TreeEvent::HardwareAdded(hardware) => self.publish_hardware(hardware),
            TreeEvent::HardwareRemoved(hardware) => self.revoke(&hardware.identifier),
            TreeEvent::SensorAdded(sensor) => self.publish_sensor(sensor),
            TreeEvent::SensorRemoved(sensor) => self.revoke(&sensor.identifier),
        }
    }

    pub fn publish_hardware(&mut self, hardware: &HardwareSnapshot) {
        let identifier = &hardware.identifier;
        if self.instances.contains_key(identifier) {
            return;
        }

        self.insert(MirrorInstance::hardware(hardware));
        for sub in &hardware.sub_hardware {
            self.publish_hardware(sub);
        }
        self.expose(identifier);

        for sensor in &hardware.sensors {
            self.publish_sensor(sensor);
        }
    }

    pub fn publish_sensor(&mut self, sensor: &SensorSnapshot) {
        let identifier = &sensor.identifier;
        if self.instances.contains_key(identifier) {
            return;
        }

        self.instances.insert(
            identifier.clone(),
            Entry {
                instance: MirrorInstance::sensor(sensor),
                exposed: false,
            },
        );
        for parameter in &sensor.parameters {
            if !self.instances.contains_key(&parameter.identifier) {
                self.insert(MirrorInstance::parameter(parameter));
                self.expose(&parameter.identifier);
            }
        }
        if let Some(control) = &sensor.control {
            if !self.instances.contains_key(&control.identifier) {
                self.insert(MirrorInstance::control(control));
                self.expose(&control.identifier);
            }
        }

        self.link(&sensor.hardware, identifier);
        self.expose(identifier);
    }

    /// Withdraws an instance and everything below it. Absent identifiers
    /// are ignored.
    pub fn revoke(&mut self, identifier: &Identifier) {
        let Some(entry) = self.instances.remove(identifier) else {
            return;
        };

        for child in entry.instance.children() {
            self.revoke(&child);
        }
        if let Some(parent) = &entry.instance.parent {
            self.unlink(parent, identifier);
        }
        if let Err(e) = self.registry.revoke(identifier) {
            warn!(instance = %identifier, error = %e, "Registry refused revoke");
        }
        debug!(instance = %identifier, "Instance revoked");
    }

    /// Revokes every remaining top-level instance.
    pub fn dispose(&mut self) {
        let roots: Vec<Identifier> = self
            .instances
            .iter()
            .filter(|(_, e)| {
                e.instance
                    .parent
                    .as_ref()
                    .map_or(true, |p| !self.instances.contains_key(p))
            })
            .map(|(id, _)| id.clone())
            .collect();
        for root in roots {
            self.revoke(&root);
        }
        info!("Publish mirror disposed");
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.instances.contains_key(identifier)
    }

    pub fn get(&self, identifier: &Identifier) -> Option<&MirrorInstance> {
        self.instances.get(identifier).map(|e| &e.instance)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Inserts an instance and links it under its parent.
    fn insert(&mut self, instance: MirrorInstance) {
        let identifier = instance.identifier.clone();
        let parent = instance.parent.clone();
        self.instances.insert(
            identifier.clone(),
            Entry {
                instance,
                exposed: false,
            },
        );
        if let Some(parent) = parent {
            self.link(&parent, &identifier);
        }
    }

    fn expose(&mut self, identifier: &Identifier) {
        let Some(entry) = self.instances.get_mut(identifier) else {
            return;
        };
        match self.registry.publish(&entry.instance) {
            Ok(()) => entry.exposed = true,
            Err(e) => warn!(instance = %identifier, error = %e, "Registry refused publish"),
        }
    }

    fn link(&mut self, parent: &Identifier, child: &Identifier) {
        let Some(kind) = self.instances.get(child).map(|e| e.instance.kind()) else {
            return;
        };
        let Some(entry) = self.instances.get_mut(parent) else {
            return;
        };
        if entry.instance.add_child(kind, child.clone()) && entry.exposed {
            if let Err(e) = self.registry.update(&entry.instance) {
                warn!(instance = %parent, error = %e, "Registry refused update");
            }
        }
    }

    fn unlink(&mut self, parent: &Identifier, child: &Identifier) {
        let Some(entry) = self.instances.get_mut(parent) else {
            return;
        };
        if entry.instance.remove_child(child) && entry.exposed {
            if let Err(e) = self.registry.update(&entry.instance) {
                warn!(instance = %parent, error = %e, "Registry refused update");
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{HardwareDescription, SensorDescription, StaticEngine};
    use crate::error::MirrorError;
    use crate::tree::HardwareTree;
    use hwmirror_core::{CategoryFlags, HardwareType, SensorType, Settings};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Publish(String),
        Update(String),
        Revoke(String),
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op>,
        refuse: Option<String>,
    }

    impl Recorder {
        fn revokes(&self) -> Vec<String> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Revoke(id) => Some(id.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl InstanceRegistry for Recorder {
        fn publish(&mut self, instance: &MirrorInstance) -> MirrorResult<()> {
            if self.refuse.as_deref() == Some(instance.identifier.as_str()) {
                return Err(MirrorError::PublishRejected {
                    identifier: instance.identifier.clone(),
                    reason: "test".into(),
                });
            }
            self.ops.push(Op::Publish(instance.identifier.to_string()));
            Ok(())
        }

        fn update(&mut self, instance: &MirrorInstance) -> MirrorResult<()> {
            self.ops.push(Op::Update(instance.identifier.to_string()));
            Ok(())
        }

        fn revoke(&mut self, identifier: &Identifier) -> MirrorResult<()> {
            self.ops.push(Op::Revoke(identifier.to_string()));
            Ok(())
        }
    }

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    fn tree() -> (Arc<StaticEngine>, HardwareTree) {
        let engine = Arc::new(StaticEngine::new());
        let cpu = id("/intelcpu/0");
        engine.insert_hardware(
            HardwareDescription::new(cpu.clone(), "Core i7-13700K", HardwareType::CPU).with_sensor(
                SensorDescription::new(&cpu, "CPU Package", SensorType::Temperature, 0)
                    .with_parameter("TjMax", "Junction limit", 100.0),
            ),
        );
        let mut tree = HardwareTree::new(engine.clone(), Settings::in_memory(), CategoryFlags::all());
        tree.open();
        tree.drain_events();
        (engine, tree)
    }

    #[test]
    fn test_construction_publishes_visible_tree() {
        let (_engine, tree) = tree();
        let mirror = PublishMirror::new(Recorder::default(), &tree.visible_snapshots());

        assert_eq!(mirror.len(), 3);
        assert_eq!(
            mirror.registry().ops,
            vec![
                Op::Publish("/intelcpu/0".into()),
                Op::Publish("/intelcpu/0/temperature/0/parameter/tjmax".into()),
                Op::Update("/intelcpu/0".into()),
                Op::Publish("/intelcpu/0/temperature/0".into()),
            ]
        );
        let hw = mirror.get(&id("/intelcpu/0")).unwrap();
        assert_eq!(hw.children(), vec![id("/intelcpu/0/temperature/0")]);
    }

    #[test]
    fn test_publish_is_idempotent() {
        let (_engine, tree) = tree();
        let snapshots = tree.visible_snapshots();
        let mut mirror = PublishMirror::new(Recorder::default(), &snapshots);
        let before = mirror.registry().ops.len();

        mirror.publish_hardware(&snapshots[0]);
        mirror.publish_sensor(&snapshots[0].sensors[0]);
        assert_eq!(mirror.registry().ops.len(), before);
    }

    #[test]
    fn test_revoke_cascades_children_first() {
        let (_engine, tree) = tree();
        let mut mirror = PublishMirror::new(Recorder::default(), &tree.visible_snapshots());

        mirror.revoke(&id("/intelcpu/0"));
        assert_eq!(
            mirror.registry().revokes(),
            vec![
                "/intelcpu/0/temperature/0/parameter/tjmax".to_string(),
                "/intelcpu/0/temperature/0".to_string(),
                "/intelcpu/0".to_string(),
            ]
        );
        assert!(mirror.is_empty());

        mirror.revoke(&id("/intelcpu/0"));
        assert_eq!(mirror.registry().revokes().len(), 3);
    }

    #[test]
    fn test_sensor_events_link_and_unlink() {
        let (engine, mut tree) = tree();
        let mut mirror = PublishMirror::new(Recorder::default(), &tree.visible_snapshots());

        let cpu = id("/intelcpu/0");
        let clock = SensorDescription::new(&cpu, "Bus Speed", SensorType::Clock, 0);
        engine.insert_sensor(&cpu, clock.clone());
        tree.add_sensor(&cpu, &clock.identifier);
        for event in tree.drain_events() {
            mirror.apply(&event);
        }
        assert_eq!(mirror.get(&cpu).unwrap().children().len(), 2);

        tree.remove_sensor(&cpu, &clock.identifier);
        for event in tree.drain_events() {
            mirror.apply(&event);
        }
        assert_eq!(mirror.get(&cpu).unwrap().children().len(), 1);
        assert!(!mirror.contains(&clock.identifier));
    }

    #[test]
    fn test_refused_publish_keeps_map_entry() {
        let (_engine, tree) = tree();
        let recorder = Recorder {
            refuse: Some("/intelcpu/0/temperature/0".into()),
            ..Recorder::default()
        };
        let mirror = PublishMirror::new(recorder, &tree.visible_snapshots());

        assert!(mirror.contains(&id("/intelcpu/0/temperature/0")));
        assert!(!mirror
            .registry()
            .ops
            .contains(&Op::Publish("/intelcpu/0/temperature/0".into())));
    }

    #[test]
    fn test_dispose_empties_the_mirror() {
        let (_engine, mut tree) = tree();
        let mut mirror = PublishMirror::new(Recorder::default(), &tree.visible_snapshots());

        tree.close();
        for event in tree.drain_events() {
            mirror.apply(&event);
        }
        assert!(mirror.is_empty());

        mirror.dispose();
        assert!(mirror.is_empty());
    }
}
