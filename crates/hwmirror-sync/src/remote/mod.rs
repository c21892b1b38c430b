//! # Remote Mirror
//!
//! Client-side reconstruction of the hardware tree from an
//! [`InstanceSource`]: one bulk enumeration at open, then creation/deletion
//! events from the feed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  open():  enumerate_hardware() ──► RemoteHardware (New) ──► categories  │
//! │                                                                         │
//! │  feed:    Created  Hardware ──► add_hardware    (top level only)        │
//! │           Deleted  Hardware ──► remove_hardware                         │
//! │           Created  Sensor   ──► add_sensor      (owner must be known)   │
//! │           Deleted  Sensor   ──► remove_sensor                           │
//! │                                                                         │
//! │  update(): poll every sensor value; instances that vanished keep their  │
//! │            previous value until the deletion event arrives              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events may arrive out of order with respect to the enumeration. Every
//! handler tolerates a missing target: duplicates are ignored, unknown
//! owners and vanished instances are dropped with a debug log.

mod agent;
mod proxy;

pub use agent::{RemoteConfig, RemoteMirrorAgent, RemoteMirrorHandle};
pub use proxy::{
    ControlView, HardwareView, ParameterView, RemoteControl, RemoteHardware, RemoteParameter,
    RemoteSensor, SensorView,
};

use std::sync::Arc;

use chrono::Utc;
use hwmirror_core::{CategoryFlags, ElementState, HardwareCategory, Identifier, Settings};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{MirrorError, MirrorResult};
use crate::feed::{InstanceEvent, InstanceEventKind};
use crate::schema::EntityKind;
use crate::source::InstanceSource;

// =============================================================================
// Events and Views
// =============================================================================

/// Structural change observed by the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RemoteEvent {
    HardwareAdded(Identifier),
    HardwareRemoved(Identifier),
    SensorAdded { hardware: Identifier, sensor: Identifier },
    SensorRemoved { hardware: Identifier, sensor: Identifier },
}

/// Serializable view of the visible remote tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoteTreeView {
    pub hardware: Vec<HardwareView>,
}

// =============================================================================
// Remote Mirror
// =============================================================================

pub struct RemoteMirror<S: InstanceSource> {
    source: Arc<S>,
    settings: Settings,
    hardware: Vec<RemoteHardware>,
    categories: CategoryFlags,
    open: bool,
    events: Vec<RemoteEvent>,
}

impl<S: InstanceSource> RemoteMirror<S> {
    /// Creates a closed mirror. Names, overrides and histories are kept in
    /// `settings`, independent of the publishing side.
    pub fn new(source: Arc<S>, settings: Settings, categories: CategoryFlags) -> Self {
        RemoteMirror {
            source,
            settings,
            hardware: Vec::new(),
            categories,
            open: false,
            events: Vec::new(),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn categories(&self) -> CategoryFlags {
        self.categories
    }

    pub fn hardware(&self) -> &[RemoteHardware] {
        &self.hardware
    }

    /// Enumerates the source and applies the category filter. No-op when
    /// already open.
    pub fn open(&mut self) {
        if self.open {
            return;
        }
        let now = Utc::now();
        for record in self.source.enumerate_hardware() {
            if self.position(&record.identifier).is_none() {
                let hardware =
                    RemoteHardware::build(self.source.as_ref(), &self.settings, record, ElementState::New, now);
                self.hardware.push(hardware);
            }
        }
        self.open = true;
        self.apply_categories();
        info!(hardware = self.hardware.len(), "Remote mirror opened");
    }

    /// Hides everything, stores histories and forgets the tree. No-op when
    /// already closed.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        for category in HardwareCategory::ALL {
            self.hide(category);
        }
        for hardware in &self.hardware {
            hardware.close(&self.settings);
        }
        self.hardware.clear();
        self.open = false;
        info!("Remote mirror closed");
    }

    pub fn set_category(&mut self, category: HardwareCategory, enabled: bool) {
        if self.categories.get(category) == enabled {
            return;
        }
        self.categories.set(category, enabled);
        if self.open {
            if enabled {
                self.show(category);
            } else {
                self.hide(category);
            }
        }
    }

    fn apply_categories(&mut self) {
        for category in HardwareCategory::ALL {
            if self.categories.get(category) {
                self.show(category);
            } else {
                self.hide(category);
            }
        }
    }

    fn show(&mut self, category: HardwareCategory) {
        for hardware in &mut self.hardware {
            if hardware.hardware_type().category() == Some(category)
                && hardware.state() != ElementState::Visible
            {
                hardware.set_state(ElementState::Visible);
                self.events
                    .push(RemoteEvent::HardwareAdded(hardware.identifier().clone()));
            }
        }
    }

    fn hide(&mut self, category: HardwareCategory) {
        for hardware in &mut self.hardware {
            if hardware.hardware_type().category() != Some(category) {
                continue;
            }
            if hardware.state() == ElementState::Visible {
                self.events
                    .push(RemoteEvent::HardwareRemoved(hardware.identifier().clone()));
            }
            hardware.set_state(ElementState::Hidden);
        }
    }

    fn position(&self, identifier: &Identifier) -> Option<usize> {
        self.hardware.iter().position(|h| h.identifier() == identifier)
    }

    // =========================================================================
    // Feed Events
    // =========================================================================

    /// Applies one structural event from the feed.
    pub fn handle_event(&mut self, event: &InstanceEvent) {
        let identifier = match Identifier::parse(&event.identifier) {
            Ok(identifier) => identifier,
            Err(e) => {
                warn!(identifier = %event.identifier, error = %e, "Ignoring event with invalid identifier");
                return;
            }
        };
        let parent = if event.parent.is_empty() {
            None
        } else {
            match Identifier::parse(&event.parent) {
                Ok(parent) => Some(parent),
                Err(e) => {
                    warn!(parent = %event.parent, error = %e, "Ignoring event with invalid parent");
                    return;
                }
            }
        };

        debug!(kind = ?event.kind, class = %event.class, identifier = %identifier, "Remote event");
        match (event.kind, event.class, parent) {
            (InstanceEventKind::Created, EntityKind::Hardware, parent) => {
                self.add_hardware(&identifier, parent.as_ref());
            }
            (InstanceEventKind::Deleted, EntityKind::Hardware, parent) => {
                self.remove_hardware(&identifier, parent.as_ref());
            }
            (InstanceEventKind::Created, EntityKind::Sensor, Some(parent)) => {
                self.add_sensor(&parent, &identifier);
            }
            (InstanceEventKind::Deleted, EntityKind::Sensor, Some(parent)) => {
                self.remove_sensor(&parent, &identifier);
            }
            (_, EntityKind::Sensor, None) => {
                debug!(sensor = %identifier, "Dropping sensor event without parent");
            }
            _ => {}
        }
    }

    /// Fetches and tracks a newly published top-level hardware.
    pub fn add_hardware(&mut self, identifier: &Identifier, parent: Option<&Identifier>) -> bool {
        if parent.is_some() || !self.open || self.position(identifier).is_some() {
            return false;
        }
        let record = match self.source.hardware(identifier) {
            Ok(record) => record,
            Err(e) => {
                debug!(hardware = %identifier, error = %e, "Dropping hardware event, instance unavailable");
                return false;
            }
        };
        let hardware = RemoteHardware::build(
            self.source.as_ref(),
            &self.settings,
            record,
            ElementState::Hidden,
            Utc::now(),
        );
        let category = hardware.hardware_type().category();
        self.hardware.push(hardware);

        if let Some(category) = category.filter(|c| self.categories.get(*c)) {
            self.show(category);
        }
        true
    }

    pub fn remove_hardware(&mut self, identifier: &Identifier, parent: Option<&Identifier>) -> bool {
        if parent.is_some() {
            return false;
        }
        let Some(position) = self.position(identifier) else {
            return false;
        };
        let hardware = self.hardware.remove(position);
        hardware.close(&self.settings);
        if hardware.state() == ElementState::Visible {
            self.events
                .push(RemoteEvent::HardwareRemoved(identifier.clone()));
        }
        true
    }

    /// Top-level hardware that is or contains `identifier`, with its
    /// visibility.
    fn owner_mut(&mut self, identifier: &Identifier) -> Option<(&mut RemoteHardware, bool)> {
        self.hardware.iter_mut().find_map(|top| {
            let visible = top.state() == ElementState::Visible;
            top.find_mut(identifier).map(|owner| (owner, visible))
        })
    }

    pub fn add_sensor(&mut self, parent: &Identifier, identifier: &Identifier) -> bool {
        if !self.open {
            return false;
        }
        let source = Arc::clone(&self.source);
        let settings = self.settings.clone();
        let Some((owner, visible)) = self.owner_mut(parent) else {
            debug!(sensor = %identifier, hardware = %parent, "Dropping sensor event for unknown hardware");
            return false;
        };
        if !owner.add_sensor(source.as_ref(), &settings, identifier, Utc::now()) {
            return false;
        }
        if visible {
            self.events.push(RemoteEvent::SensorAdded {
                hardware: parent.clone(),
                sensor: identifier.clone(),
            });
        }
        true
    }

    pub fn remove_sensor(&mut self, parent: &Identifier, identifier: &Identifier) -> bool {
        let settings = self.settings.clone();
        let Some((owner, visible)) = self.owner_mut(parent) else {
            return false;
        };
        if !owner.remove_sensor(&settings, identifier) {
            return false;
        }
        if visible {
            self.events.push(RemoteEvent::SensorRemoved {
                hardware: parent.clone(),
                sensor: identifier.clone(),
            });
        }
        true
    }

    // =========================================================================
    // Values and Actions
    // =========================================================================

    /// Polls every visible sensor.
    pub fn update(&mut self) {
        let now = Utc::now();
        let source = Arc::clone(&self.source);
        for hardware in self
            .hardware
            .iter_mut()
            .filter(|h| h.state() == ElementState::Visible)
        {
            hardware.update(source.as_ref(), now);
        }
    }

    pub fn find_sensor(&self, identifier: &Identifier) -> Option<&RemoteSensor> {
        self.hardware.iter().find_map(|h| h.find_sensor(identifier))
    }

    fn sensor_mut(&mut self, identifier: &Identifier) -> MirrorResult<&mut RemoteSensor> {
        self.hardware
            .iter_mut()
            .find_map(|h| h.find_sensor_mut(identifier))
            .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))
    }

    fn child_owner_mut(&mut self, child: &Identifier) -> MirrorResult<&mut RemoteSensor> {
        self.hardware
            .iter_mut()
            .find_map(|h| h.owner_of_mut(child))
            .ok_or_else(|| MirrorError::InstanceGone(child.clone()))
    }

    pub fn find_hardware(&self, identifier: &Identifier) -> Option<&RemoteHardware> {
        self.hardware.iter().find_map(|h| h.find_hardware(identifier))
    }

    pub fn set_hardware_name(&mut self, identifier: &Identifier, name: &str) -> MirrorResult<()> {
        let settings = self.settings.clone();
        self.hardware
            .iter_mut()
            .find_map(|h| h.find_hardware_mut(identifier))
            .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))?
            .set_name(&settings, name);
        Ok(())
    }

    /// Engine report of one hardware, fetched through the source.
    pub fn report(&self, identifier: &Identifier) -> MirrorResult<String> {
        self.find_hardware(identifier)
            .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))?
            .report(self.source.as_ref())
    }

    pub fn set_sensor_name(&mut self, identifier: &Identifier, name: &str) -> MirrorResult<()> {
        let settings = self.settings.clone();
        self.sensor_mut(identifier)?.set_name(&settings, name);
        Ok(())
    }

    pub fn reset_min(&mut self, identifier: &Identifier) -> MirrorResult<()> {
        self.sensor_mut(identifier)?.reset_min();
        Ok(())
    }

    pub fn reset_max(&mut self, identifier: &Identifier) -> MirrorResult<()> {
        self.sensor_mut(identifier)?.reset_max();
        Ok(())
    }

    pub fn set_parameter_value(&mut self, identifier: &Identifier, value: f32) -> MirrorResult<()> {
        let source = Arc::clone(&self.source);
        let settings = self.settings.clone();
        self.child_owner_mut(identifier)?
            .parameter_mut(identifier)
            .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))?
            .set_value(source.as_ref(), &settings, value)
    }

    pub fn set_parameter_default(&mut self, identifier: &Identifier) -> MirrorResult<()> {
        let source = Arc::clone(&self.source);
        let settings = self.settings.clone();
        self.child_owner_mut(identifier)?
            .parameter_mut(identifier)
            .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))?
            .set_default(source.as_ref(), &settings)
    }

    pub fn set_control_default(&mut self, identifier: &Identifier) -> MirrorResult<()> {
        let source = Arc::clone(&self.source);
        let settings = self.settings.clone();
        self.child_owner_mut(identifier)?
            .control_mut(identifier)
            .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))?
            .set_default(source.as_ref(), &settings)
    }

    pub fn set_control_software(&mut self, identifier: &Identifier, value: f32) -> MirrorResult<()> {
        let source = Arc::clone(&self.source);
        let settings = self.settings.clone();
        self.child_owner_mut(identifier)?
            .control_mut(identifier)
            .ok_or_else(|| MirrorError::InstanceGone(identifier.clone()))?
            .set_software(source.as_ref(), &settings, value)
    }

    /// Takes the queued structural notifications.
    pub fn drain_events(&mut self) -> Vec<RemoteEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> RemoteTreeView {
        RemoteTreeView {
            hardware: self
                .hardware
                .iter()
                .filter(|h| h.state() == ElementState::Visible)
                .map(RemoteHardware::view)
                .collect(),
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
    use crate::feed::{EventFeed, FeedConfig};
    use crate::namespace::Namespace;
    use crate::publish::PublishMirror;
    use crate::tree::HardwareTree;
    use hwmirror_core::{ControlMode, HardwareType, SensorType};

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    struct Fixture {
        engine: Arc<StaticEngine>,
        tree: HardwareTree,
        publisher: PublishMirror<Namespace>,
        namespace: Arc<Namespace>,
    }

    impl Fixture {
        fn new() -> Self {
            let engine = Arc::new(StaticEngine::new());
            let mut tree = HardwareTree::new(engine.clone(), Settings::in_memory(), CategoryFlags::all());
            tree.open();
            tree.drain_events();
            let namespace = Namespace::new(EventFeed::start(FeedConfig::immediate()));
            let publisher = PublishMirror::new(namespace.clone(), &tree.visible_snapshots());
            Fixture {
                engine,
                tree,
                publisher,
                namespace: Arc::new(namespace),
            }
        }

        fn sync(&mut self) {
            for event in self.tree.drain_events() {
                self.publisher.apply(&event);
            }
        }

        fn add(&mut self, description: HardwareDescription) {
            let identifier = description.identifier.clone();
            self.engine.insert_hardware(description);
            self.tree.add_hardware(&identifier, None);
            self.sync();
        }

        fn remote(&self) -> RemoteMirror<Namespace> {
            RemoteMirror::new(Arc::clone(&self.namespace), Settings::in_memory(), CategoryFlags::all())
        }
    }

    fn cpu() -> HardwareDescription {
        let cpu = id("/intelcpu/0");
        HardwareDescription::new(cpu.clone(), "Core i7", HardwareType::CPU)
            .with_sensor(SensorDescription::new(&cpu, "Core #1", SensorType::Temperature, 0))
    }

    fn fan() -> HardwareDescription {
        let board = id("/mainboard");
        HardwareDescription::new(board.clone(), "Board", HardwareType::Mainboard).with_sensor(
            SensorDescription::new(&board, "CPU Fan", SensorType::Control, 0)
                .with_parameter("Offset", "Added to the reading", 0.0)
                .with_control(0.0, 100.0),
        )
    }

    fn created(class: EntityKind, identifier: &str, parent: &str) -> InstanceEvent {
        InstanceEvent {
            kind: InstanceEventKind::Created,
            class,
            identifier: identifier.to_string(),
            parent: parent.to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_reconstructs_published_tree() {
        let mut fixture = Fixture::new();
        fixture.add(cpu());
        fixture.engine.set_value(&id("/intelcpu/0/temperature/0"), 48.0);
        fixture.tree.update();

        let mut remote = fixture.remote();
        remote.open();

        assert_eq!(remote.drain_events(), vec![RemoteEvent::HardwareAdded(id("/intelcpu/0"))]);
        let sensor = remote.find_sensor(&id("/intelcpu/0/temperature/0")).unwrap();
        assert_eq!(sensor.name(), "Core #1");
        assert_eq!(sensor.value(), Some(48.0));
        assert_eq!(sensor.hardware(), &id("/intelcpu/0"));
    }

    #[tokio::test]
    async fn test_sensor_before_hardware_is_dropped_then_recovered() {
        let mut fixture = Fixture::new();
        let mut remote = fixture.remote();
        remote.open();
        fixture.add(cpu());

        let sensor = created(EntityKind::Sensor, "/intelcpu/0/temperature/0", "/intelcpu/0");
        let hardware = created(EntityKind::Hardware, "/intelcpu/0", "");

        remote.handle_event(&sensor);
        assert!(remote.find_sensor(&id("/intelcpu/0/temperature/0")).is_none());

        remote.handle_event(&hardware);
        remote.handle_event(&sensor);
        let found = remote.find_sensor(&id("/intelcpu/0/temperature/0")).unwrap();
        assert_eq!(found.hardware(), &id("/intelcpu/0"));
        assert_eq!(remote.hardware().len(), 1);
        assert_eq!(remote.hardware()[0].sensors().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_child_hardware_events_ignored() {
        let mut fixture = Fixture::new();
        fixture.add(cpu());
        let mut remote = fixture.remote();
        remote.open();
        remote.drain_events();

        assert!(!remote.add_hardware(&id("/intelcpu/0"), None));
        assert!(!remote.add_hardware(&id("/lpc/nct6798d"), Some(&id("/mainboard"))));
        assert!(remote.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_stale_value_kept_when_instance_gone() {
        let mut fixture = Fixture::new();
        fixture.add(cpu());
        let sensor_id = id("/intelcpu/0/temperature/0");
        fixture.engine.set_value(&sensor_id, 51.0);
        fixture.tree.update();

        let mut remote = fixture.remote();
        remote.open();
        remote.update();
        assert_eq!(remote.find_sensor(&sensor_id).unwrap().value(), Some(51.0));

        fixture.publisher.revoke(&id("/intelcpu/0"));
        remote.update();
        assert_eq!(remote.find_sensor(&sensor_id).unwrap().value(), Some(51.0));
    }

    #[tokio::test]
    async fn test_hidden_category_suppresses_events() {
        let mut fixture = Fixture::new();
        fixture.add(cpu());
        let mut remote = RemoteMirror::new(
            Arc::clone(&fixture.namespace),
            Settings::in_memory(),
            CategoryFlags::default(),
        );
        remote.open();
        assert!(remote.drain_events().is_empty());
        assert!(remote.snapshot().hardware.is_empty());

        remote.set_category(HardwareCategory::Cpu, true);
        assert_eq!(remote.drain_events(), vec![RemoteEvent::HardwareAdded(id("/intelcpu/0"))]);

        assert!(remote.remove_hardware(&id("/intelcpu/0"), None));
        assert_eq!(remote.drain_events(), vec![RemoteEvent::HardwareRemoved(id("/intelcpu/0"))]);
    }

    #[tokio::test]
    async fn test_invalid_identifier_event_ignored() {
        let fixture = Fixture::new();
        let mut remote = fixture.remote();
        remote.open();
        remote.handle_event(&created(EntityKind::Hardware, "no leading slash", ""));
        assert!(remote.hardware().is_empty());
    }

    #[tokio::test]
    async fn test_parameter_override_reapplied_on_build() {
        let mut fixture = Fixture::new();
        fixture.add(fan());
        let parameter = id("/mainboard/control/0/parameter/offset");

        let client_settings = Settings::in_memory();
        client_settings.set_f32(parameter.as_str(), 3.5);
        let mut remote = RemoteMirror::new(
            Arc::clone(&fixture.namespace),
            client_settings,
            CategoryFlags::all(),
        );
        remote.open();

        let record = fixture.namespace.parameter(&parameter).unwrap();
        assert_eq!(record.value, 3.5);
        assert!(!record.is_default);
    }

    #[tokio::test]
    async fn test_control_actions_round_trip_to_engine() {
        let mut fixture = Fixture::new();
        fixture.add(fan());
        let control = id("/mainboard/control/0/control");
        let mut remote = fixture.remote();
        remote.open();

        remote.set_control_software(&control, 140.0).unwrap();
        let record = fixture.namespace.control(&control).unwrap();
        assert_eq!(record.mode, ControlMode::Software);
        assert_eq!(record.software_value, 100.0);

        remote.set_control_default(&control).unwrap();
        remote.update();
        let sensor = remote.find_sensor(&id("/mainboard/control/0")).unwrap();
        assert_eq!(sensor.control().unwrap().mode(), ControlMode::Default);
    }

    #[tokio::test]
    async fn test_close_flushes_history_into_client_settings() {
        let mut fixture = Fixture::new();
        fixture.add(cpu());
        let sensor_id = id("/intelcpu/0/temperature/0");
        let client_settings = Settings::in_memory();
        let mut remote = RemoteMirror::new(
            Arc::clone(&fixture.namespace),
            client_settings.clone(),
            CategoryFlags::all(),
        );
        remote.open();

        for value in [40.0, 41.0, 42.0, 43.0] {
            fixture.engine.set_value(&sensor_id, value);
            fixture.tree.update();
            remote.update();
        }
        remote.close();

        assert!(client_settings.contains(&sensor_id.settings_key("values")));
        assert!(remote.hardware().is_empty());
        assert!(!remote.is_open());
    }

    #[tokio::test]
    async fn test_hardware_name_override_is_local_and_restored() {
        let mut fixture = Fixture::new();
        fixture.add(cpu());
        let cpu_id = id("/intelcpu/0");
        let client_settings = Settings::in_memory();
        let mut remote = RemoteMirror::new(
            Arc::clone(&fixture.namespace),
            client_settings.clone(),
            CategoryFlags::all(),
        );
        remote.open();

        remote.set_hardware_name(&cpu_id, "Workstation CPU").unwrap();
        assert_eq!(remote.find_hardware(&cpu_id).unwrap().name(), "Workstation CPU");
        assert_eq!(fixture.namespace.hardware(&cpu_id).unwrap().name, "Core i7");
        remote.close();

        let mut reopened = RemoteMirror::new(
            Arc::clone(&fixture.namespace),
            client_settings.clone(),
            CategoryFlags::all(),
        );
        reopened.open();
        assert_eq!(reopened.find_hardware(&cpu_id).unwrap().name(), "Workstation CPU");

        reopened.set_hardware_name(&cpu_id, "").unwrap();
        assert_eq!(reopened.find_hardware(&cpu_id).unwrap().name(), "Core i7");
        assert!(!client_settings.contains(&cpu_id.settings_key("name")));
        assert!(reopened.set_hardware_name(&id("/ram"), "x").is_err());
    }

    #[tokio::test]
    async fn test_report_is_fetched_from_the_source() {
        let mut fixture = Fixture::new();
        fixture.add(cpu());
        let mut remote = fixture.remote();
        remote.open();

        let report = remote.report(&id("/intelcpu/0")).unwrap();
        let direct = fixture
            .namespace
            .invoke(&id("/intelcpu/0"), "GetReport", &[])
            .unwrap()
            .unwrap();
        assert_eq!(Some(report.as_str()), direct.as_str());
        assert!(remote.report(&id("/ram")).unwrap_err().is_transient());

        fixture.publisher.revoke(&id("/intelcpu/0"));
        assert!(remote.report(&id("/intelcpu/0")).unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_construction_does_not_count_towards_downsampling() {
        let mut fixture = Fixture::new();
        fixture.add(cpu());
        let sensor_id = id("/intelcpu/0/temperature/0");
        fixture.engine.set_value(&sensor_id, 40.0);
        fixture.tree.update();

        let mut remote = fixture.remote();
        remote.open();
        assert_eq!(remote.find_sensor(&sensor_id).unwrap().value(), Some(40.0));

        for value in [41.0, 42.0, 43.0] {
            fixture.engine.set_value(&sensor_id, value);
            fixture.tree.update();
            remote.update();
        }
        assert!(remote.find_sensor(&sensor_id).unwrap().history().is_empty());

        fixture.engine.set_value(&sensor_id, 44.0);
        fixture.tree.update();
        remote.update();
        let history = remote.find_sensor(&sensor_id).unwrap().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].value(), 42.5);
    }

    #[tokio::test]
    async fn test_parameter_named_control_routes_to_its_sensor() {
        let mut fixture = Fixture::new();
        let board = id("/mainboard");
        fixture.add(
            HardwareDescription::new(board.clone(), "Board", HardwareType::Mainboard).with_sensor(
                SensorDescription::new(&board, "CPU Fan", SensorType::Control, 0)
                    .with_parameter("Control", "Curve selector", 1.0)
                    .with_control(0.0, 100.0),
            ),
        );
        let parameter = id("/mainboard/control/0/parameter/control");
        let mut remote = fixture.remote();
        remote.open();

        remote.set_parameter_value(&parameter, 2.0).unwrap();
        assert_eq!(fixture.namespace.parameter(&parameter).unwrap().value, 2.0);

        remote.set_control_software(&id("/mainboard/control/0/control"), 30.0).unwrap();
        assert_eq!(
            fixture.namespace.control(&id("/mainboard/control/0/control")).unwrap().software_value,
            30.0
        );
    }

    #[tokio::test]
    async fn test_sensor_name_override_is_local() {
        let mut fixture = Fixture::new();
        fixture.add(cpu());
        let sensor_id = id("/intelcpu/0/temperature/0");
        let mut remote = fixture.remote();
        remote.open();

        remote.set_sensor_name(&sensor_id, "Package").unwrap();
        assert_eq!(remote.find_sensor(&sensor_id).unwrap().name(), "Package");
        assert_eq!(fixture.namespace.sensor(&sensor_id).unwrap().name, "Core #1");

        remote.set_sensor_name(&sensor_id, "").unwrap();
        assert_eq!(remote.find_sensor(&sensor_id).unwrap().name(), "Core #1");
        assert!(remote.set_sensor_name(&id("/ram"), "x").is_err());
    }
}
