//! # Hardware Tree
//!
//! The canonical engine-side model: top-level hardware nodes, their
//! visibility state machine and the category filter.
//!
//! ## Visibility
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   open()          ─► every engine hardware built in state New           │
//! │                      enabled categories shown ─► HardwareAdded          │
//! │                                                                         │
//! │   add_hardware()  ─► built in state Hidden, categories re-applied       │
//! │                                                                         │
//! │   set_category(c, false) ─► Visible ─► Hidden   HardwareRemoved         │
//! │   set_category(c, true)  ─► New/Hidden ─► Visible   HardwareAdded       │
//! │                                                                         │
//! │   remove_hardware() ─► history flushed, node dropped,                   │
//! │                        HardwareRemoved if it was Visible                │
//! │                                                                         │
//! │   close()         ─► every category hidden, history flushed, cleared    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Structural events go to an outbox the owner drains with
//! [`HardwareTree::drain_events`]. The tree is a plain value: whoever owns
//! it (the [`MonitorAgent`](crate::agent::MonitorAgent)) is the single
//! context allowed to mutate it.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use hwmirror_core::{CategoryFlags, ElementState, HardwareCategory, Identifier, Settings};
use tracing::{debug, info, warn};

use crate::engine::SensingEngine;
use crate::node::{
    Control, Hardware, HardwareSnapshot, NodeRef, Parameter, Sensor, SensorSnapshot, VisitorTable,
};

// =============================================================================
// Events
// =============================================================================

/// Structural change of the engine tree.
#[derive(Debug, Clone)]
pub enum TreeEvent {
    HardwareAdded(HardwareSnapshot),
    HardwareRemoved(HardwareSnapshot),
    SensorAdded(SensorSnapshot),
    SensorRemoved(SensorSnapshot),
}

impl TreeEvent {
    pub fn identifier(&self) -> &Identifier {
        match self {
            TreeEvent::HardwareAdded(h) | TreeEvent::HardwareRemoved(h) => &h.identifier,
            TreeEvent::SensorAdded(s) | TreeEvent::SensorRemoved(s) => &s.identifier,
        }
    }

    pub fn kind(&self) -> TreeEventKind {
        match self {
            TreeEvent::HardwareAdded(_) => TreeEventKind::HardwareAdded,
            TreeEvent::HardwareRemoved(_) => TreeEventKind::HardwareRemoved,
            TreeEvent::SensorAdded(_) => TreeEventKind::SensorAdded,
            TreeEvent::SensorRemoved(_) => TreeEventKind::SensorRemoved,
        }
    }
}

/// Payload-free form of [`TreeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TreeEventKind {
    HardwareAdded,
    HardwareRemoved,
    SensorAdded,
    SensorRemoved,
}

// =============================================================================
// Hardware Tree
// =============================================================================

pub struct HardwareTree {
    engine: Arc<dyn SensingEngine>,
    settings: Settings,
    hardware: Vec<Hardware>,
    categories: CategoryFlags,
    open: bool,
    events: Vec<TreeEvent>,
}

impl HardwareTree {
    pub fn new(engine: Arc<dyn SensingEngine>, settings: Settings, categories: CategoryFlags) -> Self {
        HardwareTree {
            engine,
            settings,
            hardware: Vec::new(),
            categories,
            open: false,
            events: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn categories(&self) -> CategoryFlags {
        self.categories
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Builds every engine hardware and shows enabled categories.
    pub fn open(&mut self) {
        if self.open {
            return;
        }

        for description in self.engine.hardware() {
            if self.position(&description.identifier).is_some() {
                continue;
            }
            self.hardware.push(Hardware::new(
                &description,
                None,
                ElementState::New,
                &self.settings,
                &self.engine,
            ));
        }

        self.open = true;
        self.apply_categories();
        info!(hardware = self.hardware.len(), "Hardware tree opened");
    }

    /// Hides everything, stores history and drops every node.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }

        for category in HardwareCategory::ALL {
            self.hide(category);
        }
        for hardware in &self.hardware {
            hardware.close();
        }
        self.hardware.clear();
        self.open = false;
        info!("Hardware tree closed");
    }

    /// Stores a category preference; shows or hides matching hardware while
    /// the tree is open.
    pub fn set_category(&mut self, category: HardwareCategory, enabled: bool) {
        if self.open && self.categories.get(category) != enabled {
            if enabled {
                self.show(category);
            } else {
                self.hide(category);
            }
        }
        self.categories.set(category, enabled);
    }

    fn apply_categories(&mut self) {
        let enabled: Vec<HardwareCategory> = self.categories.enabled().collect();
        for category in enabled {
            self.show(category);
        }
    }

    fn show(&mut self, category: HardwareCategory) {
        for hardware in &mut self.hardware {
            if hardware.hardware_type().category() == Some(category)
                && hardware.state() != ElementState::Visible
            {
                hardware.set_state(ElementState::Visible);
                self.events.push(TreeEvent::HardwareAdded(hardware.snapshot()));
            }
        }
    }

    fn hide(&mut self, category: HardwareCategory) {
        for hardware in &mut self.hardware {
            if hardware.hardware_type().category() == Some(category)
                && hardware.state() == ElementState::Visible
            {
                hardware.set_state(ElementState::Hidden);
                self.events.push(TreeEvent::HardwareRemoved(hardware.snapshot()));
            }
        }
    }

    // =========================================================================
    // Structural Mutation
    // =========================================================================

    fn position(&self, identifier: &Identifier) -> Option<usize> {
        self.hardware.iter().position(|h| h.identifier() == identifier)
    }

    /// Adds a top-level hardware node. Sub-hardware (non-empty parent) and
    /// known identifiers are ignored. Returns true if a node was built.
    pub fn add_hardware(&mut self, identifier: &Identifier, parent: Option<&Identifier>) -> bool {
        if parent.is_some() || !self.open || self.position(identifier).is_some() {
            return false;
        }

        let Some(description) = self.engine.describe_hardware(identifier) else {
            warn!(hardware = %identifier, "Engine has no description for added hardware");
            return false;
        };

        self.hardware.push(Hardware::new(
            &description,
            None,
            ElementState::Hidden,
            &self.settings,
            &self.engine,
        ));
        debug!(hardware = %identifier, "Hardware added");
        self.apply_categories();
        true
    }

    /// Removes a top-level hardware node. Returns true if one was removed.
    pub fn remove_hardware(&mut self, identifier: &Identifier, parent: Option<&Identifier>) -> bool {
        if parent.is_some() {
            return false;
        }
        let Some(position) = self.position(identifier) else {
            return false;
        };

        let hardware = self.hardware.remove(position);
        hardware.close();
        if hardware.state() == ElementState::Visible {
            self.events.push(TreeEvent::HardwareRemoved(hardware.snapshot()));
        }
        debug!(hardware = %identifier, "Hardware removed");
        true
    }

    /// Finds the top-level node owning `identifier` (itself or one of its
    /// sub-hardware) and the owner's visibility.
    fn owner_mut(&mut self, identifier: &Identifier) -> Option<(&mut Hardware, bool)> {
        self.hardware.iter_mut().find_map(|top| {
            let visible = top.state() == ElementState::Visible;
            top.find_mut(identifier).map(|owner| (owner, visible))
        })
    }

    /// Adds a sensor to a top-level hardware or one of its sub-hardware.
    pub fn add_sensor(&mut self, parent: &Identifier, identifier: &Identifier) -> bool {
        let Some(description) = self.engine.describe_sensor(identifier) else {
            warn!(sensor = %identifier, "Engine has no description for added sensor");
            return false;
        };
        let engine = Arc::clone(&self.engine);
        let open = self.open;

        let Some((owner, visible)) = self.owner_mut(parent) else {
            debug!(sensor = %identifier, parent = %parent, "Sensor parent not in tree");
            return false;
        };
        let Some(sensor) = owner.add_sensor(&description, &engine) else {
            return false;
        };
        let snapshot = (open && visible).then(|| sensor.snapshot());

        if let Some(snapshot) = snapshot {
            self.events.push(TreeEvent::SensorAdded(snapshot));
        }
        true
    }

    pub fn remove_sensor(&mut self, parent: &Identifier, identifier: &Identifier) -> bool {
        let open = self.open;
        let Some((owner, visible)) = self.owner_mut(parent) else {
            return false;
        };
        let Some(sensor) = owner.remove_sensor(identifier) else {
            return false;
        };
        if open && visible {
            self.events.push(TreeEvent::SensorRemoved(sensor.snapshot()));
        }
        true
    }

    /// Refreshes every sensor of every visible hardware from the engine.
    pub fn update(&self) {
        let now = Utc::now();
        for hardware in self.visible() {
            hardware.update(self.engine.as_ref(), now);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Visible top-level hardware.
    pub fn visible(&self) -> impl Iterator<Item = &Hardware> {
        self.hardware
            .iter()
            .filter(|h| h.state() == ElementState::Visible)
    }

    /// Every top-level hardware, whatever its state.
    pub fn hardware(&self) -> &[Hardware] {
        &self.hardware
    }

    pub fn find_hardware(&self, identifier: &Identifier) -> Option<&Hardware> {
        self.hardware.iter().find_map(|h| h.find(identifier))
    }

    pub fn find_sensor(&self, identifier: &Identifier) -> Option<&Sensor> {
        self.hardware.iter().find_map(|h| h.find_sensor(identifier))
    }

    pub fn set_hardware_name(&self, identifier: &Identifier, name: &str) -> bool {
        match self.find_hardware(identifier) {
            Some(hardware) => {
                hardware.set_name(name);
                true
            }
            None => false,
        }
    }

    pub fn set_sensor_name(&self, identifier: &Identifier, name: &str) -> bool {
        match self.find_sensor(identifier) {
            Some(sensor) => {
                sensor.set_name(name);
                true
            }
            None => false,
        }
    }

    /// Snapshots of visible hardware, for seeding a publish mirror.
    pub fn visible_snapshots(&self) -> Vec<HardwareSnapshot> {
        self.visible().map(Hardware::snapshot).collect()
    }

    /// Takes every queued structural event, oldest first.
    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Walks visible hardware depth-first.
    pub fn walk<C>(&self, table: &VisitorTable<C>, context: &mut C) {
        for hardware in self.visible() {
            NodeRef::Hardware(hardware).walk(table, context);
        }
    }

    /// Identifiers of every node below visible hardware, in walk order.
    pub fn identifiers(&self) -> Vec<Identifier> {
        fn hardware(ids: &mut Vec<Identifier>, h: &Hardware) {
            ids.push(h.identifier().clone());
        }
        fn sensor(ids: &mut Vec<Identifier>, s: &Sensor) {
            ids.push(s.identifier().clone());
        }
        fn parameter(ids: &mut Vec<Identifier>, p: &Parameter) {
            ids.push(p.identifier().clone());
        }
        fn control(ids: &mut Vec<Identifier>, c: &Control) {
            ids.push(c.identifier().clone());
        }

        let table = VisitorTable::new()
            .on_hardware(hardware)
            .on_sensor(sensor)
            .on_parameter(parameter)
            .on_control(control);
        let mut ids = Vec::new();
        self.walk(&table, &mut ids);
        ids
    }

    /// Plain-text report of the visible tree followed by engine reports.
    pub fn report(&self) -> String {
        let table = VisitorTable::new()
            .on_hardware(report_hardware)
            .on_sensor(report_sensor)
            .on_parameter(report_parameter)
            .on_control(report_control);

        let mut report = String::new();
        self.walk(&table, &mut report);

        for hardware in self.visible() {
            let text = hardware.link().report();
            if !text.is_empty() {
                let _ = writeln!(report);
                let _ = writeln!(report, "# {} ({})", hardware.name(), hardware.identifier());
                report.push_str(&text);
            }
        }
        report
    }
}

fn format_value(value: Option<f32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn report_hardware(out: &mut String, hardware: &Hardware) {
    let _ = writeln!(
        out,
        "+- {} [{}] {}",
        hardware.name(),
        hardware.hardware_type(),
        hardware.identifier()
    );
}

fn report_sensor(out: &mut String, sensor: &Sensor) {
    let link = sensor.link();
    let _ = writeln!(
        out,
        "|  +- {:<24} {:>10} {:>10} {:>10} {} ({})",
        link.name(),
        format_value(link.value()),
        format_value(link.min()),
        format_value(link.max()),
        sensor.sensor_type().unit(),
        sensor.identifier()
    );
}

fn report_parameter(out: &mut String, parameter: &Parameter) {
    let link = parameter.link();
    let _ = writeln!(
        out,
        "|  |  +- {} = {}{}",
        parameter.name(),
        link.value(),
        if link.is_default() { " (default)" } else { "" }
    );
}

fn report_control(out: &mut String, control: &Control) {
    let link = control.link();
    let _ = writeln!(
        out,
        "|  |  +- control: {} {}",
        link.mode(),
        link.software_value()
    );
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{HardwareDescription, SensorDescription, StaticEngine};
    use hwmirror_core::{HardwareType, SensorType};

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    fn cpu() -> HardwareDescription {
        let cpu = id("/amdcpu/0");
        HardwareDescription::new(cpu.clone(), "Ryzen 9 7950X", HardwareType::CPU)
            .with_sensor(SensorDescription::new(&cpu, "Core (Tctl/Tdie)", SensorType::Temperature, 0))
            .with_sensor(
                SensorDescription::new(&cpu, "Package", SensorType::Power, 0)
                    .with_parameter("Scale", "Multiplier", 1.0),
            )
    }

    fn disk() -> HardwareDescription {
        let disk = id("/hdd/0");
        HardwareDescription::new(disk.clone(), "Samsung SSD 980", HardwareType::HDD)
            .with_sensor(SensorDescription::new(&disk, "Temperature", SensorType::Temperature, 0))
    }

    fn tree_with(engine: &Arc<StaticEngine>, categories: CategoryFlags) -> HardwareTree {
        HardwareTree::new(engine.clone(), Settings::in_memory(), categories)
    }

    fn kinds(events: &[TreeEvent]) -> Vec<(TreeEventKind, String)> {
        events
            .iter()
            .map(|e| (e.kind(), e.identifier().to_string()))
            .collect()
    }

    #[test]
    fn test_open_shows_enabled_categories_only() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(cpu());
        engine.insert_hardware(disk());
        let mut categories = CategoryFlags::all();
        categories.storage = false;

        let mut tree = tree_with(&engine, categories);
        tree.open();
        tree.open();

        assert_eq!(
            kinds(&tree.drain_events()),
            vec![(TreeEventKind::HardwareAdded, "/amdcpu/0".to_string())]
        );
        assert_eq!(tree.hardware().len(), 2);
        assert_eq!(tree.visible().count(), 1);
    }

    #[test]
    fn test_category_toggle_fires_only_while_open() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(disk());
        let mut tree = tree_with(&engine, CategoryFlags::default());

        tree.set_category(HardwareCategory::Storage, true);
        assert!(tree.drain_events().is_empty());

        tree.open();
        assert_eq!(tree.drain_events().len(), 1);

        tree.set_category(HardwareCategory::Storage, false);
        tree.set_category(HardwareCategory::Storage, false);
        assert_eq!(
            kinds(&tree.drain_events()),
            vec![(TreeEventKind::HardwareRemoved, "/hdd/0".to_string())]
        );
        assert_eq!(tree.hardware()[0].state(), ElementState::Hidden);

        tree.set_category(HardwareCategory::Storage, true);
        assert_eq!(
            kinds(&tree.drain_events()),
            vec![(TreeEventKind::HardwareAdded, "/hdd/0".to_string())]
        );
    }

    #[test]
    fn test_add_hardware_is_idempotent() {
        let engine = Arc::new(StaticEngine::new());
        let mut tree = tree_with(&engine, CategoryFlags::all());
        tree.open();

        engine.insert_hardware(disk());
        let disk_id = id("/hdd/0");
        assert!(tree.add_hardware(&disk_id, None));
        assert!(!tree.add_hardware(&disk_id, None));

        assert_eq!(
            tree.hardware()
                .iter()
                .filter(|h| h.identifier() == &disk_id)
                .count(),
            1
        );
        assert_eq!(tree.drain_events().len(), 1);
    }

    #[test]
    fn test_add_hardware_ignores_sub_hardware_and_closed_tree() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(disk());
        let mut tree = tree_with(&engine, CategoryFlags::all());

        assert!(!tree.add_hardware(&id("/hdd/0"), None));
        tree.open();
        tree.drain_events();
        assert!(!tree.add_hardware(&id("/lpc/nct6798d"), Some(&id("/mainboard"))));
        assert!(tree.drain_events().is_empty());
    }

    #[test]
    fn test_remove_absent_hardware_is_noop() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(cpu());
        let mut tree = tree_with(&engine, CategoryFlags::all());
        tree.open();
        tree.drain_events();

        assert!(!tree.remove_hardware(&id("/hdd/7"), None));
        assert!(!tree.remove_hardware(&id("/amdcpu/0"), Some(&id("/mainboard"))));
        assert_eq!(tree.hardware().len(), 1);
        assert!(tree.drain_events().is_empty());
    }

    #[test]
    fn test_remove_hardware_flushes_history() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(disk());
        let mut tree = tree_with(&engine, CategoryFlags::all());
        tree.open();
        tree.drain_events();

        let sensor = id("/hdd/0/temperature/0");
        engine.set_value(&sensor, 41.0);
        for _ in 0..4 {
            tree.update();
        }

        assert!(tree.remove_hardware(&id("/hdd/0"), None));
        assert_eq!(
            kinds(&tree.drain_events()),
            vec![(TreeEventKind::HardwareRemoved, "/hdd/0".to_string())]
        );
        assert!(tree.settings().contains("/hdd/0/temperature/0/values"));
    }

    #[test]
    fn test_sensor_events_follow_owner_visibility() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(cpu());
        engine.insert_hardware(disk());
        let mut categories = CategoryFlags::all();
        categories.storage = false;
        let mut tree = tree_with(&engine, categories);
        tree.open();
        tree.drain_events();

        let cpu_id = id("/amdcpu/0");
        let load = SensorDescription::new(&cpu_id, "CPU Total", SensorType::Load, 0);
        engine.insert_sensor(&cpu_id, load.clone());
        assert!(tree.add_sensor(&cpu_id, &load.identifier));
        assert!(!tree.add_sensor(&cpu_id, &load.identifier));

        let disk_id = id("/hdd/0");
        let life = SensorDescription::new(&disk_id, "Remaining Life", SensorType::Level, 0);
        engine.insert_sensor(&disk_id, life.clone());
        assert!(tree.add_sensor(&disk_id, &life.identifier));

        assert!(tree.remove_sensor(&cpu_id, &load.identifier));
        assert_eq!(
            kinds(&tree.drain_events()),
            vec![
                (TreeEventKind::SensorAdded, "/amdcpu/0/load/0".to_string()),
                (TreeEventKind::SensorRemoved, "/amdcpu/0/load/0".to_string()),
            ]
        );
    }

    #[test]
    fn test_sensor_on_sub_hardware() {
        let engine = Arc::new(StaticEngine::new());
        let board = id("/mainboard");
        let chip = id("/lpc/nct6798d");
        engine.insert_hardware(
            HardwareDescription::new(board.clone(), "PRIME X670", HardwareType::Mainboard)
                .with_sub_hardware(HardwareDescription::new(chip.clone(), "NCT6798D", HardwareType::SuperIO)),
        );
        let mut tree = tree_with(&engine, CategoryFlags::all());
        tree.open();
        tree.drain_events();

        let fan = SensorDescription::new(&chip, "Chassis Fan", SensorType::Fan, 2);
        engine.insert_sensor(&chip, fan.clone());
        assert!(tree.add_sensor(&chip, &fan.identifier));
        assert_eq!(tree.drain_events().len(), 1);
        assert_eq!(
            tree.find_sensor(&fan.identifier).unwrap().hardware(),
            &chip
        );
        assert!(!tree.add_sensor(&id("/lpc/unknown"), &fan.identifier));
    }

    #[test]
    fn test_update_reads_engine_values() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(cpu());
        let mut tree = tree_with(&engine, CategoryFlags::all());
        tree.open();

        let temp = id("/amdcpu/0/temperature/0");
        engine.set_value(&temp, 55.5);
        tree.update();
        engine.set_value(&temp, 60.0);
        tree.update();

        let link = tree.find_sensor(&temp).unwrap().link().clone();
        assert_eq!(link.value(), Some(60.0));
        assert_eq!(link.min(), Some(55.5));
        assert_eq!(link.max(), Some(60.0));
    }

    #[test]
    fn test_close_hides_everything() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(cpu());
        engine.insert_hardware(disk());
        let mut tree = tree_with(&engine, CategoryFlags::all());
        tree.open();
        tree.drain_events();

        tree.close();
        tree.close();
        let events = tree.drain_events();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| e.kind() == TreeEventKind::HardwareRemoved));
        assert!(tree.hardware().is_empty());
        assert!(!tree.is_open());
    }

    #[test]
    fn test_identifiers_walk_order() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(cpu());
        let mut tree = tree_with(&engine, CategoryFlags::all());
        tree.open();

        let ids: Vec<String> = tree.identifiers().iter().map(|i| i.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "/amdcpu/0",
                "/amdcpu/0/temperature/0",
                "/amdcpu/0/power/0",
                "/amdcpu/0/power/0/parameter/scale",
            ]
        );
    }

    #[test]
    fn test_report_lists_sensors_and_engine_text() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(cpu());
        let mut tree = tree_with(&engine, CategoryFlags::all());
        tree.open();
        engine.set_value(&id("/amdcpu/0/temperature/0"), 48.25);
        tree.update();

        let report = tree.report();
        assert!(report.contains("Ryzen 9 7950X [CPU] /amdcpu/0"));
        assert!(report.contains("48.25"));
        assert!(report.contains("Scale = 1 (default)"));
        assert!(report.contains("2 sensor(s) registered"));
    }
}
