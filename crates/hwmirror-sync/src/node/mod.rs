//! # Tree Nodes
//!
//! Hardware, sensor, parameter and control nodes of the engine tree, plus a
//! function-table visitor for walking them.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HardwareTree ─owns─► Hardware ─owns─► Sensor ─owns─► Parameter        │
//! │                          │                 │    └─owns─► Control        │
//! │                          └─owns─► Hardware (sub-hardware)               │
//! │                                                                         │
//! │  Every node hands out a cloneable *Link: an Arc to its live state.      │
//! │  Snapshots carried by tree events hold links, never node references,    │
//! │  so the publish mirror reads current values without touching the tree. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod control;
pub mod hardware;
pub mod parameter;
pub mod sensor;

pub use control::{Control, ControlLink, ControlSnapshot};
pub use hardware::{Hardware, HardwareLink, HardwareSnapshot};
pub use parameter::{Parameter, ParameterLink, ParameterSnapshot};
pub use sensor::{Sensor, SensorLink, SensorSnapshot};

use hwmirror_core::Identifier;

/// Borrowed reference to any node.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Hardware(&'a Hardware),
    Sensor(&'a Sensor),
    Parameter(&'a Parameter),
    Control(&'a Control),
}

impl<'a> NodeRef<'a> {
    pub fn identifier(&self) -> &'a Identifier {
        match *self {
            NodeRef::Hardware(h) => h.identifier(),
            NodeRef::Sensor(s) => s.identifier(),
            NodeRef::Parameter(p) => p.identifier(),
            NodeRef::Control(c) => c.identifier(),
        }
    }

    /// Calls the table entry for this node.
    pub fn accept<C>(&self, table: &VisitorTable<C>, context: &mut C) {
        match *self {
            NodeRef::Hardware(h) => (table.hardware)(context, h),
            NodeRef::Sensor(s) => (table.sensor)(context, s),
            NodeRef::Parameter(p) => (table.parameter)(context, p),
            NodeRef::Control(c) => (table.control)(context, c),
        }
    }

    /// Direct children: sensors before sub-hardware, parameters before the
    /// control.
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        match *self {
            NodeRef::Hardware(h) => h
                .sensors()
                .iter()
                .map(NodeRef::Sensor)
                .chain(h.sub_hardware().iter().map(NodeRef::Hardware))
                .collect(),
            NodeRef::Sensor(s) => s
                .parameters()
                .iter()
                .map(NodeRef::Parameter)
                .chain(s.control().map(NodeRef::Control))
                .collect(),
            NodeRef::Parameter(_) | NodeRef::Control(_) => Vec::new(),
        }
    }

    /// Pre-order walk of this node and everything below it.
    pub fn walk<C>(&self, table: &VisitorTable<C>, context: &mut C) {
        self.accept(table, context);
        for child in self.children() {
            child.walk(table, context);
        }
    }
}

/// One function per node kind. Unset entries do nothing.
pub struct VisitorTable<C> {
    pub hardware: fn(&mut C, &Hardware),
    pub sensor: fn(&mut C, &Sensor),
    pub parameter: fn(&mut C, &Parameter),
    pub control: fn(&mut C, &Control),
}

fn ignore<C, T>(_: &mut C, _: &T) {}

impl<C> VisitorTable<C> {
    pub fn new() -> Self {
        VisitorTable {
            hardware: ignore::<C, Hardware>,
            sensor: ignore::<C, Sensor>,
            parameter: ignore::<C, Parameter>,
            control: ignore::<C, Control>,
        }
    }

    pub fn on_hardware(mut self, f: fn(&mut C, &Hardware)) -> Self {
        self.hardware = f;
        self
    }

    pub fn on_sensor(mut self, f: fn(&mut C, &Sensor)) -> Self {
        self.sensor = f;
        self
    }

    pub fn on_parameter(mut self, f: fn(&mut C, &Parameter)) -> Self {
        self.parameter = f;
        self
    }

    pub fn on_control(mut self, f: fn(&mut C, &Control)) -> Self {
        self.control = f;
        self
    }
}

impl<C> Default for VisitorTable<C> {
    fn default() -> Self {
        Self::new()
    }
}
