//! # Instrumentation Schema
//!
//! Static description of the four published classes: their fields and the
//! actions a remote consumer may invoke. The table is the single source of
//! truth for class names, property names and action arity; instance
//! projections and the namespace validate against it.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────┬──────────────────────┐
//! │ Class        │ Fields                                   │ Actions              │
//! ├──────────────┼──────────────────────────────────────────┼──────────────────────┤
//! │ Hardware     │ Identifier* Parent Name HardwareType     │ GetReport()          │
//! │              │ SubHardware Sensors                      │                      │
//! │ Sensor       │ Identifier* Parent Name Index SensorType │                      │
//! │              │ Value Min Max IsDefaultHidden            │                      │
//! │              │ Parameters Control                       │                      │
//! │ Parameter    │ Identifier* Parent Name Description      │ SetValue(value)      │
//! │              │ Value DefaultValue IsDefault             │ SetDefault()         │
//! │ Control      │ Identifier* Parent ControlMode           │ SetDefault()         │
//! │              │ SoftwareValue MinSoftwareValue           │ SetSoftware(value)   │
//! │              │ MaxSoftwareValue                         │                      │
//! └──────────────┴──────────────────────────────────────────┴──────────────────────┘
//!   * key field
//! ```

use serde::{Deserialize, Serialize};

/// Published class of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Hardware,
    Sensor,
    Parameter,
    Control,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Hardware,
        EntityKind::Sensor,
        EntityKind::Parameter,
        EntityKind::Control,
    ];

    /// Schema entry for this class.
    pub fn schema(&self) -> &'static EntitySchema {
        match self {
            EntityKind::Hardware => &SCHEMA[0],
            EntityKind::Sensor => &SCHEMA[1],
            EntityKind::Parameter => &SCHEMA[2],
            EntityKind::Control => &SCHEMA[3],
        }
    }

    /// Published class name.
    pub fn class_name(&self) -> &'static str {
        self.schema().class_name
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Wire type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    /// Identifier of another instance.
    Reference,
    /// Identifiers of other instances.
    ReferenceList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub key: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: &'static str,
    pub arguments: &'static [&'static str],
    pub returns: Option<FieldType>,
}

/// One published class.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub class_name: &'static str,
    pub fields: &'static [FieldSpec],
    pub actions: &'static [ActionSpec],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&'static ActionSpec> {
        self.actions.iter().find(|a| a.name == name)
    }
}

const fn field(name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        key: false,
    }
}

const KEY: FieldSpec = FieldSpec {
    name: "Identifier",
    field_type: FieldType::Text,
    key: true,
};

const PARENT: FieldSpec = field("Parent", FieldType::Reference);

/// Every published class, in [`EntityKind`] order.
pub static SCHEMA: [EntitySchema; 4] = [
    EntitySchema {
        kind: EntityKind::Hardware,
        class_name: "Hardware",
        fields: &[
            KEY,
            PARENT,
            field("Name", FieldType::Text),
            field("HardwareType", FieldType::Text),
            field("SubHardware", FieldType::ReferenceList),
            field("Sensors", FieldType::ReferenceList),
        ],
        actions: &[ActionSpec {
            name: "GetReport",
            arguments: &[],
            returns: Some(FieldType::Text),
        }],
    },
    EntitySchema {
        kind: EntityKind::Sensor,
        class_name: "Sensor",
        fields: &[
            KEY,
            PARENT,
            field("Name", FieldType::Text),
            field("Index", FieldType::Integer),
            field("SensorType", FieldType::Text),
            field("Value", FieldType::Float),
            field("Min", FieldType::Float),
            field("Max", FieldType::Float),
            field("IsDefaultHidden", FieldType::Boolean),
            field("Parameters", FieldType::ReferenceList),
            field("Control", FieldType::Reference),
        ],
        actions: &[],
    },
    EntitySchema {
        kind: EntityKind::Parameter,
        class_name: "Parameter",
        fields: &[
            KEY,
            PARENT,
            field("Name", FieldType::Text),
            field("Description", FieldType::Text),
            field("Value", FieldType::Float),
            field("DefaultValue", FieldType::Float),
            field("IsDefault", FieldType::Boolean),
        ],
        actions: &[
            ActionSpec {
                name: "SetValue",
                arguments: &["value"],
                returns: None,
            },
            ActionSpec {
                name: "SetDefault",
                arguments: &[],
                returns: None,
            },
        ],
    },
    EntitySchema {
        kind: EntityKind::Control,
        class_name: "Control",
        fields: &[
            KEY,
            PARENT,
            field("ControlMode", FieldType::Integer),
            field("SoftwareValue", FieldType::Float),
            field("MinSoftwareValue", FieldType::Float),
            field("MaxSoftwareValue", FieldType::Float),
        ],
        actions: &[
            ActionSpec {
                name: "SetDefault",
                arguments: &[],
                returns: None,
            },
            ActionSpec {
                name: "SetSoftware",
                arguments: &["value"],
                returns: None,
            },
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_order_matches_kind() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.schema().kind, kind);
        }
    }

    #[test]
    fn test_every_class_has_one_key_and_a_parent() {
        for schema in &SCHEMA {
            assert_eq!(schema.fields.iter().filter(|f| f.key).count(), 1);
            assert!(schema.field("Parent").is_some(), "{}", schema.class_name);
        }
    }

    #[test]
    fn test_action_lookup() {
        let parameter = EntityKind::Parameter.schema();
        assert_eq!(parameter.action("SetValue").unwrap().arguments, &["value"]);
        assert!(parameter.action("GetReport").is_none());
        assert_eq!(
            EntityKind::Hardware.schema().action("GetReport").unwrap().returns,
            Some(FieldType::Text)
        );
    }
}
