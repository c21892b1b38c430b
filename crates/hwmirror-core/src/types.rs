//! # Domain Types
//!
//! Type tags shared by the engine tree and both mirrors.
//!
//! ## Category Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  HardwareCategory → HardwareType                        │
//! │                                                                         │
//! │  Mainboard      ──► Mainboard                                          │
//! │  Cpu            ──► CPU                                                │
//! │  Ram            ──► RAM                                                │
//! │  Gpu            ──► GpuNvidia, GpuAti                                  │
//! │  FanController  ──► TBalancer, Heatmaster, Aquaero                     │
//! │  Storage        ──► HDD                                                │
//! │                                                                         │
//! │  SuperIO has no category: it only ever appears as sub-hardware of a    │
//! │  mainboard and follows its owner's visibility.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// Hardware Type
// =============================================================================

/// Kind of a hardware node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareType {
    Mainboard,
    SuperIO,
    CPU,
    RAM,
    GpuNvidia,
    GpuAti,
    TBalancer,
    Heatmaster,
    HDD,
    Aquaero,
}

impl HardwareType {
    /// Every hardware type, in declaration order.
    pub const ALL: [HardwareType; 10] = [
        HardwareType::Mainboard,
        HardwareType::SuperIO,
        HardwareType::CPU,
        HardwareType::RAM,
        HardwareType::GpuNvidia,
        HardwareType::GpuAti,
        HardwareType::TBalancer,
        HardwareType::Heatmaster,
        HardwareType::HDD,
        HardwareType::Aquaero,
    ];

    /// Returns the category that toggles this type, if any.
    pub fn category(&self) -> Option<HardwareCategory> {
        HardwareCategory::ALL
            .into_iter()
            .find(|c| c.hardware_types().contains(self))
    }
}

impl std::fmt::Display for HardwareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HardwareType::Mainboard => "Mainboard",
            HardwareType::SuperIO => "SuperIO",
            HardwareType::CPU => "CPU",
            HardwareType::RAM => "RAM",
            HardwareType::GpuNvidia => "GpuNvidia",
            HardwareType::GpuAti => "GpuAti",
            HardwareType::TBalancer => "TBalancer",
            HardwareType::Heatmaster => "Heatmaster",
            HardwareType::HDD => "HDD",
            HardwareType::Aquaero => "Aquaero",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for HardwareType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HardwareType::ALL
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownTag {
                kind: "hardware type",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Sensor Type
// =============================================================================

/// Kind of a sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    Voltage,
    Clock,
    Temperature,
    Load,
    Fan,
    Flow,
    Control,
    Level,
    Factor,
    Power,
    Data,
    SmallData,
}

impl SensorType {
    /// Every sensor type, in declaration order.
    pub const ALL: [SensorType; 12] = [
        SensorType::Voltage,
        SensorType::Clock,
        SensorType::Temperature,
        SensorType::Load,
        SensorType::Fan,
        SensorType::Flow,
        SensorType::Control,
        SensorType::Level,
        SensorType::Factor,
        SensorType::Power,
        SensorType::Data,
        SensorType::SmallData,
    ];

    /// Display unit used by text reports.
    pub fn unit(&self) -> &'static str {
        match self {
            SensorType::Voltage => "V",
            SensorType::Clock => "MHz",
            SensorType::Temperature => "°C",
            SensorType::Load | SensorType::Control | SensorType::Level => "%",
            SensorType::Fan => "RPM",
            SensorType::Flow => "L/h",
            SensorType::Factor => "",
            SensorType::Power => "W",
            SensorType::Data => "GB",
            SensorType::SmallData => "MB",
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SensorType::Voltage => "Voltage",
            SensorType::Clock => "Clock",
            SensorType::Temperature => "Temperature",
            SensorType::Load => "Load",
            SensorType::Fan => "Fan",
            SensorType::Flow => "Flow",
            SensorType::Control => "Control",
            SensorType::Level => "Level",
            SensorType::Factor => "Factor",
            SensorType::Power => "Power",
            SensorType::Data => "Data",
            SensorType::SmallData => "SmallData",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for SensorType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorType::ALL
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownTag {
                kind: "sensor type",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Hardware Category
// =============================================================================

/// Coarse hardware class whose visibility is toggled as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareCategory {
    Mainboard,
    Cpu,
    Ram,
    Gpu,
    FanController,
    Storage,
}

impl HardwareCategory {
    /// Every category.
    pub const ALL: [HardwareCategory; 6] = [
        HardwareCategory::Mainboard,
        HardwareCategory::Cpu,
        HardwareCategory::Ram,
        HardwareCategory::Gpu,
        HardwareCategory::FanController,
        HardwareCategory::Storage,
    ];

    /// Hardware types governed by this category.
    pub fn hardware_types(&self) -> &'static [HardwareType] {
        match self {
            HardwareCategory::Mainboard => &[HardwareType::Mainboard],
            HardwareCategory::Cpu => &[HardwareType::CPU],
            HardwareCategory::Ram => &[HardwareType::RAM],
            HardwareCategory::Gpu => &[HardwareType::GpuAti, HardwareType::GpuNvidia],
            HardwareCategory::FanController => &[
                HardwareType::TBalancer,
                HardwareType::Heatmaster,
                HardwareType::Aquaero,
            ],
            HardwareCategory::Storage => &[HardwareType::HDD],
        }
    }
}

impl std::fmt::Display for HardwareCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareCategory::Mainboard => write!(f, "mainboard"),
            HardwareCategory::Cpu => write!(f, "cpu"),
            HardwareCategory::Ram => write!(f, "ram"),
            HardwareCategory::Gpu => write!(f, "gpu"),
            HardwareCategory::FanController => write!(f, "fan_controller"),
            HardwareCategory::Storage => write!(f, "storage"),
        }
    }
}

/// Per-category enable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryFlags {
    pub mainboard: bool,
    pub cpu: bool,
    pub ram: bool,
    pub gpu: bool,
    pub fan_controller: bool,
    pub storage: bool,
}

impl CategoryFlags {
    /// All categories enabled.
    pub fn all() -> Self {
        CategoryFlags {
            mainboard: true,
            cpu: true,
            ram: true,
            gpu: true,
            fan_controller: true,
            storage: true,
        }
    }

    /// Returns the stored flag for a category.
    pub fn get(&self, category: HardwareCategory) -> bool {
        match category {
            HardwareCategory::Mainboard => self.mainboard,
            HardwareCategory::Cpu => self.cpu,
            HardwareCategory::Ram => self.ram,
            HardwareCategory::Gpu => self.gpu,
            HardwareCategory::FanController => self.fan_controller,
            HardwareCategory::Storage => self.storage,
        }
    }

    /// Stores the flag for a category.
    pub fn set(&mut self, category: HardwareCategory, enabled: bool) {
        let slot = match category {
            HardwareCategory::Mainboard => &mut self.mainboard,
            HardwareCategory::Cpu => &mut self.cpu,
            HardwareCategory::Ram => &mut self.ram,
            HardwareCategory::Gpu => &mut self.gpu,
            HardwareCategory::FanController => &mut self.fan_controller,
            HardwareCategory::Storage => &mut self.storage,
        };
        *slot = enabled;
    }

    /// Categories currently enabled.
    pub fn enabled(&self) -> impl Iterator<Item = HardwareCategory> + '_ {
        HardwareCategory::ALL.into_iter().filter(|c| self.get(*c))
    }
}

// =============================================================================
// Element State
// =============================================================================

/// Lifecycle state of a top-level hardware node.
///
/// ```text
/// New ──► Visible          (full reconstruction, category enabled)
/// New ──► Hidden ──► Visible
///           ▲          │
///           └──────────┘   (category disabled / re-enabled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementState {
    New,
    Hidden,
    Visible,
}

// =============================================================================
// Control Mode
// =============================================================================

/// Addressing mode of a fan/pump control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlMode {
    #[default]
    Undefined,
    Default,
    Software,
}

impl ControlMode {
    /// Integer form stored in settings.
    pub fn as_i32(&self) -> i32 {
        match self {
            ControlMode::Undefined => 0,
            ControlMode::Default => 1,
            ControlMode::Software => 2,
        }
    }

    /// Parses the integer form; unknown values map to `Undefined`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => ControlMode::Default,
            2 => ControlMode::Software,
            _ => ControlMode::Undefined,
        }
    }
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMode::Undefined => write!(f, "Undefined"),
            ControlMode::Default => write!(f, "Default"),
            ControlMode::Software => write!(f, "Software"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_of_type() {
        assert_eq!(HardwareType::GpuAti.category(), Some(HardwareCategory::Gpu));
        assert_eq!(HardwareType::Aquaero.category(), Some(HardwareCategory::FanController));
        assert_eq!(HardwareType::HDD.category(), Some(HardwareCategory::Storage));
        assert_eq!(HardwareType::SuperIO.category(), None);
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!("cpu".parse::<HardwareType>().unwrap(), HardwareType::CPU);
        assert_eq!("SmallData".parse::<SensorType>().unwrap(), SensorType::SmallData);
        assert!("toaster".parse::<HardwareType>().is_err());
    }

    #[test]
    fn test_category_flags() {
        let mut flags = CategoryFlags::default();
        assert_eq!(flags.enabled().count(), 0);

        flags.set(HardwareCategory::Gpu, true);
        assert!(flags.get(HardwareCategory::Gpu));
        assert!(!flags.get(HardwareCategory::Cpu));
        assert_eq!(CategoryFlags::all().enabled().count(), 6);
    }

    #[test]
    fn test_control_mode_round_trip() {
        for mode in [ControlMode::Undefined, ControlMode::Default, ControlMode::Software] {
            assert_eq!(ControlMode::from_i32(mode.as_i32()), mode);
        }
        assert_eq!(ControlMode::from_i32(42), ControlMode::Undefined);
    }
}
