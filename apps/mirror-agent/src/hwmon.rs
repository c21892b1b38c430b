//! # Linux hwmon Engine
//!
//! [`SensingEngine`] over `/sys/class/hwmon`.
//!
//! ```text
//! /sys/class/hwmon/hwmon0/name = "k10temp"     ──► /amdcpu/0        (CPU)
//! /sys/class/hwmon/hwmon1/name = "amdgpu"      ──► /atigpu/0        (GpuAti)
//! /sys/class/hwmon/hwmon2/name = "nvme"        ──► /hdd/0           (HDD)
//! /sys/class/hwmon/hwmon3/name = "nct6798"     ──► /mainboard
//!                                                   └─ /lpc/nct6798 (SuperIO)
//!
//! tempN_input  m°C ──► Temperature  (N-1)
//! inN_input    mV  ──► Voltage      (N)
//! fanN_input   RPM ──► Fan          (N-1)
//! powerN_input µW  ──► Power        (N-1)
//! pwmN         0..255 ──► Control   (N-1), writable through pwmN / pwmN_enable
//! ```
//!
//! The chip list is cached by [`HwmonEngine::rescan`]; values are read from
//! sysfs on every [`SensingEngine::read`].

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use hwmirror_core::{ControlMode, HardwareType, Identifier, SensorType};
use hwmirror_sync::{HardwareDescription, SensingEngine, SensorDescription};
use tracing::{debug, info, warn};

pub const DEFAULT_HWMON_ROOT: &str = "/sys/class/hwmon";

/// How a raw sysfs integer becomes a sensor value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Scale {
    Milli,
    Micro,
    Unit,
    Pwm,
}

impl Scale {
    fn apply(self, raw: f64) -> f32 {
        let value = match self {
            Scale::Milli => raw / 1_000.0,
            Scale::Micro => raw / 1_000_000.0,
            Scale::Unit => raw,
            Scale::Pwm => raw * 100.0 / 255.0,
        };
        value as f32
    }
}

#[derive(Debug, Clone)]
struct Channel {
    path: PathBuf,
    scale: Scale,
}

#[derive(Debug, Default)]
struct Scan {
    hardware: Vec<HardwareDescription>,
    channels: HashMap<Identifier, Channel>,
    /// Control identifier → pwm file.
    controls: HashMap<Identifier, PathBuf>,
    /// Hardware identifier → chip directory.
    chips: HashMap<Identifier, PathBuf>,
}

/// Sensing engine backed by Linux hwmon sysfs.
#[derive(Debug)]
pub struct HwmonEngine {
    root: PathBuf,
    scan: RwLock<Scan>,
}

impl HwmonEngine {
    /// Creates the engine and performs the first scan.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let engine = HwmonEngine {
            root: root.into(),
            scan: RwLock::new(Scan::default()),
        };
        engine.rescan();
        engine
    }

    /// Re-reads the chip list.
    pub fn rescan(&self) {
        let scan = scan_root(&self.root);
        info!(
            root = %self.root.display(),
            hardware = scan.hardware.len(),
            channels = scan.channels.len(),
            "hwmon scan complete"
        );
        *self.scan.write().unwrap_or_else(PoisonError::into_inner) = scan;
    }

    fn with_scan<T>(&self, f: impl FnOnce(&Scan) -> T) -> T {
        f(&self.scan.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl SensingEngine for HwmonEngine {
    fn hardware(&self) -> Vec<HardwareDescription> {
        self.with_scan(|scan| scan.hardware.clone())
    }

    fn read(&self, sensor: &Identifier) -> Option<f32> {
        let channel = self.with_scan(|scan| scan.channels.get(sensor).cloned())?;
        read_number(&channel.path).map(|raw| channel.scale.apply(raw))
    }

    fn apply_control(&self, control: &Identifier, mode: ControlMode, value: f32) {
        let Some(pwm) = self.with_scan(|scan| scan.controls.get(control).cloned()) else {
            debug!(control = %control, "Control not backed by a pwm file");
            return;
        };
        let enable = sibling(&pwm, "_enable");

        let result = match mode {
            ControlMode::Software => std::fs::write(&enable, "1").and_then(|_| {
                let raw = (value.clamp(0.0, 100.0) * 255.0 / 100.0).round() as u32;
                std::fs::write(&pwm, raw.to_string())
            }),
            ControlMode::Default => std::fs::write(&enable, "2"),
            ControlMode::Undefined => Ok(()),
        };
        if let Err(e) = result {
            warn!(control = %control, path = %pwm.display(), error = %e, "Failed to write pwm control");
        }
    }

    fn report(&self, hardware: &Identifier) -> Option<String> {
        let dir = self.with_scan(|scan| scan.chips.get(hardware).cloned())?;
        let mut report = String::new();
        let _ = writeln!(report, "hwmon path: {}", dir.display());
        if let Ok(entries) = std::fs::read_dir(&dir) {
            let mut files: Vec<String> = entries
                .flatten()
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.ends_with("_input") || is_pwm_file(name))
                .collect();
            files.sort();
            for name in files {
                let value = read_trimmed(&dir.join(&name)).unwrap_or_else(|| "-".into());
                let _ = writeln!(report, "{name}: {value}");
            }
        }
        Some(report)
    }
}

// =============================================================================
// Scanning
// =============================================================================

fn read_trimmed(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let v = raw.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

fn read_number(path: &Path) -> Option<f64> {
    read_trimmed(path).and_then(|s| s.parse().ok())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn is_pwm_file(name: &str) -> bool {
    name.strip_prefix("pwm")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn classify(chip: &str) -> (HardwareType, &'static str) {
    match chip {
        "coretemp" => (HardwareType::CPU, "intelcpu"),
        "k10temp" | "zenpower" => (HardwareType::CPU, "amdcpu"),
        "amdgpu" | "radeon" => (HardwareType::GpuAti, "atigpu"),
        "nouveau" | "nvidia" => (HardwareType::GpuNvidia, "nvidiagpu"),
        "nvme" | "drivetemp" => (HardwareType::HDD, "hdd"),
        _ => (HardwareType::SuperIO, "lpc"),
    }
}

/// Channel kind from a sysfs file name: (type, index, scale).
fn parse_channel(name: &str) -> Option<(SensorType, u32, Scale)> {
    if is_pwm_file(name) {
        let n: u32 = name["pwm".len()..].parse().ok()?;
        return Some((SensorType::Control, n.checked_sub(1)?, Scale::Pwm));
    }
    let stem = name.strip_suffix("_input")?;
    let (prefix, number) = stem.split_at(stem.find(|c: char| c.is_ascii_digit())?);
    let n: u32 = number.parse().ok()?;
    match prefix {
        "temp" => Some((SensorType::Temperature, n.checked_sub(1)?, Scale::Milli)),
        "in" => Some((SensorType::Voltage, n, Scale::Milli)),
        "fan" => Some((SensorType::Fan, n.checked_sub(1)?, Scale::Unit)),
        "power" => Some((SensorType::Power, n.checked_sub(1)?, Scale::Micro)),
        _ => None,
    }
}

fn segment(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

fn scan_chip(dir: &Path, identifier: &Identifier, description: &mut HardwareDescription, scan: &mut Scan) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut files: Vec<String> = entries
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();

    for name in files {
        let Some((sensor_type, index, scale)) = parse_channel(&name) else {
            continue;
        };
        let path = dir.join(&name);
        let label_file = match sensor_type {
            SensorType::Control => format!("{name}_label"),
            _ => name.replace("_input", "_label"),
        };
        let label = read_trimmed(&dir.join(label_file))
            .unwrap_or_else(|| name.trim_end_matches("_input").to_string());

        let mut sensor = SensorDescription::new(identifier, label, sensor_type, index);
        if sensor_type == SensorType::Control {
            sensor = sensor.with_control(0.0, 100.0);
            scan.controls
                .insert(Identifier::for_control(&sensor.identifier), path.clone());
        }
        scan.channels.insert(sensor.identifier.clone(), Channel { path, scale });
        description.sensors.push(sensor);
    }
}

fn scan_root(root: &Path) -> Scan {
    let mut scan = Scan::default();
    let Ok(entries) = std::fs::read_dir(root) else {
        warn!(root = %root.display(), "hwmon root not readable");
        return scan;
    };
    let mut dirs: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    dirs.sort();

    let mut counters: BTreeMap<&'static str, u32> = BTreeMap::new();
    let mut board: Option<HardwareDescription> = None;
    let board_id = Identifier::parse("/mainboard").ok();

    for dir in dirs {
        let chip = read_trimmed(&dir.join("name"))
            .map(|s| segment(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                segment(dir.file_name().and_then(|s| s.to_str()).unwrap_or("hwmon"))
            });
        let (hardware_type, prefix) = classify(&chip);

        let identifier = if hardware_type == HardwareType::SuperIO {
            Identifier::new([prefix, chip.as_str()])
        } else {
            let counter = counters.entry(prefix).or_insert(0);
            let index = *counter;
            *counter += 1;
            Identifier::new([prefix.to_string(), index.to_string()])
        };
        let identifier = match identifier {
            Ok(identifier) => identifier,
            Err(e) => {
                warn!(chip = %chip, error = %e, "Skipping chip with unusable name");
                continue;
            }
        };
        if scan.chips.contains_key(&identifier) {
            debug!(chip = %chip, "Duplicate chip skipped");
            continue;
        }

        let mut description = HardwareDescription::new(identifier.clone(), chip.clone(), hardware_type);
        scan_chip(&dir, &identifier, &mut description, &mut scan);
        scan.chips.insert(identifier, dir);

        if hardware_type == HardwareType::SuperIO {
            let Some(board_id) = board_id.clone() else { continue };
            board
                .get_or_insert_with(|| HardwareDescription::new(board_id, "Mainboard", HardwareType::Mainboard))
                .sub_hardware
                .push(description);
        } else {
            scan.hardware.push(description);
        }
    }

    if let Some(board) = board {
        scan.hardware.insert(0, board);
    }
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn chip(root: &Path, dir: &str, name: &str, files: &[(&str, &str)]) {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("name"), format!("{name}\n")).unwrap();
        for (file, content) in files {
            fs::write(path.join(file), content).unwrap();
        }
    }

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    #[test]
    fn test_parse_channel() {
        assert_eq!(parse_channel("temp1_input"), Some((SensorType::Temperature, 0, Scale::Milli)));
        assert_eq!(parse_channel("in0_input"), Some((SensorType::Voltage, 0, Scale::Milli)));
        assert_eq!(parse_channel("pwm2"), Some((SensorType::Control, 1, Scale::Pwm)));
        assert_eq!(parse_channel("pwm2_enable"), None);
        assert_eq!(parse_channel("temp1_max"), None);
        assert_eq!(parse_channel("curr1_input"), None);
    }

    #[test]
    fn test_scan_builds_tree() {
        let root = tempfile::tempdir().unwrap();
        chip(root.path(), "hwmon0", "k10temp", &[("temp1_input", "45250\n"), ("temp1_label", "Tctl\n")]);
        chip(root.path(), "hwmon1", "nct6798", &[("fan2_input", "812\n"), ("pwm2", "128\n")]);

        let engine = HwmonEngine::new(root.path());
        let hardware = engine.hardware();

        assert_eq!(hardware.len(), 2);
        assert_eq!(hardware[0].identifier, id("/mainboard"));
        assert_eq!(hardware[0].sub_hardware[0].identifier, id("/lpc/nct6798"));
        assert_eq!(hardware[1].identifier, id("/amdcpu/0"));
        assert_eq!(hardware[1].sensors[0].name, "Tctl");

        assert_eq!(engine.read(&id("/amdcpu/0/temperature/0")), Some(45.25));
        assert_eq!(engine.read(&id("/lpc/nct6798/fan/1")), Some(812.0));
        let pwm = engine.read(&id("/lpc/nct6798/control/1")).unwrap();
        assert!((pwm - 50.196).abs() < 0.01);
    }

    #[test]
    fn test_software_control_writes_pwm() {
        let root = tempfile::tempdir().unwrap();
        chip(root.path(), "hwmon0", "it8688", &[("pwm1", "0\n"), ("pwm1_enable", "2\n")]);
        let engine = HwmonEngine::new(root.path());
        let control = id("/lpc/it8688/control/0/control");

        engine.apply_control(&control, ControlMode::Software, 100.0);
        let dir = root.path().join("hwmon0");
        assert_eq!(fs::read_to_string(dir.join("pwm1")).unwrap(), "255");
        assert_eq!(fs::read_to_string(dir.join("pwm1_enable")).unwrap(), "1");

        engine.apply_control(&control, ControlMode::Default, 0.0);
        assert_eq!(fs::read_to_string(dir.join("pwm1_enable")).unwrap(), "2");
    }

    #[test]
    fn test_missing_root_is_empty() {
        let engine = HwmonEngine::new("/nonexistent/hwmon");
        assert!(engine.hardware().is_empty());
        assert_eq!(engine.read(&id("/hdd/0/temperature/0")), None);
    }

    #[test]
    fn test_report_lists_inputs() {
        let root = tempfile::tempdir().unwrap();
        chip(root.path(), "hwmon0", "nvme", &[("temp1_input", "38850\n")]);
        let engine = HwmonEngine::new(root.path());

        let report = engine.report(&id("/hdd/0")).unwrap();
        assert!(report.contains("temp1_input: 38850"));
    }
}
