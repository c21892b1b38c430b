//! # Identifier
//!
//! Hierarchical, slash-separated path naming every node in every view.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Identifier Layout                                │
//! │                                                                         │
//! │  /lpc/it8712f                         hardware (sub-hardware of mobo)  │
//! │  /lpc/it8712f/temperature/0           sensor   (+ type + index)        │
//! │  /lpc/it8712f/temperature/0/parameter/offset                            │
//! │  /lpc/it8712f/control/0/control       control  (+ "control")           │
//! │                                                                         │
//! │  Settings keys hang off the identifier as one more segment:            │
//! │  /lpc/it8712f/temperature/0/values    packed history blob              │
//! │  /lpc/it8712f/name                    user name override               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The identifier is the only join key shared by the engine tree, the
//! publish mirror and the remote mirror. Ordering is ordinal (byte-wise),
//! so iteration over `BTreeMap<Identifier, _>` is deterministic everywhere.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::SensorType;

/// Segment separator.
pub const SEPARATOR: char = '/';

/// Immutable hierarchical node path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Builds an identifier from its segments.
    ///
    /// ## Example
    /// ```rust
    /// use hwmirror_core::Identifier;
    ///
    /// let id = Identifier::new(["lpc", "it8712f"]).unwrap();
    /// assert_eq!(id.as_str(), "/lpc/it8712f");
    /// ```
    pub fn new<I, S>(segments: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = String::new();
        for segment in segments {
            let segment = segment.as_ref();
            validate_segment(segment)?;
            path.push(SEPARATOR);
            path.push_str(segment);
        }
        if path.is_empty() {
            return Err(CoreError::invalid_identifier("", "no segments"));
        }
        Ok(Identifier(path))
    }

    /// Parses identifier text produced by `Display`.
    pub fn parse(text: &str) -> CoreResult<Self> {
        if text.is_empty() {
            return Err(CoreError::invalid_identifier(text, "empty"));
        }
        if !text.starts_with(SEPARATOR) {
            return Err(CoreError::invalid_identifier(text, "must start with '/'"));
        }
        if text.contains(' ') {
            return Err(CoreError::invalid_identifier(text, "contains a space"));
        }
        if text[1..].split(SEPARATOR).any(str::is_empty) {
            return Err(CoreError::invalid_identifier(text, "empty segment"));
        }
        Ok(Identifier(text.to_string()))
    }

    /// Appends one segment, validating it.
    pub fn try_child(&self, segment: &str) -> CoreResult<Self> {
        validate_segment(segment)?;
        Ok(Identifier(format!("{}{}{}", self.0, SEPARATOR, segment)))
    }

    /// Appends one segment.
    ///
    /// # Panics
    /// If `segment` is empty or contains a space or `/`. Segments built in
    /// code are constants or sanitized names, so this is a programming error.
    pub fn child(&self, segment: &str) -> Self {
        match self.try_child(segment) {
            Ok(id) => id,
            Err(e) => panic!("{e}"),
        }
    }

    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates the segments, root first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split(SEPARATOR)
    }

    /// Returns the last segment.
    pub fn last_segment(&self) -> &str {
        self.segments().last().unwrap_or_default()
    }

    /// Returns the enclosing path, or `None` for a single-segment identifier.
    pub fn parent(&self) -> Option<Identifier> {
        match self.0.rfind(SEPARATOR) {
            Some(0) | None => None,
            Some(idx) => Some(Identifier(self.0[..idx].to_string())),
        }
    }

    /// Returns true if `other` lies strictly below this identifier.
    ///
    /// The test respects segment boundaries: `/cpu/0` is not an ancestor of
    /// `/cpu/01`.
    pub fn is_ancestor_of(&self, other: &Identifier) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == SEPARATOR as u8
    }

    /// Returns the settings key `<identifier>/<suffix>`.
    pub fn settings_key(&self, suffix: &str) -> String {
        self.child(suffix).0
    }

    // =========================================================================
    // Derived Identifiers
    // =========================================================================

    /// Sensor identifier: hardware + lowercase type tag + index.
    pub fn for_sensor(hardware: &Identifier, sensor_type: SensorType, index: u32) -> Self {
        hardware
            .child(&sensor_type.to_string().to_lowercase())
            .child(&index.to_string())
    }

    /// Parameter identifier: sensor + `parameter` + sanitized name.
    pub fn for_parameter(sensor: &Identifier, name: &str) -> Self {
        sensor.child("parameter").child(&identifier_name(name))
    }

    /// Control identifier: sensor + `control`.
    pub fn for_control(sensor: &Identifier) -> Self {
        sensor.child("control")
    }
}

/// Reduces a display name to a valid segment: lowercase ASCII alphanumerics.
pub fn identifier_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

fn validate_segment(segment: &str) -> CoreResult<()> {
    if segment.is_empty() {
        return Err(CoreError::invalid_identifier(segment, "empty segment"));
    }
    if segment.contains(' ') {
        return Err(CoreError::invalid_identifier(segment, "segment contains a space"));
    }
    if segment.contains(SEPARATOR) {
        return Err(CoreError::invalid_identifier(segment, "segment contains '/'"));
    }
    Ok(())
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identifier::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Add<&str> for &Identifier {
    type Output = Identifier;

    fn add(self, extension: &str) -> Identifier {
        self.child(extension)
    }
}

impl Add<&str> for Identifier {
    type Output = Identifier;

    fn add(self, extension: &str) -> Identifier {
        self.child(extension)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_joins_segments() {
        let id = Identifier::new(["lpc", "it8712f"]).unwrap();
        assert_eq!(id.to_string(), "/lpc/it8712f");
        assert_eq!(id.segments().collect::<Vec<_>>(), vec!["lpc", "it8712f"]);
    }

    #[test]
    fn test_new_rejects_bad_segments() {
        assert!(Identifier::new(["has space"]).is_err());
        assert!(Identifier::new(["a/b"]).is_err());
        assert!(Identifier::new([""]).is_err());
        assert!(Identifier::new(Vec::<&str>::new()).is_err());
    }

    #[test]
    fn test_parse() {
        assert!(Identifier::parse("/cpu/0").is_ok());
        assert!(Identifier::parse("").is_err());
        assert!(Identifier::parse("cpu/0").is_err());
        assert!(Identifier::parse("/cpu /0").is_err());
        assert!(Identifier::parse("/cpu//0").is_err());
        assert!(Identifier::parse("/cpu/").is_err());
    }

    #[test]
    fn test_add_appends_segment() {
        let hw = Identifier::parse("/mainboard").unwrap();
        assert_eq!((&hw + "name").as_str(), "/mainboard/name");
        assert_eq!(hw.settings_key("values"), "/mainboard/values");
    }

    #[test]
    #[should_panic]
    fn test_add_panics_on_invalid_segment() {
        let hw = Identifier::parse("/mainboard").unwrap();
        let _ = hw + "bad segment";
    }

    #[test]
    fn test_parent_and_ancestry() {
        let hw = Identifier::parse("/cpu/0").unwrap();
        let sensor = Identifier::parse("/cpu/0/load/1").unwrap();
        let other = Identifier::parse("/cpu/01").unwrap();

        assert!(hw.is_ancestor_of(&sensor));
        assert!(!hw.is_ancestor_of(&other));
        assert!(!hw.is_ancestor_of(&hw));
        assert_eq!(sensor.parent().unwrap().as_str(), "/cpu/0/load");
        assert!(Identifier::parse("/cpu").unwrap().parent().is_none());
    }

    #[test]
    fn test_derived_identifiers() {
        let hw = Identifier::parse("/lpc/nct6798d").unwrap();
        let sensor = Identifier::for_sensor(&hw, SensorType::Temperature, 2);
        assert_eq!(sensor.as_str(), "/lpc/nct6798d/temperature/2");

        let param = Identifier::for_parameter(&sensor, "Offset [°C]");
        assert_eq!(param.as_str(), "/lpc/nct6798d/temperature/2/parameter/offsetc");

        let control = Identifier::for_control(&sensor);
        assert!(sensor.is_ancestor_of(&control));
        assert_eq!(control.last_segment(), "control");
    }

    #[test]
    fn test_ordinal_ordering() {
        let a = Identifier::parse("/A").unwrap();
        let b = Identifier::parse("/a").unwrap();
        let c = Identifier::parse("/a/b").unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_try_from_string() {
        assert!(Identifier::try_from("/ram".to_string()).is_ok());
        assert!(Identifier::try_from("ram".to_string()).is_err());
        assert_eq!(String::from(Identifier::parse("/ram").unwrap()), "/ram");
    }
}
