//! # Sensor Reading and History Buffer
//!
//! Per-sensor current/min/max tracking plus the bounded history buffer.
//! Both the engine tree and the remote mirror's proxy sensors use these.
//!
//! ## Value Update Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reading::set_value(v, now)                         │
//! │                                                                         │
//! │  1. Evict samples older than 24 h from the head                        │
//! │  2. v present? sum += v, count += 1                                    │
//! │       count == 4 ──► append(avg, now), reset sum/count                 │
//! │  3. current = v                                                         │
//! │  4. min/max: an absent bound is replaced by any present value;         │
//! │     an absent value never touches either bound                         │
//! │                                                                         │
//! │  append(sample):                                                        │
//! │    last two samples equal to sample? ──► overwrite last                │
//! │    otherwise                         ──► push                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::error::CoreError;
use crate::history::{self, SensorValue};
use crate::identifier::Identifier;
use crate::settings::Settings;

/// Samples older than this are evicted from the head of the buffer.
pub const HISTORY_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Number of value updates averaged into one history sample.
pub const DOWNSAMPLE_WINDOW: u32 = 4;

/// Settings key suffix for the packed history blob.
pub const HISTORY_KEY: &str = "values";

// =============================================================================
// History
// =============================================================================

/// Outcome of restoring a history buffer from settings.
#[derive(Debug)]
pub enum Restore {
    /// No stored blob.
    Absent,
    /// Blob decoded; number of samples read.
    Restored(usize),
    /// Blob present but undecodable; history starts empty.
    Corrupt(CoreError),
}

/// Bounded, debounced, down-sampled sample buffer.
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<SensorValue>,
    enabled: bool,
    sum: f32,
    count: u32,
}

impl History {
    /// Creates an empty buffer. A disabled buffer ignores appends.
    pub fn new(enabled: bool) -> Self {
        History {
            samples: VecDeque::new(),
            enabled,
            sum: 0.0,
            count: 0,
        }
    }

    /// Restores the buffer stored under `<sensor>/values` and removes the key.
    ///
    /// A present blob (decodable and non-empty, or corrupt) is followed by a
    /// NaN gap marker at `now`.
    pub fn restore(settings: &Settings, sensor: &Identifier, now: DateTime<Utc>) -> (Self, Restore) {
        let mut history = History::new(settings.history_enabled());
        let key = sensor.settings_key(HISTORY_KEY);

        let outcome = match settings.get_compressed(&key) {
            Ok(None) => return (history, Restore::Absent),
            Ok(Some(bytes)) => match history::unpack(&bytes) {
                Ok(samples) => {
                    let count = samples.len();
                    for sample in samples {
                        history.append(sample);
                    }
                    Restore::Restored(count)
                }
                Err(e) => Restore::Corrupt(e.into()),
            },
            Err(e) => Restore::Corrupt(e),
        };

        if !matches!(outcome, Restore::Restored(0)) {
            history.append(SensorValue::gap(now));
        }
        settings.remove(&key);
        (history, outcome)
    }

    /// Packs, compresses and stores the buffer under `<sensor>/values`.
    pub fn flush(&self, settings: &Settings, sensor: &Identifier) -> Result<(), CoreError> {
        let samples: Vec<SensorValue> = self.samples.iter().copied().collect();
        settings.set_compressed(&sensor.settings_key(HISTORY_KEY), &history::pack(&samples))
    }

    /// Appends a sample, coalescing a third consecutive equal value into the
    /// latest entry.
    pub fn append(&mut self, sample: SensorValue) {
        if !self.enabled {
            return;
        }

        let len = self.samples.len();
        if len >= 2 {
            let same = |other: &SensorValue| (other.value() - sample.value()).abs() < f32::EPSILON;
            if same(&self.samples[len - 1]) && same(&self.samples[len - 2]) {
                self.samples[len - 1] = sample;
                return;
            }
        }
        self.samples.push_back(sample);
    }

    /// Drops samples older than the maximum age from the head.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        let max_age = Duration::seconds(HISTORY_MAX_AGE_SECS);
        while let Some(first) = self.samples.front() {
            if now - first.time() > max_age {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records one value update: eviction, then down-sampling.
    pub fn record(&mut self, value: Option<f32>, now: DateTime<Utc>) {
        self.evict(now);
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
            if self.count == DOWNSAMPLE_WINDOW {
                self.append(SensorValue::new(self.sum / DOWNSAMPLE_WINDOW as f32, now));
                self.sum = 0.0;
                self.count = 0;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Iterates samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SensorValue> {
        self.samples.iter()
    }
}

// =============================================================================
// Reading
// =============================================================================

/// Current value, running bounds and history of one sensor.
#[derive(Debug, Clone)]
pub struct Reading {
    value: Option<f32>,
    min: Option<f32>,
    max: Option<f32>,
    history: History,
}

impl Reading {
    /// Creates a reading with no value yet.
    pub fn new(history: History) -> Self {
        Reading {
            value: None,
            min: None,
            max: None,
            history,
        }
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn min(&self) -> Option<f32> {
        self.min
    }

    pub fn max(&self) -> Option<f32> {
        self.max
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Applies one value update.
    pub fn set_value(&mut self, value: Option<f32>, now: DateTime<Utc>) {
        self.history.record(value, now);
        self.seed(value);
    }

    /// Sets the current value and bounds without recording history.
    pub fn seed(&mut self, value: Option<f32>) {
        self.value = value;

        if let Some(v) = value {
            if self.min.map_or(true, |min| min > v) {
                self.min = Some(v);
            }
            if self.max.map_or(true, |max| max < v) {
                self.max = Some(v);
            }
        }
    }

    /// Clears the minimum; the next value reseeds it.
    pub fn reset_min(&mut self) {
        self.min = None;
    }

    /// Clears the maximum; the next value reseeds it.
    pub fn reset_max(&mut self) {
        self.max = None;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sensor_id() -> Identifier {
        Identifier::parse("/cpu/0/temperature/0").unwrap()
    }

    #[test]
    fn test_debounce_third_equal_value_overwrites() {
        let mut history = History::new(true);
        history.append(SensorValue::new(5.0, at(0)));
        history.append(SensorValue::new(5.0, at(1)));
        history.append(SensorValue::new(5.0, at(2)));
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().last().unwrap().time(), at(2));

        history.append(SensorValue::new(5.0, at(3)));
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().last().unwrap().time(), at(3));

        history.append(SensorValue::new(6.0, at(4)));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_debounce_looks_back_two_samples_only() {
        let mut history = History::new(true);
        history.append(SensorValue::new(1.0, at(0)));
        history.append(SensorValue::new(2.0, at(1)));
        history.append(SensorValue::new(2.0, at(2)));
        history.append(SensorValue::new(2.0, at(3)));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_disabled_history_ignores_appends() {
        let mut history = History::new(false);
        history.append(SensorValue::new(1.0, at(0)));
        assert!(history.is_empty());
    }

    #[test]
    fn test_downsampling_averages_four_updates() {
        let mut reading = Reading::new(History::new(true));
        for (i, v) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            reading.set_value(Some(v), at(i as i64));
        }
        let samples: Vec<_> = reading.history().iter().copied().collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value(), 2.5);
        assert_eq!(samples[0].time(), at(3));
    }

    #[test]
    fn test_absent_values_do_not_count_towards_window() {
        let mut reading = Reading::new(History::new(true));
        reading.set_value(Some(1.0), at(0));
        reading.set_value(None, at(1));
        reading.set_value(Some(1.0), at(2));
        reading.set_value(Some(1.0), at(3));
        assert!(reading.history().is_empty());
        reading.set_value(Some(1.0), at(4));
        assert_eq!(reading.history().len(), 1);
    }

    #[test]
    fn test_eviction_drops_samples_older_than_a_day() {
        let mut history = History::new(true);
        history.append(SensorValue::new(1.0, at(0)));
        history.append(SensorValue::new(2.0, at(10)));
        history.evict(at(HISTORY_MAX_AGE_SECS + 5));
        assert_eq!(history.len(), 1);
        assert_eq!(history.iter().next().unwrap().value(), 2.0);
    }

    #[test]
    fn test_seed_leaves_downsample_window_untouched() {
        let mut reading = Reading::new(History::new(true));
        reading.seed(Some(9.0));
        assert_eq!(reading.value(), Some(9.0));
        assert_eq!(reading.min(), Some(9.0));
        assert_eq!(reading.max(), Some(9.0));

        for (i, v) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            reading.set_value(Some(v), at(i as i64));
        }
        assert!(reading.history().is_empty());

        reading.set_value(Some(4.0), at(3));
        let samples: Vec<f32> = reading.history().iter().map(|s| s.value()).collect();
        assert_eq!(samples, vec![2.5]);
        assert_eq!(reading.max(), Some(9.0));
    }

    #[test]
    fn test_min_max_seed_and_reset() {
        let mut reading = Reading::new(History::new(true));
        assert_eq!(reading.min(), None);

        reading.set_value(Some(40.0), at(0));
        assert_eq!((reading.min(), reading.max()), (Some(40.0), Some(40.0)));

        reading.set_value(Some(45.0), at(1));
        reading.set_value(Some(35.0), at(2));
        assert_eq!((reading.min(), reading.max()), (Some(35.0), Some(45.0)));

        reading.reset_min();
        assert_eq!((reading.min(), reading.max()), (None, Some(45.0)));
        reading.reset_max();
        assert_eq!((reading.min(), reading.max()), (None, None));

        reading.set_value(None, at(3));
        assert_eq!(reading.min(), None);

        reading.set_value(Some(38.0), at(4));
        assert_eq!((reading.min(), reading.max()), (Some(38.0), Some(38.0)));
    }

    #[test]
    fn test_restore_absent_has_no_gap() {
        let settings = Settings::in_memory();
        let (history, outcome) = History::restore(&settings, &sensor_id(), at(0));
        assert!(matches!(outcome, Restore::Absent));
        assert!(history.is_empty());
    }

    #[test]
    fn test_flush_then_restore_appends_gap_and_removes_key() {
        let settings = Settings::in_memory();
        let mut history = History::new(true);
        history.append(SensorValue::new(1.0, at(0)));
        history.append(SensorValue::new(2.0, at(1)));
        history.flush(&settings, &sensor_id()).unwrap();

        let (restored, outcome) = History::restore(&settings, &sensor_id(), at(100));
        assert!(matches!(outcome, Restore::Restored(2)));
        let samples: Vec<_> = restored.iter().copied().collect();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1], SensorValue::new(2.0, at(1)));
        assert!(samples[2].is_gap());
        assert_eq!(samples[2].time(), at(100));
        assert!(!settings.contains("/cpu/0/temperature/0/values"));
    }

    #[test]
    fn test_restore_corrupt_blob_yields_gap_only() {
        let settings = Settings::in_memory();
        settings.set_string("/cpu/0/temperature/0/values", "definitely not base64!");

        let (history, outcome) = History::restore(&settings, &sensor_id(), at(7));
        assert!(matches!(outcome, Restore::Corrupt(_)));
        assert_eq!(history.len(), 1);
        assert!(history.iter().next().unwrap().is_gap());
        assert!(!settings.contains("/cpu/0/temperature/0/values"));
    }

    #[test]
    fn test_restore_truncated_payload_is_corrupt() {
        let settings = Settings::in_memory();
        settings
            .set_compressed("/cpu/0/temperature/0/values", &[5, 0, 0, 0, 1, 2])
            .unwrap();

        let (history, outcome) = History::restore(&settings, &sensor_id(), at(7));
        assert!(matches!(outcome, Restore::Corrupt(CoreError::History(_))));
        assert_eq!(history.len(), 1);
    }
}
