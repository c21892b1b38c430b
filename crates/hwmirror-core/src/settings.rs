//! # Settings Contract
//!
//! Key/value persistence used by nodes for name overrides, parameter values,
//! control state and packed history.
//!
//! ## Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Settings Layers                                  │
//! │                                                                         │
//! │  Settings (typed wrapper, cheap to clone)                              │
//! │   ├── get/set string, i32, f32, bool                                   │
//! │   ├── get/set bytes           ──► base64                               │
//! │   └── get/set compressed      ──► raw deflate ──► base64               │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  dyn SettingsStore (string → string)                                   │
//! │   ├── MemorySettings          (tests, ephemeral clients)               │
//! │   └── PersistentSettings      (hwmirror-store, SQLite backed)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stores use interior mutability: every node holds a clone of the same
//! `Settings`, possibly on different threads.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::{Arc, PoisonError, RwLock};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{CoreError, CoreResult};

/// Settings key that turns off history recording for every sensor.
pub const DISABLE_HISTORY_KEY: &str = "DisableSensorHistory";

// =============================================================================
// Store Trait
// =============================================================================

/// Raw string key/value store.
pub trait SettingsStore: Send + Sync {
    /// Returns true if `key` has a value.
    fn contains(&self, key: &str) -> bool;

    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String);

    /// Removes `key`. Absent keys are ignored.
    fn remove(&self, key: &str);
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every entry, in key order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl SettingsStore for MemorySettings {
    fn contains(&self, key: &str) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

// =============================================================================
// Typed Wrapper
// =============================================================================

/// Typed access to a shared settings store.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn SettingsStore>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings").finish_non_exhaustive()
    }
}

impl Settings {
    /// Wraps a store.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Settings { store }
    }

    /// Creates settings backed by a fresh [`MemorySettings`].
    pub fn in_memory() -> Self {
        Settings::new(Arc::new(MemorySettings::new()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains(key)
    }

    pub fn remove(&self, key: &str) {
        self.store.remove(key);
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.store.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn set_string(&self, key: &str, value: &str) {
        self.store.set(key, value.to_string());
    }

    pub fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.store
            .get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn set_i32(&self, key: &str, value: i32) {
        self.store.set(key, value.to_string());
    }

    pub fn get_f32(&self, key: &str, default: f32) -> f32 {
        self.store
            .get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn set_f32(&self, key: &str, value: f32) {
        self.store.set(key, value.to_string());
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.store.get(key).as_deref().map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    pub fn set_bool(&self, key: &str, value: bool) {
        self.store
            .set(key, if value { "true" } else { "false" }.to_string());
    }

    /// Returns the base64-decoded blob under `key`.
    pub fn get_bytes(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        match self.store.get(key) {
            None => Ok(None),
            Some(text) => BASE64_STANDARD
                .decode(text.trim())
                .map(Some)
                .map_err(|e| CoreError::InvalidEncoding {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    pub fn set_bytes(&self, key: &str, value: &[u8]) {
        self.store.set(key, BASE64_STANDARD.encode(value));
    }

    /// Returns the inflated blob under `key`.
    ///
    /// ## Returns
    /// * `Ok(None)` - key absent
    /// * `Ok(Some(bytes))` - decoded payload
    /// * `Err(_)` - armor or deflate stream corrupt
    pub fn get_compressed(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        let Some(deflated) = self.get_bytes(key)? else {
            return Ok(None);
        };

        let mut inflated = Vec::new();
        DeflateDecoder::new(deflated.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|e| CoreError::Decompression {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(inflated))
    }

    /// Deflates and stores `value` under `key`.
    pub fn set_compressed(&self, key: &str, value: &[u8]) -> CoreResult<()> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(value)
            .map_err(|e| CoreError::Compression(e.to_string()))?;
        let deflated = encoder
            .finish()
            .map_err(|e| CoreError::Compression(e.to_string()))?;
        self.set_bytes(key, &deflated);
        Ok(())
    }

    /// Returns true unless history recording is globally disabled.
    pub fn history_enabled(&self) -> bool {
        !self.get_bool(DISABLE_HISTORY_KEY, false)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
