//! # Persistent Settings
//!
//! In-memory settings map backed by the SQLite `settings` table.
//!
//! Nodes call the synchronous [`SettingsStore`] methods from any thread; the
//! map is loaded once at startup and written back as a whole snapshot by
//! [`PersistentSettings::save`]. No lock is ever held across an `.await`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use hwmirror_core::SettingsStore;
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::pool::Database;

/// Settings store persisted to SQLite.
#[derive(Debug, Default)]
pub struct PersistentSettings {
    values: RwLock<BTreeMap<String, String>>,
    dirty: AtomicBool,
}

impl PersistentSettings {
    /// Creates an empty store (nothing loaded).
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every row from the database.
    pub async fn load(db: &Database) -> StoreResult<Self> {
        let rows = db.settings().load_all().await?;
        info!(count = rows.len(), "Settings loaded");
        Ok(PersistentSettings {
            values: RwLock::new(rows.into_iter().collect()),
            dirty: AtomicBool::new(false),
        })
    }

    /// Writes the current map to the database, replacing the previous
    /// snapshot. Returns the number of entries written.
    pub async fn save(&self, db: &Database) -> StoreResult<usize> {
        let entries = self.entries();
        db.settings().replace_all(&entries).await?;
        self.dirty.store(false, Ordering::SeqCst);
        info!(count = entries.len(), "Settings saved");
        Ok(entries.len())
    }

    /// Returns true if the map changed since the last load or save.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry in key order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl SettingsStore for PersistentSettings {
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
        let previous = self
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        if previous.as_deref() != Some(value.as_str()) {
            debug!(key, "Setting changed");
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    fn remove(&self, key: &str) {
        let removed = self
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use hwmirror_core::Settings;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let store = Arc::new(PersistentSettings::new());
        let settings = Settings::new(store.clone());
        settings.set_string("/lpc/nct6798d/name", "Nuvoton");
        settings.set_compressed("/lpc/nct6798d/fan/0/values", &[1, 2, 3]).unwrap();
        assert!(store.is_dirty());

        assert_eq!(store.save(&db).await.unwrap(), 2);
        assert!(!store.is_dirty());

        let reloaded = Settings::new(Arc::new(PersistentSettings::load(&db).await.unwrap()));
        assert_eq!(reloaded.get_string("/lpc/nct6798d/name", ""), "Nuvoton");
        assert_eq!(
            reloaded.get_compressed("/lpc/nct6798d/fan/0/values").unwrap(),
            Some(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn test_removed_keys_disappear_on_save() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settings().upsert("/hdd/0/temperature/0/values", "AAAA").await.unwrap();

        let store = PersistentSettings::load(&db).await.unwrap();
        assert_eq!(store.len(), 1);
        store.remove("/hdd/0/temperature/0/values");
        assert!(store.is_dirty());
        store.save(&db).await.unwrap();

        assert_eq!(db.settings().count().await.unwrap(), 0);
    }

    #[test]
    fn test_rewriting_same_value_is_not_dirty() {
        let store = PersistentSettings::new();
        store.set("k", "v".to_string());
        store.dirty.store(false, Ordering::SeqCst);
        store.set("k", "v".to_string());
        assert!(!store.is_dirty());
    }
}
