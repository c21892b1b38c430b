//! # hwmirror Agent
//!
//! Headless monitor: reads Linux hwmon, publishes the tree, mirrors it back.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Mirror Agent                                  │
//! │                                                                         │
//! │  hwmon ───► MonitorAgent ───► Namespace ───► RemoteMirrorAgent          │
//! │                  │                                  │                   │
//! │                  ▼                                  ▼                   │
//! │            settings.db                      remote-settings.db          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Environment
//! - `HWMIRROR_CONFIG` - path of the TOML configuration file
//! - `HWMIRROR_HWMON_ROOT` - hwmon directory (default `/sys/class/hwmon`)
//! - `RUST_LOG` - log filter (default `info`)

mod hwmon;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use hwmirror_core::settings::DISABLE_HISTORY_KEY;
use hwmirror_core::{Identifier, Settings};
use hwmirror_store::{Database, DbConfig, PersistentSettings};
use hwmirror_sync::{
    EventFeed, HardwareTree, MirrorConfig, MonitorAgent, MonitorHandle, Namespace, RemoteEvent,
    RemoteMirror, RemoteMirrorAgent,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Interval;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::hwmon::{HwmonEngine, DEFAULT_HWMON_ROOT};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting hwmirror agent...");

    // Load configuration
    let config_path = std::env::var_os("HWMIRROR_CONFIG").map(PathBuf::from);
    let config = MirrorConfig::load(config_path).context("loading configuration")?;
    let database_path = config.database_path();
    info!(
        interval_ms = config.monitor.update_interval_ms,
        feed = ?config.feed.mode,
        database = %database_path.display(),
        "Configuration loaded"
    );

    // Open settings stores
    let (local_db, local_store) = open_settings(&database_path).await?;
    let (remote_db, remote_store) =
        open_settings(&database_path.with_file_name("remote-settings.db")).await?;

    let settings = Settings::new(local_store.clone());
    let remote_settings = Settings::new(remote_store.clone());
    apply_history_flag(&settings, config.history.enabled);
    apply_history_flag(&remote_settings, config.history.enabled);

    // Engine side
    let hwmon_root =
        std::env::var_os("HWMIRROR_HWMON_ROOT").map_or_else(|| PathBuf::from(DEFAULT_HWMON_ROOT), PathBuf::from);
    let engine = Arc::new(HwmonEngine::new(hwmon_root));
    let categories = config.categories.flags();

    let namespace = Namespace::new(EventFeed::start(config.feed_config()));
    let tree = HardwareTree::new(engine.clone(), settings, categories);
    let monitor = MonitorAgent::new(tree, namespace.clone(), config.monitor_config()).start();

    // Remote side
    let remote = RemoteMirrorAgent::new(
        RemoteMirror::new(Arc::new(namespace), remote_settings, categories),
        config.remote_config(),
    )
    .start();
    remote.open().await?;

    let mut notices = monitor.subscribe();
    let mut remote_events = remote.subscribe();
    let mut rescan = config.rescan_interval().map(tokio::time::interval);

    info!("Agent running");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            notice = notices.recv() => match notice {
                Ok(notice) => debug!(kind = ?notice.kind, identifier = %notice.identifier, "Tree changed"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Tree notices lagged"),
                Err(RecvError::Closed) => break,
            },

            event = remote_events.recv() => match event {
                Ok(event) => log_remote_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Remote events lagged"),
                Err(RecvError::Closed) => break,
            },

            _ = tick(&mut rescan) => {
                engine.rescan();
                if let Err(e) = sync_hardware(&monitor, &engine).await {
                    warn!(error = %e, "Rescan failed");
                }
            }
        }
    }

    info!("Shutting down...");

    if let Err(e) = remote.close().await {
        warn!(error = %e, "Remote mirror close failed");
    }
    if let Err(e) = monitor.close().await {
        warn!(error = %e, "Monitor close failed");
    }

    let saved = local_store.save(&local_db).await?;
    let remote_saved = remote_store.save(&remote_db).await?;
    info!(saved, remote_saved, "Settings saved");

    local_db.close().await;
    remote_db.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Waits for the next rescan tick, or forever when rescanning is off.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Opens a settings database and loads its snapshot.
async fn open_settings(path: &Path) -> anyhow::Result<(Database, Arc<PersistentSettings>)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = Database::new(DbConfig::new(path))
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let store = PersistentSettings::load(&db).await?;
    info!(path = %path.display(), entries = store.len(), "Settings loaded");
    Ok((db, Arc::new(store)))
}

/// Writes the configured history switch into a settings store. The key is
/// persisted, so it is rewritten on every start.
fn apply_history_flag(settings: &Settings, enabled: bool) {
    settings.set_bool(DISABLE_HISTORY_KEY, !enabled);
}

/// Brings the monitor's top-level hardware in line with the engine.
async fn sync_hardware(monitor: &MonitorHandle, engine: &HwmonEngine) -> anyhow::Result<()> {
    use hwmirror_sync::SensingEngine;

    let present: Vec<Identifier> = engine.hardware().into_iter().map(|h| h.identifier).collect();
    let current = monitor.list_hardware().await?;
    let (added, removed) = diff_hardware(&current, &present);

    for identifier in removed {
        info!(identifier = %identifier, "Hardware disappeared");
        monitor.remove_hardware(identifier, None).await?;
    }
    for identifier in added {
        info!(identifier = %identifier, "Hardware appeared");
        monitor.add_hardware(identifier, None).await?;
    }
    Ok(())
}

/// Splits two identifier lists into (only in `present`, only in `current`).
fn diff_hardware(current: &[Identifier], present: &[Identifier]) -> (Vec<Identifier>, Vec<Identifier>) {
    let current_set: HashSet<&Identifier> = current.iter().collect();
    let present_set: HashSet<&Identifier> = present.iter().collect();

    let added = present.iter().filter(|id| !current_set.contains(id)).cloned().collect();
    let removed = current.iter().filter(|id| !present_set.contains(id)).cloned().collect();
    (added, removed)
}

fn log_remote_event(event: &RemoteEvent) {
    match event {
        RemoteEvent::HardwareAdded(id) => info!(hardware = %id, "Remote hardware added"),
        RemoteEvent::HardwareRemoved(id) => info!(hardware = %id, "Remote hardware removed"),
        RemoteEvent::SensorAdded { hardware, sensor } => {
            debug!(hardware = %hardware, sensor = %sensor, "Remote sensor added")
        }
        RemoteEvent::SensorRemoved { hardware, sensor } => {
            debug!(hardware = %hardware, sensor = %sensor, "Remote sensor removed")
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<Identifier> {
        list.iter().map(|s| Identifier::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_diff_hardware() {
        let current = ids(&["/mainboard", "/amdcpu/0", "/hdd/0"]);
        let present = ids(&["/mainboard", "/amdcpu/0", "/hdd/1"]);

        let (added, removed) = diff_hardware(&current, &present);
        assert_eq!(added, ids(&["/hdd/1"]));
        assert_eq!(removed, ids(&["/hdd/0"]));
    }

    #[test]
    fn test_diff_hardware_unchanged() {
        let list = ids(&["/mainboard"]);
        let (added, removed) = diff_hardware(&list, &list);
        assert!(added.is_empty());
        assert!(removed.is_empty());
    }

    #[tokio::test]
    async fn test_open_settings_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.db");

        let (db, store) = open_settings(&path).await.unwrap();
        assert!(path.parent().unwrap().exists());
        assert!(store.is_empty());
        db.close().await;
    }

    #[tokio::test]
    async fn test_history_flag_follows_config_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");

        let (db, store) = open_settings(&path).await.unwrap();
        let settings = Settings::new(store.clone());
        apply_history_flag(&settings, false);
        assert!(!settings.history_enabled());
        store.save(&db).await.unwrap();
        db.close().await;

        let (db, store) = open_settings(&path).await.unwrap();
        let settings = Settings::new(store.clone());
        assert!(!settings.history_enabled());
        apply_history_flag(&settings, true);
        assert!(settings.history_enabled());
        store.save(&db).await.unwrap();
        db.close().await;

        let (db, store) = open_settings(&path).await.unwrap();
        assert!(Settings::new(store).history_enabled());
        db.close().await;
    }
}
