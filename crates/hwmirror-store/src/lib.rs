//! # hwmirror-store: Durable Settings Storage
//!
//! SQLite-backed settings for the hardware mirror. Name overrides,
//! parameter values, control modes and packed sensor history survive
//! restarts through this crate.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Settings Data Flow                               │
//! │                                                                         │
//! │  Sensor / Parameter / Control nodes (hwmirror-sync)                    │
//! │       │  Settings::set_f32 / set_compressed ...                         │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 hwmirror-store (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────────┐  ┌────────────────┐  ┌──────────────┐   │   │
//! │  │   │PersistentSettings│  │ Settings repo  │  │  Migrations  │   │   │
//! │  │   │ in-memory map    │─►│ load_all       │  │  (embedded)  │   │   │
//! │  │   │ dirty flag       │  │ replace_all    │  │ 001_settings │   │   │
//! │  │   └──────────────────┘  └────────────────┘  └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (settings.db)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hwmirror_core::Settings;
//! use hwmirror_store::{Database, DbConfig, PersistentSettings};
//!
//! let db = Database::new(DbConfig::new("settings.db")).await?;
//! let store = Arc::new(PersistentSettings::load(&db).await?);
//! let settings = Settings::new(store.clone());
//! // ... run the tree ...
//! store.save(&db).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod persistent;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use persistent::PersistentSettings;
pub use pool::{Database, DbConfig};
pub use repository::settings::SettingsRepository;
