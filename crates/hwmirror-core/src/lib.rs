//! # hwmirror-core: Pure Telemetry Model
//!
//! Types and algorithms shared by the engine tree, the publish mirror and
//! the remote mirror. Zero I/O: every function here is deterministic given
//! its inputs (timestamps are always passed in).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        hwmirror Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/mirror-agent                            │   │
//! │  │    hwmon engine ──► MonitorAgent ──► Namespace ──► RemoteMirror │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               hwmirror-sync  /  hwmirror-store                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ hwmirror-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐ ┌───────────┐ ┌───────────┐ ┌─────────────┐  │   │
//! │  │   │ identifier │ │  history  │ │  reading  │ │  settings   │  │   │
//! │  │   │ /hw/sensor │ │ pack      │ │ min/max   │ │ typed get/  │  │   │
//! │  │   │ paths      │ │ unpack    │ │ debounce  │ │ set, blobs  │  │   │
//! │  │   └────────────┘ └───────────┘ └───────────┘ └─────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`identifier`] - Hierarchical node paths, the cross-view join key
//! - [`types`] - Hardware/sensor type tags, categories, control modes
//! - [`history`] - Byte-plane transposed sample codec
//! - [`reading`] - Current/min/max tracking and the bounded history buffer
//! - [`settings`] - Settings store contract with typed and compressed access
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use hwmirror_core::history::{pack, unpack, SensorValue};
//!
//! let samples = vec![SensorValue::new(42.0, Utc::now())];
//! assert_eq!(unpack(&pack(&samples)).unwrap(), samples);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod history;
pub mod identifier;
pub mod reading;
pub mod settings;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, HistoryError};
pub use history::SensorValue;
pub use identifier::Identifier;
pub use reading::{History, Reading, Restore};
pub use settings::{MemorySettings, Settings, SettingsStore};
pub use types::*;
