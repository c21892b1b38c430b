//! # hwmirror-sync: Live Tree Synchronization
//!
//! Keeps three views of the monitored hardware consistent: the engine-side
//! tree, its published projection, and remote reconstructions of it.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mirror Architecture                              │
//! │                                                                         │
//! │  ┌───────────────┐        ┌──────────────────────────────────────────┐  │
//! │  │ SensingEngine │◄──────►│ MonitorAgent (one task)                  │  │
//! │  │ (hwmon, ...)  │ read / │                                          │  │
//! │  └───────────────┘ control│  HardwareTree ──TreeEvent──► PublishMirror│ │
//! │                           └──────────────────────────────┬───────────┘  │
//! │                                                          │ publish /    │
//! │                                                          ▼ revoke       │
//! │                           ┌──────────────────────────────────────────┐  │
//! │                           │ Namespace                                │  │
//! │                           │  instances by identifier, actions,       │  │
//! │                           │  EventFeed (immediate or 5 s windows)    │  │
//! │                           └──────────────────────────────┬───────────┘  │
//! │                                   records / actions      │ Created /    │
//! │                                                          ▼ Deleted      │
//! │                           ┌──────────────────────────────────────────┐  │
//! │                           │ RemoteMirrorAgent (one task)             │  │
//! │                           │  RemoteMirror: proxies, own histories    │  │
//! │                           └──────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - Sensing engine boundary and a static in-memory engine
//! - [`node`] - Hardware/Sensor/Parameter/Control nodes and the visitor table
//! - [`tree`] - `HardwareTree` with the visibility state machine
//! - [`schema`] - Static entity schema (classes, fields, actions)
//! - [`instance`] - Published instances and their property/action access
//! - [`publish`] - `PublishMirror` and the registry boundary
//! - [`feed`] - Structural event feed
//! - [`namespace`] - In-process registry + instance source
//! - [`source`] - What a remote mirror may ask of a namespace
//! - [`remote`] - `RemoteMirror` and its owning agent
//! - [`agent`] - `MonitorAgent`, the engine-side owning context
//! - [`config`] - Mirror configuration
//! - [`error`] - Mirror error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hwmirror_sync::{EventFeed, HardwareTree, MirrorConfig, MonitorAgent, Namespace};
//!
//! let config = MirrorConfig::load_or_default(None);
//! let namespace = Namespace::new(EventFeed::start(config.feed_config()));
//! let tree = HardwareTree::new(engine, settings, config.categories.flags());
//!
//! let monitor = MonitorAgent::new(tree, namespace.clone(), config.monitor_config()).start();
//! println!("{}", monitor.report().await?);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod instance;
pub mod namespace;
pub mod node;
pub mod publish;
pub mod remote;
pub mod schema;
pub mod source;
pub mod tree;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{MonitorAgent, MonitorConfig, MonitorHandle, TreeNotice};
pub use config::MirrorConfig;
pub use engine::{
    ControlDescription, HardwareDescription, ParameterDescription, SensingEngine, SensorDescription,
    StaticEngine,
};
pub use error::{MirrorError, MirrorResult};
pub use feed::{EventFeed, FeedConfig, FeedMode, InstanceEvent, InstanceEventKind, Subscription};
pub use instance::{InstanceBody, MirrorInstance};
pub use namespace::Namespace;
pub use node::{NodeRef, VisitorTable};
pub use publish::{InstanceRegistry, PublishMirror};
pub use remote::{RemoteConfig, RemoteEvent, RemoteMirror, RemoteMirrorAgent, RemoteMirrorHandle, RemoteTreeView};
pub use schema::{EntityKind, EntitySchema, SCHEMA};
pub use source::{ControlRecord, HardwareRecord, InstanceSource, ParameterRecord, SensorRecord};
pub use tree::{HardwareTree, TreeEvent, TreeEventKind};
