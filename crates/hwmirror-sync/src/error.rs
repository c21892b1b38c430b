//! # Mirror Error Types
//!
//! Error types for tree publication and remote mirroring.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Mirror Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Registry     │  │     Instance Source     │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │ AlreadyPublished│  │  InstanceGone           │ │
//! │  │  ConfigLoad...  │  │ NotPublished    │  │  KindMismatch           │ │
//! │  │  ConfigSave...  │  │ PublishRejected │  │  UnknownAction/Property │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │     Domain      │  │                 Internal                    │  │
//! │  │                 │  │                                             │  │
//! │  │  Core           │  │  ChannelError, ShuttingDown                 │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use hwmirror_core::{CoreError, Identifier};
use thiserror::Error;

use crate::schema::EntityKind;

/// Result type alias for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Mirror error type covering publication, lookup and agent failures.
#[derive(Debug, Error)]
pub enum MirrorError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid mirror configuration.
    #[error("Invalid mirror configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// An instance with this identifier is already registered.
    #[error("Instance already published: {0}")]
    AlreadyPublished(Identifier),

    /// Update or revoke of an instance that was never registered.
    #[error("Instance not published: {0}")]
    NotPublished(Identifier),

    /// The registry refused the instance.
    #[error("Registry rejected {identifier}: {reason}")]
    PublishRejected { identifier: Identifier, reason: String },

    // =========================================================================
    // Instance Source Errors
    // =========================================================================
    /// The instance disappeared between notification and lookup.
    ///
    /// ## When This Occurs
    /// - A removal raced a creation event on the remote side
    /// - A proxy refreshed after its publisher revoked it
    #[error("Instance no longer exists: {0}")]
    InstanceGone(Identifier),

    /// The instance exists but is of a different class.
    #[error("{identifier} is a {actual}, expected {expected}")]
    KindMismatch {
        identifier: Identifier,
        expected: EntityKind,
        actual: EntityKind,
    },

    /// The class has no action with this name.
    #[error("{class} has no action named {action}")]
    UnknownAction { class: EntityKind, action: String },

    /// The class has no field with this name.
    #[error("{class} has no property named {property}")]
    UnknownProperty { class: EntityKind, property: String },

    /// Wrong number of arguments for an action.
    #[error("{action} takes {expected} argument(s), got {actual}")]
    InvalidArguments {
        action: String,
        expected: usize,
        actual: usize,
    },

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Identifier, history or settings failure from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Agent is shutting down.
    #[error("Mirror agent is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for MirrorError {
    fn from(err: std::io::Error) -> Self {
        MirrorError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for MirrorError {
    fn from(err: toml::de::Error) -> Self {
        MirrorError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for MirrorError {
    fn from(err: toml::ser::Error) -> Self {
        MirrorError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl MirrorError {
    /// Returns true if the failure is an expected race with the live tree.
    ///
    /// Remote proxies keep their cached state and try again on the next
    /// update when this holds.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MirrorError::InstanceGone(_) | MirrorError::NotPublished(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            MirrorError::InvalidConfig(_)
                | MirrorError::ConfigLoadFailed(_)
                | MirrorError::ConfigSaveFailed(_)
        )
    }
}
