//! # Error Types
//!
//! Domain-specific error types for hwmirror-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  hwmirror-core errors (this file)                                      │
//! │  ├── CoreError        - Identifier syntax, settings armor              │
//! │  └── HistoryError     - Undecodable history payloads                   │
//! │                                                                         │
//! │  hwmirror-store errors (separate crate)                                │
//! │  └── StoreError       - Settings database failures                     │
//! │                                                                         │
//! │  hwmirror-sync errors (separate crate)                                 │
//! │  └── MirrorError      - Registry, source and agent failures            │
//! │                                                                         │
//! │  Flow: HistoryError → CoreError → (caught) empty history + gap marker  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core model errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Identifier text or segment is malformed.
    ///
    /// ## When This Occurs
    /// - Segment is empty, contains a space or a `/`
    /// - Parsed text is empty or does not start with `/`
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: &'static str },

    /// Type tag text does not name a known variant.
    #[error("Unknown {kind}: '{value}'")]
    UnknownTag { kind: &'static str, value: String },

    /// A stored settings value is not valid base64.
    #[error("Settings value for '{key}' is not valid base64: {message}")]
    InvalidEncoding { key: String, message: String },

    /// A stored compressed blob could not be inflated.
    #[error("Settings value for '{key}' could not be decompressed: {message}")]
    Decompression { key: String, message: String },

    /// Compression of an outgoing blob failed.
    #[error("Compression failed: {0}")]
    Compression(String),

    /// The packed history payload is corrupt.
    #[error(transparent)]
    History(#[from] HistoryError),
}

impl CoreError {
    /// Creates an InvalidIdentifier error.
    pub fn invalid_identifier(value: impl Into<String>, reason: &'static str) -> Self {
        CoreError::InvalidIdentifier {
            value: value.into(),
            reason,
        }
    }
}

// =============================================================================
// History Error
// =============================================================================

/// Errors raised while decoding a packed history payload.
///
/// None of these ever reach the user: the sensor that restores its history
/// treats every variant as "no history" and records a gap.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// Payload is shorter than the 4-byte sample count.
    #[error("History payload truncated: {len} bytes")]
    Truncated { len: usize },

    /// Sample count is negative.
    #[error("History payload has negative sample count {0}")]
    NegativeCount(i32),

    /// Payload length does not match the sample count.
    #[error("History payload length {actual} does not match {count} samples (expected {expected})")]
    LengthMismatch {
        count: usize,
        expected: usize,
        actual: usize,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
