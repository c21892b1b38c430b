//! # Repository Module
//!
//! Database repository implementations.
//!
//! - [`SettingsRepository`](settings::SettingsRepository) - key/value rows

pub mod settings;
