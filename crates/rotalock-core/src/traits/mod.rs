//! Core traits for the rotation lock settings system
//!
//! This module defines the abstract interfaces the manager depends on.
//!
//! - [`SettingsStore`]: durable per-user key-value storage with change events
//! - [`DefaultsProvider`]: configured default entries for a deployment

pub mod defaults;
pub mod settings_store;

pub use defaults::{DefaultsProvider, StaticDefaults};
pub use settings_store::{SettingChange, SettingsStore};
