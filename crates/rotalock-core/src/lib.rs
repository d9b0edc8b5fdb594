// # rotalock-core
//
// Core library for device-state based rotation lock settings.
//
// ## Architecture Overview
//
// This library keeps an in-memory device-state → rotation-lock-policy map
// synchronized with a durable per-user settings store:
//
// - **SettingsStore**: Trait for durable string storage with change events
// - **DefaultsProvider**: Trait supplying configured per-state defaults
// - **codec**: The flat `k:v:k:v...` wire format of the persisted value
// - **SettingsManager**: Orchestrates load, defaults-fallback, persist, and
//   listener notification
// - **store**: Reference store implementations (memory, file)
//
// ## Design Principles
//
// 1. **Separation of Concerns**: The manager owns policy; stores own bytes
// 2. **Event-Driven**: External writes surface as change-event streams
// 3. **Availability over Propagation**: Unusable persisted state degrades to
//    the configured defaults instead of erroring
// 4. **Library-First**: The daemon is a thin shell over this crate

pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod policy;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{RotalockConfig, StoreBackendConfig};
pub use error::{Error, Result};
pub use manager::{DEVICE_STATE_ROTATION_LOCK, SettingsListener, SettingsManager};
pub use policy::{DeviceState, RotationLockPolicy, UserId};
pub use store::{FileSettingsStore, MemorySettingsStore};
pub use traits::{DefaultsProvider, SettingChange, SettingsStore, StaticDefaults};
