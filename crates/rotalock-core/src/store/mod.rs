//! Reference settings store implementations
//!
//! - [`MemorySettingsStore`]: in-memory, non-persistent; handles clone-share
//!   state, which also makes it the standard test double for multi-writer
//!   scenarios.
//! - [`FileSettingsStore`]: JSON state file with atomic writes and backup
//!   recovery.
//!
//! Platform-native stores (system settings providers and their
//! cross-process notification transports) are supplied by the embedder
//! behind the [`SettingsStore`](crate::traits::SettingsStore) trait.

pub mod file;
pub mod memory;

pub use file::FileSettingsStore;
pub use memory::MemorySettingsStore;

use crate::config::StoreBackendConfig;
use crate::traits::SettingsStore;

/// Build a settings store from its backend configuration
pub async fn from_config(config: &StoreBackendConfig) -> Result<Box<dyn SettingsStore>, crate::Error> {
    match config {
        StoreBackendConfig::File { path } => Ok(Box::new(FileSettingsStore::new(path).await?)),
        StoreBackendConfig::Memory => Ok(Box::new(MemorySettingsStore::new())),
    }
}
