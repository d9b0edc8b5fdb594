// # Settings Store Trait
//
// Defines the interface for the durable per-user settings store.
//
// ## Purpose
//
// The store holds one opaque string value per (key, user) pair and surfaces
// change events so that a cache can be kept in sync with writers in other
// processes. The rotation lock manager stores its whole settings map under a
// single well-known key; the store neither parses nor validates the value.
//
// ## Implementations
//
// - In-memory: `store::MemorySettingsStore` (tests, embedding)
// - File-based: `store::FileSettingsStore` (JSON state file)
// - Platform stores (system settings providers, registries) are supplied by
//   the embedder behind this trait.

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::policy::UserId;

/// Event emitted when a stored value changes
///
/// Carries no payload beyond the identity of the changed slot: the contract
/// is "the value may have changed", and consumers re-read through the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    /// The settings key that was written
    pub key: String,
    /// The user scope the write targeted
    pub user: UserId,
}

/// Trait for settings store implementations
///
/// Implementations must be thread-safe and usable across async tasks: the
/// manager owns one handle, and other handles to the same store may be held
/// by other components or processes.
///
/// # Change Events
///
/// `watch` must deliver an event for every write to the watched slot,
/// including writes made through the same store handle. Event delivery may
/// coalesce under load; consumers must treat an event as "re-read now", not
/// as a diff.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read the raw string value for a key in a user scope
    ///
    /// # Returns
    ///
    /// - `Ok(Some(String))`: The stored value
    /// - `Ok(None)`: No value stored for this slot
    /// - `Err(Error)`: Storage error
    async fn read(&self, key: &str, user: UserId) -> Result<Option<String>, crate::Error>;

    /// Write the raw string value for a key in a user scope
    ///
    /// Writing must fire the change event for every watcher of this slot.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Successfully written
    /// - `Err(Error)`: Storage error
    async fn write(&self, key: &str, value: &str, user: UserId) -> Result<(), crate::Error>;

    /// Watch a slot for changes
    ///
    /// Returns a stream yielding a [`SettingChange`] for every write to the
    /// given (key, user) slot. The stream runs until the store is dropped.
    ///
    /// # Behavior
    ///
    /// - Must not yield for writes to other keys or user scopes
    /// - Must be cancellation-safe (dropping the stream releases resources)
    fn watch(
        &self,
        key: &str,
        user: UserId,
    ) -> Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>>;
}
