// # Memory Settings Store
//
// In-memory implementation of SettingsStore.
//
// ## Purpose
//
// Provides a simple, fast settings store that doesn't persist across
// restarts. Cloned handles share the same underlying state and change
// channel, so a second handle behaves like a second process writing to the
// same store: every watcher sees the write.
//
// ## When to Use
//
// - Testing environments
// - Embedders that provide their own durability around the manager
// - Scenarios where losing settings on restart is acceptable (the manager
//   falls back to the configured defaults on the next start)

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use crate::Error;
use crate::policy::UserId;
use crate::traits::settings_store::{SettingChange, SettingsStore};

/// Capacity of the change broadcast channel
///
/// Settings writes are rare; a lagged watcher receives a synthesized change
/// event rather than the dropped backlog, which is enough for a
/// "re-read now" contract.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// In-memory settings store implementation
///
/// Values live in a HashMap keyed by (key, user) behind a RwLock. Change
/// events fan out over a tokio broadcast channel shared by all clones.
///
/// # Example
///
/// ```rust,no_run
/// use rotalock_core::store::MemorySettingsStore;
/// use rotalock_core::traits::SettingsStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySettingsStore::new();
///
///     store.write("device_state_rotation_lock", "0:1", 0).await?;
///
///     let value = store.read("device_state_rotation_lock", 0).await?;
///     assert_eq!(value.as_deref(), Some("0:1"));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemorySettingsStore {
    values: Arc<RwLock<HashMap<(String, UserId), String>>>,
    changes: broadcast::Sender<SettingChange>,
}

impl MemorySettingsStore {
    /// Create a new empty memory settings store
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Get the number of stored values across all user scopes
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    /// Clear all stored values without firing change events
    pub async fn clear(&self) {
        self.values.write().await.clear();
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn read(&self, key: &str, user: UserId) -> Result<Option<String>, Error> {
        let guard = self.values.read().await;
        Ok(guard.get(&(key.to_string(), user)).cloned())
    }

    async fn write(&self, key: &str, value: &str, user: UserId) -> Result<(), Error> {
        {
            let mut guard = self.values.write().await;
            guard.insert((key.to_string(), user), value.to_string());
        }

        // Nobody watching is fine; send only fails without receivers.
        let _ = self.changes.send(SettingChange {
            key: key.to_string(),
            user,
        });
        Ok(())
    }

    fn watch(
        &self,
        key: &str,
        user: UserId,
    ) -> Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>> {
        let key = key.to_string();
        let rx = self.changes.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |event| match event {
            Ok(change) if change.key == key && change.user == user => Some(change),
            Ok(_) => None,
            // A lagged watcher lost events; synthesize one so it re-reads.
            Err(BroadcastStreamRecvError::Lagged(_)) => Some(SettingChange {
                key: key.clone(),
                user,
            }),
        });
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemorySettingsStore::new();

        assert!(store.is_empty().await);
        assert_eq!(store.read("some_key", 0).await.unwrap(), None);

        store.write("some_key", "0:1", 0).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.read("some_key", 0).await.unwrap().as_deref(),
            Some("0:1")
        );
    }

    #[tokio::test]
    async fn test_memory_store_user_scopes_are_isolated() {
        let store = MemorySettingsStore::new();

        store.write("some_key", "for-user-0", 0).await.unwrap();
        store.write("some_key", "for-user-10", 10).await.unwrap();

        assert_eq!(
            store.read("some_key", 0).await.unwrap().as_deref(),
            Some("for-user-0")
        );
        assert_eq!(
            store.read("some_key", 10).await.unwrap().as_deref(),
            Some("for-user-10")
        );
    }

    #[tokio::test]
    async fn test_watch_fires_on_write_through_any_handle() {
        let store = MemorySettingsStore::new();
        let other_handle = store.clone();

        let mut changes = store.watch("some_key", 0);
        other_handle.write("some_key", "0:2", 0).await.unwrap();

        let change = changes.next().await.unwrap();
        assert_eq!(change.key, "some_key");
        assert_eq!(change.user, 0);

        // The write is visible through the first handle
        assert_eq!(
            store.read("some_key", 0).await.unwrap().as_deref(),
            Some("0:2")
        );
    }

    #[tokio::test]
    async fn test_watch_filters_other_slots() {
        let store = MemorySettingsStore::new();

        let mut changes = store.watch("watched_key", 0);
        store.write("other_key", "x", 0).await.unwrap();
        store.write("watched_key", "y", 99).await.unwrap();
        store.write("watched_key", "z", 0).await.unwrap();

        // Only the (watched_key, 0) write comes through
        let change = changes.next().await.unwrap();
        assert_eq!(change.key, "watched_key");
        assert_eq!(change.user, 0);
    }
}
