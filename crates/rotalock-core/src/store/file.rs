// # File Settings Store
//
// File-based implementation of SettingsStore with crash recovery.
//
// ## Purpose
//
// Provides durable settings storage across restarts for deployments without
// a platform settings provider. Values are opaque strings grouped by user
// scope; this store never interprets them.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename through a temporary file
// - Corruption detection: JSON validation on load
// - Automatic backup: keeps a .backup of the last known good state
// - Recovery: falls back to the backup if corruption is detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "users": {
//     "0": {
//       "device_state_rotation_lock": {
//         "value": "0:1:1:2",
//         "last_updated": "2026-08-06T12:00:00Z"
//       }
//     }
//   }
// }
// ```
//
// Change events cover writes made through any clone of this store. Watching
// the file itself for edits by other processes is the embedder's transport
// concern, not this store's.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use crate::Error;
use crate::policy::UserId;
use crate::traits::settings_store::{SettingChange, SettingsStore};

/// State file format version, kept for future migration
const STATE_FILE_VERSION: &str = "1.0";

/// Capacity of the change broadcast channel
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A stored value with its last-write timestamp
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredValue {
    /// The opaque string value
    pub value: String,
    /// Timestamp of the last write
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl StoredValue {
    fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            last_updated: chrono::Utc::now(),
        }
    }
}

/// Serializable state file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    users: HashMap<UserId, HashMap<String, StoredValue>>,
}

/// File-based settings store with crash recovery
///
/// Values are cached in memory and flushed to a JSON file on every write,
/// using write-then-rename for atomicity. Cloned handles share the cache and
/// the change channel.
///
/// # Example
///
/// ```rust,no_run
/// use rotalock_core::store::FileSettingsStore;
/// use rotalock_core::traits::SettingsStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSettingsStore::new("/var/lib/rotalock/settings.json").await?;
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
pub struct FileSettingsStore {
    path: PathBuf,
    users: Arc<RwLock<HashMap<UserId, HashMap<String, StoredValue>>>>,
    changes: broadcast::Sender<SettingChange>,
}

impl FileSettingsStore {
    /// Create or load a file settings store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load an existing state file
    /// 3. If corruption is detected, try the backup
    /// 4. If both fail, start with empty state
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create settings directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let users = Self::load_state_with_recovery(&path).await?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            path,
            users: Arc::new(RwLock::new(users)),
            changes,
        })
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load the main state file
    /// 2. On a JSON parse error, try the backup
    /// 3. If the backup also fails, start with empty state
    async fn load_state_with_recovery(
        path: &Path,
    ) -> Result<HashMap<UserId, HashMap<String, StoredValue>>, Error> {
        match Self::load_state(path).await {
            Ok(users) => {
                tracing::debug!("Loaded settings state: {} user scope(s)", users.len());
                Ok(users)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Settings file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok(HashMap::new());
                }

                match Self::load_state(&backup_path).await {
                    Ok(users) => {
                        tracing::info!(
                            "Recovered settings from backup: {} user scope(s)",
                            users.len()
                        );
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore settings file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(users)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty state.",
                            backup_err
                        );
                        Ok(HashMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load state from a file
    async fn load_state(path: &Path) -> Result<HashMap<UserId, HashMap<String, StoredValue>>, Error> {
        if !path.exists() {
            tracing::debug!("Settings file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "Settings file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.users)
    }

    /// Write state to file atomically
    async fn write_state(&self) -> Result<(), Error> {
        let state_file = {
            let guard = self.users.read().await;
            StateFileFormat {
                version: STATE_FILE_VERSION.to_string(),
                users: guard.clone(),
            }
        };

        let json = serde_json::to_string_pretty(&state_file)?;

        // Write to a temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep a backup of the current file before replacing it
        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Settings written to file: {}", self.path.display());
        Ok(())
    }

    /// Get path to the temporary file used for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to the backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn read(&self, key: &str, user: UserId) -> Result<Option<String>, Error> {
        let guard = self.users.read().await;
        Ok(guard
            .get(&user)
            .and_then(|values| values.get(key))
            .map(|stored| stored.value.clone()))
    }

    async fn write(&self, key: &str, value: &str, user: UserId) -> Result<(), Error> {
        {
            let mut guard = self.users.write().await;
            guard
                .entry(user)
                .or_default()
                .insert(key.to_string(), StoredValue::new(value));
        }

        // Persist before notifying so watchers re-read durable state
        self.write_state().await?;

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
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::new(&path).await.unwrap();
        assert_eq!(store.read("some_key", 0).await.unwrap(), None);

        store.write("some_key", "0:1", 0).await.unwrap();
        assert_eq!(
            store.read("some_key", 0).await.unwrap().as_deref(),
            Some("0:1")
        );
        assert!(path.exists());

        // A new instance sees the persisted value
        let store2 = FileSettingsStore::new(&path).await.unwrap();
        assert_eq!(
            store2.read("some_key", 0).await.unwrap().as_deref(),
            Some("0:1")
        );
    }

    #[tokio::test]
    async fn test_file_store_user_scopes_are_isolated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::new(&path).await.unwrap();
        store.write("some_key", "for-user-0", 0).await.unwrap();
        store.write("some_key", "for-user-10", 10).await.unwrap();

        let store2 = FileSettingsStore::new(&path).await.unwrap();
        assert_eq!(
            store2.read("some_key", 0).await.unwrap().as_deref(),
            Some("for-user-0")
        );
        assert_eq!(
            store2.read("some_key", 10).await.unwrap().as_deref(),
            Some("for-user-10")
        );
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::new(&path).await.unwrap();
        store.write("some_key", "first", 0).await.unwrap();
        // Second write creates the backup of the first state
        store.write("some_key", "second", 0).await.unwrap();

        let backup_path = FileSettingsStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        // Load recovers the previous state from the backup
        let store2 = FileSettingsStore::new(&path).await.unwrap();
        assert_eq!(
            store2.read("some_key", 0).await.unwrap().as_deref(),
            Some("first"),
            "Backup should contain previous state, not latest"
        );
    }

    #[tokio::test]
    async fn test_file_store_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::new(&path).await.unwrap();
        for i in 0..10 {
            store
                .write("some_key", &format!("value-{}", i), 0)
                .await
                .unwrap();
        }

        let store2 = FileSettingsStore::new(&path).await.unwrap();
        assert_eq!(
            store2.read("some_key", 0).await.unwrap().as_deref(),
            Some("value-9")
        );
    }

    #[tokio::test]
    async fn test_file_store_watch_fires_on_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::new(&path).await.unwrap();
        let mut changes = store.watch("some_key", 0);

        store.clone().write("some_key", "0:2", 0).await.unwrap();

        let change = changes.next().await.unwrap();
        assert_eq!(change.key, "some_key");
        assert_eq!(change.user, 0);
    }
}
