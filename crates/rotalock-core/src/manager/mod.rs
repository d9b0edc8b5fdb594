//! Rotation lock settings manager
//!
//! The SettingsManager is responsible for:
//! - Owning the in-memory device-state → policy map
//! - Loading persisted settings through the SettingsStore adapter
//! - Falling back to configured defaults when the store is empty or corrupt
//! - Persisting mutations back to the store
//! - Fanning out change notifications to registered listeners
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  SettingsStore   │─── SettingChange ───┐
//! └──────────────────┘                     │
//!          ▲                               ▼
//!          │ read/write          ┌──────────────────┐
//!          └─────────────────────│ SettingsManager  │
//!                                └──────────────────┘
//!          ┌───────────────────────────┼───────────────────────┐
//!          ▼                           ▼                       ▼
//! ┌──────────────────┐       ┌──────────────────┐    ┌──────────────────┐
//! │ DefaultsProvider │       │      Codec       │    │    Listeners     │
//! │ (fallback seed)  │       │ (string ↔ map)   │    │    (notify)      │
//! └──────────────────┘       └──────────────────┘    └──────────────────┘
//! ```
//!
//! ## Change Flow
//!
//! 1. A write lands in the store (this manager or another process)
//! 2. The store's watch stream yields a SettingChange
//! 3. The manager re-runs initialization (reload or defaults-fallback)
//! 4. Every registered listener is notified, whether or not values changed
//!
//! ## Threading
//!
//! The manager is single-writer by construction: every mutation goes through
//! `&mut self` on the task that owns it, so the map carries no lock. Change
//! events are pulled from that same task via [`SettingsManager::run`] or
//! [`SettingsManager::process_next_change`], which is what marshals
//! asynchronous store callbacks onto the owning sequencing context.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::error::{Error, Result};
use crate::policy::{DeviceState, RotationLockPolicy, UserId};
use crate::traits::{DefaultsProvider, SettingChange, SettingsStore};

/// Well-known store key holding the serialized settings map
///
/// The value under this key is a compatibility surface: other readers parse
/// it with the same flat `k:v:k:v...` format produced by [`crate::codec`].
pub const DEVICE_STATE_ROTATION_LOCK: &str = "device_state_rotation_lock";

/// Listener for changes in device-state rotation lock settings
pub trait SettingsListener: Send + Sync {
    /// Called whenever the settings may have changed
    fn on_settings_changed(&self);
}

/// Manages device-state based rotation lock settings
///
/// Handles reading, writing, and listening for changes. One instance per
/// process, constructed explicitly at startup by the embedder and owned by
/// a single task.
///
/// ## Lifecycle
///
/// 1. Create with [`SettingsManager::new`], which loads persisted settings or
///    falls back to defaults, and subscribes to store changes
/// 2. Serve queries and mutations from the owning task
/// 3. Drive reloads with [`SettingsManager::run`] (daemon) or
///    [`SettingsManager::process_next_change`] (embedded in a larger loop)
pub struct SettingsManager {
    /// Store adapter for the durable settings value
    store: Box<dyn SettingsStore>,

    /// User scope for every read and write
    user: UserId,

    /// Default entries, read once at construction
    defaults: Vec<String>,

    /// The in-memory settings map; never exposed by reference
    settings: HashMap<DeviceState, RotationLockPolicy>,

    /// Registered listener handles, set semantics by Arc identity
    listeners: Vec<Arc<dyn SettingsListener>>,

    /// Change events for the settings slot, pulled by the owning task
    changes: Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>>,
}

impl SettingsManager {
    /// Create a manager and load its initial state
    ///
    /// Reads the defaults once from `defaults_provider`, subscribes to the
    /// store's change events, and runs the initialization algorithm: decode
    /// the persisted value, or fall back to the defaults and persist them.
    ///
    /// Construction never fails: every unusable persisted state degrades to
    /// the configured defaults.
    pub async fn new(
        store: Box<dyn SettingsStore>,
        defaults_provider: &dyn DefaultsProvider,
        user: UserId,
    ) -> Self {
        let changes = store.watch(DEVICE_STATE_ROTATION_LOCK, user);
        let mut manager = Self {
            store,
            user,
            defaults: defaults_provider.default_entries(),
            settings: HashMap::new(),
            listeners: Vec::new(),
            changes,
        };
        manager.initialize().await;
        manager
    }

    /// Returns true if device-state based rotation lock is enabled
    ///
    /// The feature is enabled iff the provider carries at least one default
    /// entry. Stateless; usable before constructing a manager.
    pub fn is_feature_enabled(defaults_provider: &dyn DefaultsProvider) -> bool {
        !defaults_provider.default_entries().is_empty()
    }

    /// Update the rotation lock setting for a device state
    ///
    /// Sets the state to `Locked` or `Unlocked` and persists the whole map.
    /// Persistence errors are logged, not surfaced: the in-memory state is
    /// already updated and callers have no recovery action.
    pub async fn update_setting(&mut self, state: DeviceState, rotation_locked: bool) {
        let policy = if rotation_locked {
            RotationLockPolicy::Locked
        } else {
            RotationLockPolicy::Unlocked
        };
        self.settings.insert(state, policy);
        self.persist_settings().await;
    }

    /// The rotation lock setting for a device state
    ///
    /// Returns [`RotationLockPolicy::Ignored`] for states absent from the
    /// map.
    pub fn rotation_lock_setting(&self, state: DeviceState) -> RotationLockPolicy {
        self.settings
            .get(&state)
            .copied()
            .unwrap_or(RotationLockPolicy::Ignored)
    }

    /// Returns true if rotation is locked for the given device state
    pub fn is_rotation_locked(&self, state: DeviceState) -> bool {
        self.rotation_lock_setting(state) == RotationLockPolicy::Locked
    }

    /// Returns true if no device state is explicitly unlocked
    ///
    /// Vacuously true on an empty map; ignored states do not count against
    /// it.
    pub fn is_rotation_locked_for_all_states(&self) -> bool {
        self.settings
            .values()
            .all(|policy| *policy != RotationLockPolicy::Unlocked)
    }

    /// A copy of the current settings map
    pub fn settings(&self) -> HashMap<DeviceState, RotationLockPolicy> {
        self.settings.clone()
    }

    /// Register a listener to be notified when the settings change
    ///
    /// Registering the same handle twice is a no-op.
    pub fn register_listener(&mut self, listener: Arc<dyn SettingsListener>) {
        if self
            .listeners
            .iter()
            .any(|registered| Arc::ptr_eq(registered, &listener))
        {
            return;
        }
        self.listeners.push(listener);
    }

    /// Unregister a previously registered listener
    ///
    /// No-op if the given handle was never registered.
    pub fn unregister_listener(&mut self, listener: &Arc<dyn SettingsListener>) {
        let before = self.listeners.len();
        self.listeners
            .retain(|registered| !Arc::ptr_eq(registered, listener));
        if self.listeners.len() == before {
            warn!("Attempting to unregister a listener that hadn't been registered");
        }
    }

    /// Reload from the store and notify all listeners
    ///
    /// Called for every change event; public for tests and for embedders
    /// that marshal change delivery themselves. Listeners are notified even
    /// when the reload produced an identical map: the contract is "settings
    /// may have changed".
    pub async fn on_persisted_settings_changed(&mut self) {
        self.initialize().await;
        self.notify_listeners();
    }

    /// Await the next store change event and process it
    ///
    /// Runs [`SettingsManager::on_persisted_settings_changed`] for the
    /// event. Returns false once the store's watch stream has ended.
    pub async fn process_next_change(&mut self) -> bool {
        match self.changes.next().await {
            Some(change) => {
                debug!("Persisted settings changed: {:?}", change);
                self.on_persisted_settings_changed().await;
                true
            }
            None => false,
        }
    }

    /// Drive reloads until shutdown
    ///
    /// Processes change events until the watch stream ends or SIGINT is
    /// received.
    pub async fn run(&mut self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Internal run implementation that accepts an optional shutdown signal
    async fn run_internal(
        &mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        info!(
            "Watching rotation lock settings for user {} ({} listener(s) registered)",
            self.user,
            self.listeners.len()
        );

        if let Some(mut rx) = shutdown_rx {
            // Test mode: wait for the provided shutdown signal
            loop {
                tokio::select! {
                    more = self.process_next_change() => {
                        if !more {
                            info!("Settings change stream ended");
                            break;
                        }
                    }
                    _ = &mut rx => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        } else {
            // Production mode: wait for SIGINT
            loop {
                tokio::select! {
                    more = self.process_next_change() => {
                        if !more {
                            info!("Settings change stream ended");
                            break;
                        }
                    }
                    signal = tokio::signal::ctrl_c() => {
                        signal.map_err(|e| {
                            Error::Other(format!("Failed to listen for shutdown signal: {}", e))
                        })?;
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Test-only helper to run the manager with a controlled shutdown signal
    ///
    /// Production embedders should use [`SettingsManager::run`] or integrate
    /// [`SettingsManager::process_next_change`] into their own loop.
    pub async fn run_with_shutdown(
        &mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    /// Initialize the in-memory map from the store
    ///
    /// Runs at construction and for every change event. An absent or empty
    /// value, a corrupt value, and a failed read all land on the defaults;
    /// only a well-formed persisted value replaces the map directly.
    async fn initialize(&mut self) {
        let raw = match self.store.read(DEVICE_STATE_ROTATION_LOCK, self.user).await {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to read persisted settings, falling back on defaults: {}", e);
                self.fallback_on_defaults().await;
                return;
            }
        };

        let Some(raw) = raw.filter(|value| !value.is_empty()) else {
            // No settings saved; load the defaults and persist them.
            self.fallback_on_defaults().await;
            return;
        };

        match Self::decode_settings(&raw) {
            Ok(settings) => self.settings = settings,
            Err(e) => {
                error!("Can't deserialize saved settings, falling back on defaults: {}", e);
                self.fallback_on_defaults().await;
            }
        }
    }

    /// Decode a persisted settings string into the typed map
    ///
    /// Any integer value outside the persistable policy domain is treated as
    /// corruption: the stored-values invariant says only locked/unlocked
    /// ever land in the store, so anything else means a writer violated the
    /// compatibility surface.
    fn decode_settings(raw: &str) -> Result<HashMap<DeviceState, RotationLockPolicy>> {
        let raw_map = codec::decode(raw)?;
        let mut settings = HashMap::with_capacity(raw_map.len());
        for (state, value) in raw_map {
            let policy = RotationLockPolicy::from_setting_value(value).ok_or_else(|| {
                Error::corrupt(format!(
                    "unknown policy value {} for device state {}",
                    value, state
                ))
            })?;
            settings.insert(state, policy);
        }
        Ok(settings)
    }

    /// Replace the map with the defaults and persist the result
    async fn fallback_on_defaults(&mut self) {
        self.load_defaults();
        self.persist_settings().await;
    }

    /// Load the default entries into the map
    ///
    /// A malformed entry is logged and skipped; the remaining entries still
    /// load. Defaults are build-time configuration, so partial recovery
    /// beats disabling the feature wholesale.
    fn load_defaults(&mut self) {
        self.settings = HashMap::with_capacity(self.defaults.len());
        if self.defaults.is_empty() {
            warn!("Empty default settings");
            return;
        }
        for entry in &self.defaults {
            match Self::parse_default_entry(entry) {
                Ok((state, policy)) => {
                    self.settings.insert(state, policy);
                }
                Err(e) => error!("Error deserializing default entry {:?}: {}", entry, e),
            }
        }
    }

    /// Parse one `"key:value"` default entry
    fn parse_default_entry(entry: &str) -> Result<(DeviceState, RotationLockPolicy)> {
        let (state, value) = entry
            .split_once(codec::SEPARATOR)
            .ok_or_else(|| Error::config(format!("default entry {:?} has no separator", entry)))?;
        let state: DeviceState = state
            .parse()
            .map_err(|_| Error::config(format!("non-integer device state {:?}", state)))?;
        let value: u32 = value
            .parse()
            .map_err(|_| Error::config(format!("non-integer policy value {:?}", value)))?;
        let policy = RotationLockPolicy::from_setting_value(value)
            .ok_or_else(|| Error::config(format!("unknown policy value {}", value)))?;
        Ok((state, policy))
    }

    /// Persist the in-memory map to the store
    ///
    /// An empty map writes the empty string, the explicit "no settings"
    /// marker. Write errors are logged, never propagated.
    async fn persist_settings(&mut self) {
        let raw_map: HashMap<u32, u32> = self
            .settings
            .iter()
            .map(|(state, policy)| (*state, policy.setting_value()))
            .collect();
        let encoded = codec::encode(&raw_map);

        if let Err(e) = self
            .store
            .write(DEVICE_STATE_ROTATION_LOCK, &encoded, self.user)
            .await
        {
            error!("Failed to persist settings: {}", e);
        }
    }

    /// Notify every registered listener once
    fn notify_listeners(&self) {
        for listener in &self.listeners {
            listener.on_settings_changed();
        }
    }
}
