//! Minimal embedding example for rotalock-core
//!
//! This example demonstrates using rotalock-core as a library in a custom
//! application: the manager lifecycle is fully owned by the embedder, which
//! wires its own store handle, defaults, and listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rotalock_core::{
    DEVICE_STATE_ROTATION_LOCK, MemorySettingsStore, SettingsListener, SettingsManager,
    SettingsStore, StaticDefaults,
};

/// Listener that logs every notification
struct LoggingListener {
    notifications: AtomicUsize,
}

impl SettingsListener for LoggingListener {
    fn on_settings_changed(&self) {
        let seen = self.notifications.fetch_add(1, Ordering::SeqCst) + 1;
        println!("settings changed (notification #{})", seen);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // The embedder owns the store; a clone models another writer sharing it
    let store = MemorySettingsStore::new();
    let other_writer = store.clone();

    // State 0 (folded) defaults to locked, state 1 (unfolded) to unlocked
    let defaults = StaticDefaults::new(vec!["0:1".to_string(), "1:2".to_string()]);
    println!(
        "feature enabled: {}",
        SettingsManager::is_feature_enabled(&defaults)
    );

    let mut manager = SettingsManager::new(Box::new(store), &defaults, 0).await;
    manager.register_listener(Arc::new(LoggingListener {
        notifications: AtomicUsize::new(0),
    }));

    println!("state 0 locked: {}", manager.is_rotation_locked(0));
    println!("state 1 locked: {}", manager.is_rotation_locked(1));

    // Lock the unfolded state and persist
    manager.update_setting(1, true).await;
    println!(
        "after update, locked for all states: {}",
        manager.is_rotation_locked_for_all_states()
    );

    // Simulate another process unlocking state 0, then process the change
    other_writer
        .write(DEVICE_STATE_ROTATION_LOCK, "0:2:1:1", 0)
        .await?;

    // Three events are queued: the construction-time fallback persist, our
    // own update, and the external write. Each reload reads current state.
    manager.process_next_change().await;
    manager.process_next_change().await;
    manager.process_next_change().await;

    println!("state 0 locked after external write: {}", manager.is_rotation_locked(0));

    Ok(())
}
