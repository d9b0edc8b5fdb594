//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal doubles for exercising the settings manager
//! against a fully controlled store.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rotalock_core::error::Result;
use rotalock_core::policy::UserId;
use rotalock_core::traits::{SettingChange, SettingsStore};
use rotalock_core::{DEVICE_STATE_ROTATION_LOCK, Error, SettingsListener};
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// A controlled SettingsStore that records writes and emits change events
/// on demand
///
/// Clones share all state, so a test can keep a handle for assertions after
/// moving a clone into the manager.
#[derive(Clone)]
pub struct RecordingStore {
    /// The single stored value (only the settings key is modeled)
    value: Arc<std::sync::Mutex<Option<String>>>,
    /// Every write in order: (key, value, user)
    writes: Arc<std::sync::Mutex<Vec<(String, String, UserId)>>>,
    /// When set, read() fails with a store error
    fail_reads: Arc<AtomicBool>,
    /// Call counter for write()
    write_call_count: Arc<AtomicUsize>,
    /// Sender for the test to emit change events
    test_tx: mpsc::UnboundedSender<SettingChange>,
    /// Receiver handed out by watch() (only called once)
    watch_rx: Arc<std::sync::Mutex<Option<mpsc::UnboundedReceiver<SettingChange>>>>,
}

impl RecordingStore {
    /// Create a store holding the given initial value
    pub fn new(initial: Option<&str>) -> Self {
        let (test_tx, watch_rx) = mpsc::unbounded_channel();
        Self {
            value: Arc::new(std::sync::Mutex::new(initial.map(|s| s.to_string()))),
            writes: Arc::new(std::sync::Mutex::new(Vec::new())),
            fail_reads: Arc::new(AtomicBool::new(false)),
            write_call_count: Arc::new(AtomicUsize::new(0)),
            test_tx,
            watch_rx: Arc::new(std::sync::Mutex::new(Some(watch_rx))),
        }
    }

    /// Make every subsequent read() fail
    pub fn set_failing_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Get the number of times write() was called
    pub fn write_call_count(&self) -> usize {
        self.write_call_count.load(Ordering::SeqCst)
    }

    /// Get the recorded writes in order
    pub fn writes(&self) -> Vec<(String, String, UserId)> {
        self.writes.lock().unwrap().clone()
    }

    /// Get the value portion of the most recent write
    pub fn last_written_value(&self) -> Option<String> {
        self.writes
            .lock()
            .unwrap()
            .last()
            .map(|(_, value, _)| value.clone())
    }

    /// Overwrite the stored value without recording a write, as another
    /// process would
    pub fn set_value_externally(&self, value: &str) {
        *self.value.lock().unwrap() = Some(value.to_string());
    }

    /// Emit a change event for the settings slot
    pub fn emit_change(&self, user: UserId) {
        let _ = self.test_tx.send(SettingChange {
            key: DEVICE_STATE_ROTATION_LOCK.to_string(),
            user,
        });
    }
}

#[async_trait::async_trait]
impl SettingsStore for RecordingStore {
    async fn read(&self, _key: &str, _user: UserId) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::store("injected read failure"));
        }
        Ok(self.value.lock().unwrap().clone())
    }

    async fn write(&self, key: &str, value: &str, user: UserId) -> Result<()> {
        self.write_call_count.fetch_add(1, Ordering::SeqCst);
        *self.value.lock().unwrap() = Some(value.to_string());
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string(), user));
        Ok(())
    }

    fn watch(
        &self,
        _key: &str,
        _user: UserId,
    ) -> Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>> {
        let rx = self
            .watch_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

/// A listener that counts its notifications
pub struct CountingListener {
    notify_count: AtomicUsize,
}

impl CountingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            notify_count: AtomicUsize::new(0),
        })
    }

    /// Get the number of notifications received
    pub fn notify_count(&self) -> usize {
        self.notify_count.load(Ordering::SeqCst)
    }
}

impl SettingsListener for CountingListener {
    fn on_settings_changed(&self) {
        self.notify_count.fetch_add(1, Ordering::SeqCst);
    }
}
