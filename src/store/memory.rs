//! In-memory key/value store.
//!
//! Backs ephemeral runs (`storage.backend = "memory"`) and tests. Reads and
//! writes can be forced to fail to exercise the fail-open and
//! surfaced-write-error paths of the session core.

use super::{KeyValueStore, StorageError, StoreKey};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Process-local slot storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<StoreKey, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail until reset.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `set`/`remove` fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of writes that changed a slot.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of a slot without going through the async interface.
    pub fn peek(&self, key: StoreKey) -> Option<String> {
        self.slots.lock().get(&key).cloned()
    }

    fn check_writable(&self, key: StoreKey) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!(
                "write to {key} rejected"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("read of {key} rejected")));
        }
        Ok(self.slots.lock().get(&key).cloned())
    }

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), StorageError> {
        self.check_writable(key)?;
        let mut slots = self.slots.lock();
        if slots.get(&key).map(String::as_str) != Some(value) {
            slots.insert(key, value.to_string());
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn remove(&self, key: StoreKey) -> Result<(), StorageError> {
        self.check_writable(key)?;
        if self.slots.lock().remove(&key).is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
