use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use serde_json::Value;

use crate::foundation::error::{TileError, TileResult};

/// One key changed in the store.
#[derive(Clone, Debug, PartialEq)]
pub struct KvChange {
    /// Changed key.
    pub key: String,
    /// New value, `None` when removed.
    pub new_value: Option<Value>,
}

/// Listener invoked for every change batch, from whichever context wrote it.
pub type ChangeCallback = Box<dyn Fn(&[KvChange]) + Send + Sync>;

/// Externally owned persistent key-value store (string keys, JSON values).
///
/// Implementations are eventually consistent and may be temporarily unavailable; callers treat
/// an unavailable read as empty.
pub trait KvStore: Send + Sync {
    /// Read the given keys. Missing keys are absent from the map.
    fn get(&self, keys: &[&str]) -> TileResult<BTreeMap<String, Value>>;

    /// Write all entries as one batch.
    fn set(&self, entries: BTreeMap<String, Value>) -> TileResult<()>;

    /// Register a change listener for the lifetime of the store.
    fn on_change(&self, callback: ChangeCallback);
}

/// Process-local [`KvStore`] with a switch to simulate extension reloads.
#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<BTreeMap<String, Value>>,
    unavailable: AtomicBool,
    listeners: RwLock<Vec<ChangeCallback>>,
}

impl MemoryKv {
    /// An empty, available store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated unavailability.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> TileResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TileError::store("key-value store is unavailable"));
        }
        Ok(())
    }
}

impl KvStore for MemoryKv {
    fn get(&self, keys: &[&str]) -> TileResult<BTreeMap<String, Value>> {
        self.check_available()?;
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect())
    }

    fn set(&self, entries: BTreeMap<String, Value>) -> TileResult<()> {
        self.check_available()?;
        let changes: Vec<KvChange> = {
            let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .into_iter()
                .filter_map(|(key, value)| {
                    let previous = data.insert(key.clone(), value.clone());
                    (previous.as_ref() != Some(&value)).then_some(KvChange {
                        key,
                        new_value: Some(value),
                    })
                })
                .collect()
        };
        if changes.is_empty() {
            return Ok(());
        }
        // Listeners run outside the data lock so they may read the store.
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(&changes);
        }
        Ok(())
    }

    fn on_change(&self, callback: ChangeCallback) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/store/kv.rs"]
mod tests;
