use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::foundation::core::FilterTarget;
use crate::foundation::error::TileResult;
use crate::store::kv::KvStore;
use crate::store::prefs::{ACTIVE_FILTER_KEY, Preferences};

#[derive(Default)]
struct Inner {
    current: RwLock<FilterTarget>,
    subscribers: Mutex<Vec<Sender<FilterTarget>>>,
}

impl Inner {
    // Returns `true` when the value changed; subscribers only hear about changes.
    fn replace(&self, target: FilterTarget) -> bool {
        {
            let mut cur = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if *cur == target {
                return false;
            }
            *cur = target.clone();
        }
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|tx| tx.send(target.clone()).is_ok());
        true
    }
}

/// Process-wide filter selection shared by every rendering context.
///
/// Optionally backed by [`Preferences`]: the selection is persisted on change and picked up when
/// another process writes it.
#[derive(Clone, Default)]
pub struct FilterState {
    inner: Arc<Inner>,
    prefs: Option<Preferences>,
}

impl FilterState {
    /// In-memory state starting at [`FilterTarget::All`].
    pub fn new() -> Self {
        Self::default()
    }

    /// State persisted through `kv`, seeded from the stored selection.
    ///
    /// An unreachable store starts the state at [`FilterTarget::All`].
    pub fn persistent(kv: Arc<dyn KvStore>) -> Self {
        let prefs = Preferences::new(Arc::clone(&kv));
        let initial = prefs.active_filter().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read the stored filter; starting unfiltered");
            FilterTarget::All
        });
        let inner = Arc::new(Inner {
            current: RwLock::new(initial),
            subscribers: Mutex::new(Vec::new()),
        });
        let listener = Arc::downgrade(&inner);
        kv.on_change(Box::new(move |changes| {
            let Some(inner) = listener.upgrade() else {
                return;
            };
            for change in changes.iter().filter(|c| c.key == ACTIVE_FILTER_KEY) {
                let target = change
                    .new_value
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .map(FilterTarget::parse)
                    .unwrap_or_default();
                inner.replace(target);
            }
        }));
        Self {
            inner,
            prefs: Some(prefs),
        }
    }

    /// Current selection.
    pub fn get(&self) -> FilterTarget {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the selection. Returns `true` when it changed.
    ///
    /// Persistence failures are returned after the in-memory state has already switched; the
    /// filter keeps working for this process.
    #[tracing::instrument(skip(self), fields(target = %target))]
    pub fn set(&self, target: FilterTarget) -> TileResult<bool> {
        let changed = self.inner.replace(target.clone());
        if changed {
            tracing::info!("active filter changed");
            if let Some(prefs) = &self.prefs {
                prefs.set_active_filter(&target)?;
            }
        }
        Ok(changed)
    }

    /// Receive every subsequent change.
    pub fn subscribe(&self) -> Receiver<FilterTarget> {
        let (tx, rx) = channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/filter.rs"]
mod tests;
