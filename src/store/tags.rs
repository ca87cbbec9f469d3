//! Tag records and the tag store adapter.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;

use crate::foundation::core::PageKey;
use crate::foundation::error::{TileError, TileResult};
use crate::store::kv::{KvChange, KvStore};

/// One user tag: "elements matching `match_rule` belong to `customer_id`".
///
/// Persisted as `{"selector": .., "customer": ..}`; the `matchRule`/`customerId` spellings are
/// accepted on read.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TagRecord {
    /// Match rule addressing the tagged element(s).
    #[serde(rename = "selector", alias = "matchRule")]
    pub match_rule: String,
    /// Customer the element is tagged to.
    #[serde(rename = "customer", alias = "customerId")]
    pub customer_id: String,
}

impl TagRecord {
    /// Build a record.
    pub fn new(match_rule: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            match_rule: match_rule.into(),
            customer_id: customer_id.into(),
        }
    }
}

/// Duplicate-free collection of tag records for one page.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct TagSet {
    records: Vec<TagRecord>,
}

impl TagSet {
    /// Build a set, dropping duplicates and records with blank fields.
    pub fn from_records(records: impl IntoIterator<Item = TagRecord>) -> Self {
        let mut set = Self::default();
        for r in records {
            if r.match_rule.trim().is_empty() || r.customer_id.trim().is_empty() {
                continue;
            }
            if !set.contains(&r.match_rule, &r.customer_id) {
                set.records.push(r);
            }
        }
        set
    }

    /// Decode a persisted value leniently: malformed entries are skipped.
    pub fn from_value(value: &Value) -> Self {
        let Some(items) = value.as_array() else {
            if !value.is_null() {
                tracing::warn!("persisted tag list is not an array; ignoring it");
            }
            return Self::default();
        };
        let records = items.iter().filter_map(|item| {
            serde_json::from_value::<TagRecord>(item.clone())
                .map_err(|e| tracing::debug!(error = %e, "skipping malformed tag record"))
                .ok()
        });
        Self::from_records(records)
    }

    /// Encode for persistence.
    pub fn to_value(&self) -> TileResult<Value> {
        serde_json::to_value(self).map_err(|e| TileError::serde(format!("encode tag set: {e}")))
    }

    /// Remove the pair if present, otherwise append it. Returns `true` when the pair was added.
    pub fn toggle(&mut self, match_rule: &str, customer_id: &str) -> bool {
        if let Some(idx) = self
            .records
            .iter()
            .position(|r| r.match_rule == match_rule && r.customer_id == customer_id)
        {
            self.records.remove(idx);
            false
        } else {
            self.records.push(TagRecord::new(match_rule, customer_id));
            true
        }
    }

    /// Whether the pair is present.
    pub fn contains(&self, match_rule: &str, customer_id: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.match_rule == match_rule && r.customer_id == customer_id)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TagRecord> {
        self.records.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Identifies a [`TagStore::subscribe`] registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback receiving the new tag set of a page whenever any context changes it.
pub type TagCallback = Box<dyn Fn(&PageKey, &TagSet) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    page: PageKey,
    callback: TagCallback,
}

#[derive(Default)]
struct Shared {
    cache: RwLock<HashMap<PageKey, TagSet>>,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl Shared {
    fn on_kv_change(&self, changes: &[KvChange]) {
        for change in changes {
            let page = PageKey::from_raw(change.key.clone());
            let watched = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .any(|s| s.page == page);
            let cached = self
                .cache
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&page);
            if !watched && !cached {
                continue;
            }
            let set = change
                .new_value
                .as_ref()
                .map(TagSet::from_value)
                .unwrap_or_default();
            self.cache
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(page.clone(), set.clone());
            let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
            for s in subscribers.iter().filter(|s| s.page == page) {
                (s.callback)(&page, &set);
            }
        }
    }
}

/// Shared tag store service: an in-memory cache over the persistent store with serialized
/// per-page read-modify-write and change subscription.
///
/// One instance is meant to be shared (behind an `Arc`) by every rendering context of a process;
/// per-page serialization only holds between callers of the same instance.
pub struct TagStore {
    kv: Arc<dyn KvStore>,
    shared: Arc<Shared>,
    locks: Mutex<HashMap<PageKey, Arc<Mutex<()>>>>,
    deferred: Mutex<Vec<(PageKey, TagRecord)>>,
    next_subscription: AtomicU64,
}

impl TagStore {
    /// Wrap a key-value store and start listening to its changes.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        let shared = Arc::new(Shared::default());
        let listener = Arc::clone(&shared);
        kv.on_change(Box::new(move |changes| listener.on_kv_change(changes)));
        Self {
            kv,
            shared,
            locks: Mutex::new(HashMap::new()),
            deferred: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Load a page's tags. An unreachable store yields an empty set.
    #[tracing::instrument(skip(self), fields(page = %page))]
    pub fn load(&self, page: &PageKey) -> TagSet {
        self.flush_deferred();
        match self.read(page) {
            Ok(set) => {
                self.cache_put(page, &set);
                set
            }
            Err(e) => {
                tracing::warn!(error = %e, "tag store unreachable; treating tags as empty");
                TagSet::default()
            }
        }
    }

    /// Last set seen for a page, without touching the backing store.
    pub fn cached(&self, page: &PageKey) -> Option<TagSet> {
        self.shared
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(page)
            .cloned()
    }

    /// Toggle a (rule, customer) pair and persist the result.
    ///
    /// Concurrent toggles on the same page are serialized. When the store rejects the write the
    /// toggle is queued and replayed by [`TagStore::flush_deferred`].
    #[tracing::instrument(skip(self), fields(page = %page))]
    pub fn toggle(&self, page: &PageKey, match_rule: &str, customer_id: &str) -> TileResult<TagSet> {
        if match_rule.trim().is_empty() || customer_id.trim().is_empty() {
            return Err(TileError::rule("tag rule and customer must be non-empty"));
        }
        self.flush_deferred();
        let record = TagRecord::new(match_rule, customer_id);
        match self.toggle_serialized(page, &record) {
            Ok(set) => Ok(set),
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(error = %e, "tagging temporarily unavailable; deferring toggle");
                    self.deferred
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((page.clone(), record));
                }
                Err(e)
            }
        }
    }

    /// Replay toggles deferred while the store was unavailable. Returns how many landed.
    pub fn flush_deferred(&self) -> usize {
        let pending = std::mem::take(&mut *self.deferred.lock().unwrap_or_else(PoisonError::into_inner));
        if pending.is_empty() {
            return 0;
        }
        let mut landed = 0usize;
        let mut iter = pending.into_iter();
        while let Some((page, record)) = iter.next() {
            if let Err(e) = self.toggle_serialized(&page, &record) {
                tracing::debug!(error = %e, "deferred toggle still blocked");
                let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
                let rest: Vec<_> = std::iter::once((page, record)).chain(iter).collect();
                // Keep original order ahead of anything queued meanwhile.
                deferred.splice(0..0, rest);
                break;
            }
            landed += 1;
        }
        landed
    }

    /// Number of toggles waiting for the store to come back.
    pub fn deferred_len(&self) -> usize {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Receive the new set whenever any context changes `page`.
    pub fn subscribe(&self, page: &PageKey, callback: TagCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                page: page.clone(),
                callback,
            });
        id
    }

    /// Drop a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.id != id);
    }

    fn toggle_serialized(&self, page: &PageKey, record: &TagRecord) -> TileResult<TagSet> {
        let lock = self.page_lock(page);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut set = self.read(page)?;
        let added = set.toggle(&record.match_rule, &record.customer_id);
        let entries = BTreeMap::from([(page.as_str().to_string(), set.to_value()?)]);
        self.kv.set(entries)?;
        self.cache_put(page, &set);
        tracing::debug!(
            rule = %record.match_rule,
            customer = %record.customer_id,
            added,
            "toggled tag"
        );
        Ok(set)
    }

    fn read(&self, page: &PageKey) -> TileResult<TagSet> {
        let got = self.kv.get(&[page.as_str()])?;
        Ok(got.get(page.as_str()).map(TagSet::from_value).unwrap_or_default())
    }

    fn page_lock(&self, page: &PageKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(page.clone()).or_default())
    }

    fn cache_put(&self, page: &PageKey, set: &TagSet) {
        self.shared
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page.clone(), set.clone());
    }
}

#[cfg(test)]
#[path = "../../tests/unit/store/tags.rs"]
mod tests;
