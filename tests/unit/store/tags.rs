use std::sync::atomic::AtomicUsize;
use std::thread;

use super::*;
use crate::store::kv::MemoryKv;

fn page() -> PageKey {
    PageKey::new("Example.com", "/library")
}

fn store() -> (Arc<MemoryKv>, TagStore) {
    let kv = Arc::new(MemoryKv::new());
    let store = TagStore::new(kv.clone());
    (kv, store)
}

#[test]
fn toggle_is_its_own_inverse() {
    let (_, store) = store();
    let p = page();
    store.toggle(&p, "#x", "Acme").unwrap();
    let before = store.load(&p);
    store.toggle(&p, "#a", "Acme").unwrap();
    let after = store.toggle(&p, "#a", "Acme").unwrap();
    assert_eq!(after, before);
    assert_eq!(store.load(&p), before);
}

#[test]
fn toggle_rejects_blank_fields() {
    let (_, store) = store();
    for (rule, customer) in [(" ", "Acme"), ("#a", "")] {
        let err = store.toggle(&page(), rule, customer).unwrap_err();
        assert!(!err.is_transient(), "{rule:?}/{customer:?}");
        assert!(matches!(err, TileError::Rule(_)));
    }
    assert_eq!(store.deferred_len(), 0);
}

#[test]
fn concurrent_toggles_lose_no_updates() {
    let (_, store) = store();
    let store = Arc::new(store);
    let p = page();
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            let p = p.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    store.toggle(&p, &format!("#t{t}-{i}"), "Acme").unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(store.load(&p).len(), 80);
}

#[test]
fn unavailable_store_loads_empty() {
    let (kv, store) = store();
    store.toggle(&page(), "#a", "Acme").unwrap();
    kv.set_available(false);
    assert!(store.load(&page()).is_empty());
}

#[test]
fn rejected_toggle_is_deferred_and_replayed() {
    let (kv, store) = store();
    kv.set_available(false);
    let err = store.toggle(&page(), "#a", "Acme").unwrap_err();
    assert!(err.is_transient());
    assert_eq!(store.deferred_len(), 1);
    assert_eq!(store.flush_deferred(), 0);
    assert_eq!(store.deferred_len(), 1);

    kv.set_available(true);
    let set = store.load(&page());
    assert!(set.contains("#a", "Acme"));
    assert_eq!(store.deferred_len(), 0);
}

#[test]
fn subscribers_see_changes_from_any_instance() {
    let kv = Arc::new(MemoryKv::new());
    let a = TagStore::new(kv.clone());
    let b = TagStore::new(kv.clone());
    let p = page();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen2 = Arc::clone(&seen);
    let id = a.subscribe(
        &p,
        Box::new(move |_, set| {
            seen2.store(set.len(), Ordering::SeqCst);
        }),
    );
    b.toggle(&p, "#a", "Acme").unwrap();
    b.toggle(&p, "#b", "Acme").unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(a.cached(&p).map(|s| s.len()), Some(2));

    a.unsubscribe(id);
    b.toggle(&p, "#c", "Acme").unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn persisted_lists_decode_leniently() {
    let value = serde_json::json!([
        {"selector": "#a", "customer": "X"},
        {"matchRule": "#b", "customerId": "Y"},
        {"selector": "#a", "customer": "X"},
        {"selector": "", "customer": "X"},
        {"nope": 1},
        "garbage"
    ]);
    let set = TagSet::from_value(&value);
    assert_eq!(set.len(), 2);
    assert!(set.contains("#b", "Y"));
    assert!(TagSet::from_value(&serde_json::json!({"a": 1})).is_empty());

    let encoded = set.to_value().unwrap();
    assert_eq!(encoded[0]["selector"], "#a");
    assert_eq!(encoded[1]["customer"], "Y");
}
