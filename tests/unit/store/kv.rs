use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use super::*;

#[test]
fn get_returns_only_present_keys() {
    let kv = MemoryKv::new();
    kv.set(BTreeMap::from([("a".to_string(), Value::from(1))]))
        .unwrap();
    let got = kv.get(&["a", "b"]).unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got["a"], Value::from(1));
}

#[test]
fn unavailable_store_fails_reads_and_writes() {
    let kv = MemoryKv::new();
    kv.set_available(false);
    assert!(kv.get(&["a"]).unwrap_err().is_transient());
    assert!(kv.set(BTreeMap::new()).is_err());
    kv.set_available(true);
    assert!(kv.get(&["a"]).unwrap().is_empty());
}

#[test]
fn listeners_see_only_real_changes() {
    let kv = MemoryKv::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen2 = Arc::clone(&seen);
    kv.on_change(Box::new(move |changes| {
        seen2.fetch_add(changes.len(), Ordering::SeqCst);
    }));
    let entry = BTreeMap::from([("k".to_string(), Value::from("v"))]);
    kv.set(entry.clone()).unwrap();
    kv.set(entry).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
