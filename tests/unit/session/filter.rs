use super::*;
use crate::store::kv::MemoryKv;

#[test]
fn subscribers_hear_only_changes() {
    let state = FilterState::new();
    let rx = state.subscribe();
    assert!(state.get().is_all());
    assert!(state.set(FilterTarget::parse("Acme")).unwrap());
    assert!(!state.set(FilterTarget::parse("Acme")).unwrap());
    assert_eq!(rx.try_recv().unwrap(), FilterTarget::parse("Acme"));
    assert!(rx.try_recv().is_err());
}

#[test]
fn clones_share_one_selection() {
    let a = FilterState::new();
    let b = a.clone();
    b.set(FilterTarget::parse("X")).unwrap();
    assert_eq!(a.get().customer(), Some("X"));
}

#[test]
fn persistent_state_round_trips_through_the_store() {
    let kv = Arc::new(MemoryKv::new());
    let a = FilterState::persistent(kv.clone());
    a.set(FilterTarget::parse("Acme")).unwrap();

    // A second process starting later sees the stored value.
    let b = FilterState::persistent(kv.clone());
    assert_eq!(b.get().customer(), Some("Acme"));

    // Writes from elsewhere reach existing instances.
    let rx = b.subscribe();
    Preferences::new(kv.clone())
        .set_active_filter(&FilterTarget::All)
        .unwrap();
    assert!(b.get().is_all());
    assert_eq!(rx.try_recv().unwrap(), FilterTarget::All);
}

#[test]
fn unavailable_store_still_switches_locally() {
    let kv = Arc::new(MemoryKv::new());
    let state = FilterState::persistent(kv.clone());
    kv.set_available(false);
    assert!(state.set(FilterTarget::parse("X")).is_err());
    assert_eq!(state.get().customer(), Some("X"));
}
