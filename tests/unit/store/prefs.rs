use super::*;
use crate::store::kv::MemoryKv;

fn prefs() -> (Arc<MemoryKv>, Preferences) {
    let kv = Arc::new(MemoryKv::new());
    (kv.clone(), Preferences::new(kv))
}

#[test]
fn customers_are_deduplicated_and_trimmed() {
    let (_, p) = prefs();
    p.add_customer("Acme").unwrap();
    p.add_customer(" Acme ").unwrap();
    let list = p.add_customer("Globex").unwrap();
    assert_eq!(list, vec!["Acme".to_string(), "Globex".to_string()]);
    assert!(p.add_customer("  ").is_err());
    assert!(p.add_customer("ALL").is_err());
}

#[test]
fn removing_a_customer_clears_references() {
    let (_, p) = prefs();
    p.add_customer("Acme").unwrap();
    p.add_customer("Globex").unwrap();
    p.set_current_customer(Some("Acme")).unwrap();
    p.set_active_filter(&FilterTarget::parse("Acme")).unwrap();

    let left = p.remove_customer("Acme").unwrap();
    assert_eq!(left, vec!["Globex".to_string()]);
    assert_eq!(p.current_customer().unwrap(), None);
    assert!(p.active_filter().unwrap().is_all());
}

#[test]
fn cycle_wraps_in_both_directions() {
    let (_, p) = prefs();
    assert_eq!(p.cycle_filter(CycleDirection::Forward).unwrap(), None);
    p.add_customer("A").unwrap();
    p.add_customer("B").unwrap();

    let labels: Vec<String> = (0..3)
        .map(|_| {
            p.cycle_filter(CycleDirection::Forward)
                .unwrap()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(labels, ["A", "B", "ALL"]);

    let back = p.cycle_filter(CycleDirection::Backward).unwrap().unwrap();
    assert_eq!(back, FilterTarget::Customer("B".to_string()));
    assert_eq!(p.active_filter().unwrap(), back);
}

#[test]
fn unknown_active_filter_cycles_from_all() {
    let (kv, p) = prefs();
    p.add_customer("A").unwrap();
    kv.set(BTreeMap::from([(
        ACTIVE_FILTER_KEY.to_string(),
        Value::from("Gone"),
    )]))
    .unwrap();
    let next = p.cycle_filter(CycleDirection::Forward).unwrap().unwrap();
    assert_eq!(next.customer(), Some("A"));
}

#[test]
fn tagging_flag_defaults_off() {
    let (kv, p) = prefs();
    assert!(!p.tagging_enabled().unwrap());
    p.set_tagging_enabled(true).unwrap();
    assert!(p.tagging_enabled().unwrap());
    kv.set_available(false);
    assert!(p.tagging_enabled().unwrap_err().is_transient());
}
