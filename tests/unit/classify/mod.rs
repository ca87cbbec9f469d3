use super::*;
use crate::foundation::opts::ResolveOpts;
use crate::store::tags::TagRecord;
use crate::surface::memory::{MemorySurface, NodeSpec};

fn three_tiles() -> (MemorySurface, [NodeId; 3]) {
    let mut s = MemorySurface::new();
    let root = s.root();
    let a = s.mount(root, &NodeSpec::new("div").id("a")).unwrap();
    let b = s.mount(root, &NodeSpec::new("div").id("b")).unwrap();
    let c = s.mount(root, &NodeSpec::new("div").id("c")).unwrap();
    (s, [a, b, c])
}

fn hits(s: &MemorySurface, records: &[(&str, &str)]) -> TagHits {
    let resolver = Resolver::from_opts(&ResolveOpts::default()).unwrap();
    let tags = TagSet::from_records(records.iter().map(|(r, c)| TagRecord::new(*r, *c)));
    TagHits::collect(s, &resolver, &tags)
}

#[test]
fn basic_filter_scenario() {
    let (s, [a, b, c]) = three_tiles();
    let hits = hits(&s, &[("#a", "X"), ("#b", "Y")]);
    let Classification::Partition(p) = classify(&FilterTarget::parse("X"), &hits, [a, b, c]) else {
        panic!("expected a partition");
    };
    assert_eq!(p.visible, vec![a, c]);
    assert_eq!(p.suppressed, vec![b]);
}

#[test]
fn active_customer_wins_tie_break() {
    let (s, [a, b, _]) = three_tiles();
    let hits = hits(&s, &[("#a", "Y"), ("#a", "X"), ("#b", "Y"), ("#b", "Z")]);
    let Classification::Partition(p) = classify(&FilterTarget::parse("X"), &hits, [a, b]) else {
        panic!("expected a partition");
    };
    assert_eq!(p.visible, vec![a]);
    assert_eq!(p.suppressed, vec![b]);
    assert_eq!(hits.customers(a), ["X".to_string(), "Y".to_string()]);
}

#[test]
fn all_short_circuits_to_restore() {
    let (s, [a, b, c]) = three_tiles();
    let hits = hits(&s, &[("#a", "X")]);
    assert_eq!(
        classify(&FilterTarget::All, &hits, [a, b, c]),
        Classification::Restore
    );
}

#[test]
fn invalid_and_unmatched_rules_tag_nothing() {
    let (s, [a, ..]) = three_tiles();
    let hits = hits(&s, &[("div:hover", "X"), ("#zzz", "X"), ("#a", "X"), ("#a", "X")]);
    assert_eq!(hits.len(), 1);
    assert!(hits.is_tagged(a));
    let badges: Vec<_> = hits.badges().collect();
    assert_eq!(badges, vec![(a, &["X".to_string()][..])]);
}
