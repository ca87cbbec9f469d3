use super::*;
use crate::foundation::core::Point;
use crate::surface::memory::{MemorySurface, NodeSpec};

#[test]
fn batch_stamps_records_and_clears_on_drop() {
    let mut s = MemorySurface::new();
    let root = s.root();
    let box_ = s.mount(root, &NodeSpec::new("div").at(0.0, 0.0)).unwrap();
    s.observe(root);
    s.take_records();

    let mut writes = SelfWrites::new();
    {
        let mut batch = writes.begin(&mut s);
        batch.set_offset(box_, Some(Point::new(1.0, 1.0))).unwrap();
    }
    assert!(!writes.is_writing());
    assert_eq!(writes.generation(), Generation(1));

    s.set_offset(box_, Some(Point::new(2.0, 2.0))).unwrap();
    let recs = s.take_records();
    assert_eq!(recs.len(), 2);
    assert!(writes.is_own(&recs[0]));
    assert!(!writes.is_own(&recs[1]));
}

#[test]
fn flag_clears_when_the_batch_bails_out_early() {
    fn failing_pass(writes: &mut SelfWrites, s: &mut MemorySurface, node: crate::foundation::core::NodeId) -> bool {
        let mut batch = writes.begin(s);
        batch.set_offset(node, None).is_ok()
    }
    let mut s = MemorySurface::new();
    let root = s.root();
    let n = s.mount(root, &NodeSpec::new("div")).unwrap();
    s.unmount(n).unwrap();
    let mut writes = SelfWrites::new();
    assert!(!failing_pass(&mut writes, &mut s, n));
    assert!(!writes.is_writing());
    assert_eq!(writes.generation(), Generation(1));
    assert!(!failing_pass(&mut writes, &mut s, n));
    assert_eq!(writes.generation(), Generation(2));
}
