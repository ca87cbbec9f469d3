use super::*;

#[test]
fn timers_fire_in_time_then_schedule_order() {
    let mut q = TimerQueue::new();
    q.schedule(Millis(200), "late");
    q.schedule(Millis(100), "first");
    q.schedule(Millis(100), "second");
    assert_eq!(q.next_due(), Some(Millis(100)));
    assert_eq!(q.pop_due(Millis(50)), None);
    assert_eq!(q.pop_due(Millis(150)), Some((Millis(100), "first")));
    assert_eq!(q.pop_due(Millis(150)), Some((Millis(100), "second")));
    assert_eq!(q.pop_due(Millis(150)), None);
    assert_eq!(q.pop_due(Millis(500)), Some((Millis(200), "late")));
    assert!(q.is_empty());
}

#[test]
fn cancelled_timers_never_fire() {
    let mut q = TimerQueue::new();
    let a = q.schedule(Millis(10), 1);
    let b = q.schedule(Millis(10), 2);
    assert_eq!(q.cancel(a), Some(1));
    assert_eq!(q.cancel(a), None);
    assert!(!q.is_pending(a));
    assert!(q.is_pending(b));
    assert_eq!(q.pop_due(Millis(10)), Some((Millis(10), 2)));
    assert_eq!(q.cancel(b), None);
    assert_eq!(q.len(), 0);
}
