use super::*;

const G: NodeId = NodeId(7);

fn controller() -> Controller {
    let mut c = Controller::new(StabilizeOpts::default());
    c.track(G);
    c
}

#[test]
fn stable_count_reaches_reconciling() {
    let mut c = controller();
    assert_eq!(c.signal(G, 4, None, Millis(0)), None);
    assert_eq!(
        c.phase(G),
        Some(Phase::Observing {
            last_count: 4,
            stable: 0
        })
    );
    assert_eq!(c.signal(G, 4, None, Millis(10)), None);
    let run = c.signal(G, 4, None, Millis(20)).unwrap();
    assert_eq!(run.attempt, 1);
    assert!(!run.final_attempt);
    assert_eq!(c.phase(G), Some(Phase::Reconciling { attempt: 1 }));
    assert_eq!(c.pending_timers(), 0);
}

#[test]
fn count_changes_reset_stability() {
    let mut c = controller();
    c.signal(G, 1, None, Millis(0));
    c.signal(G, 1, None, Millis(5));
    assert_eq!(c.signal(G, 2, None, Millis(10)), None);
    assert_eq!(
        c.phase(G),
        Some(Phase::Observing {
            last_count: 2,
            stable: 0
        })
    );
}

#[test]
fn observe_fallback_fires_when_the_host_goes_quiet() {
    let mut c = controller();
    c.signal(G, 3, None, Millis(100));
    assert!(c.poll(Millis(1599)).is_empty());
    let wakes = c.poll(Millis(1600));
    assert_eq!(
        wakes,
        vec![Wake::Reconcile(Reconcile {
            group: G,
            attempt: 1,
            final_attempt: false
        })]
    );
}

#[test]
fn expected_total_short_circuits_observation() {
    let mut c = controller();
    assert_eq!(c.signal(G, 1, Some(3), Millis(0)), None);
    assert!(c.signal(G, 3, Some(3), Millis(300)).is_some());
}

#[test]
fn short_runs_retry_with_linear_backoff_then_give_up() {
    let mut c = controller();
    let mut run = c.trigger(G).unwrap();
    let mut now = Millis(0);
    let mut delays = Vec::new();
    while !run.final_attempt {
        c.finish(&run, AttemptResult::Short, now);
        let due = c.next_due().unwrap();
        delays.push(due.0 - now.0);
        now = due;
        let wakes = c.poll(now);
        let [Wake::Reconcile(next)] = wakes[..] else {
            panic!("expected one retry, got {wakes:?}");
        };
        run = next;
    }
    assert_eq!(delays, vec![200, 400, 600, 800]);
    assert_eq!(run.attempt, 5);
    c.finish(&run, AttemptResult::Applied, now);
    assert_eq!(c.phase(G), Some(Phase::Settled { dirty: false }));
}

#[test]
fn busy_groups_ignore_new_triggers() {
    let mut c = controller();
    c.signal(G, 1, None, Millis(0));
    assert_eq!(c.trigger(G), None);
    assert_eq!(c.signal(G, 1, None, Millis(1)), None);
    let run = c.signal(G, 1, None, Millis(2)).unwrap();
    assert_eq!(c.trigger(G), None);
    assert_eq!(c.signal(G, 9, Some(9), Millis(3)), None);
    c.finish(&run, AttemptResult::Applied, Millis(4));
}

#[test]
fn grace_absorbs_notifications_then_rechecks() {
    let mut c = controller();
    let run = c.trigger(G).unwrap();
    c.finish(&run, AttemptResult::Applied, Millis(0));
    assert_eq!(c.signal(G, 5, None, Millis(100)), None);
    assert_eq!(c.phase(G), Some(Phase::Settled { dirty: true }));
    assert!(c.poll(Millis(999)).is_empty());
    assert_eq!(c.poll(Millis(1000)), vec![Wake::Recheck(G)]);
    assert_eq!(c.phase(G), Some(Phase::Idle));

    let run = c.trigger(G).unwrap();
    c.finish(&run, AttemptResult::Applied, Millis(2000));
    assert!(c.poll(Millis(3000)).is_empty());
    assert_eq!(c.phase(G), Some(Phase::Idle));
}

#[test]
fn not_ready_returns_to_idle() {
    let mut c = controller();
    let run = c.trigger(G).unwrap();
    c.finish(&run, AttemptResult::NotReady, Millis(0));
    assert_eq!(c.phase(G), Some(Phase::Idle));
    assert_eq!(c.pending_timers(), 0);
}

#[test]
fn release_cancels_timers() {
    let mut c = controller();
    c.signal(G, 1, None, Millis(0));
    assert_eq!(c.pending_timers(), 1);
    assert!(c.release(G));
    assert_eq!(c.pending_timers(), 0);
    assert!(c.poll(Millis(10_000)).is_empty());
    assert_eq!(c.signal(G, 1, None, Millis(0)), None);
    assert!(!c.release(G));
}

#[test]
fn reset_drops_in_flight_work() {
    let mut c = controller();
    let run = c.trigger(G).unwrap();
    c.finish(&run, AttemptResult::Short, Millis(0));
    c.reset(G);
    assert_eq!(c.phase(G), Some(Phase::Idle));
    assert!(c.poll(Millis(10_000)).is_empty());
}
