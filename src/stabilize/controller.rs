use std::collections::BTreeMap;

use crate::foundation::core::{Millis, NodeId};
use crate::foundation::opts::StabilizeOpts;
use crate::stabilize::timers::{TimerId, TimerQueue};

/// Stabilization phase of one reflow group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in flight.
    Idle,
    /// Counting mounted items until the count holds steady.
    Observing {
        /// Count seen on the previous notification.
        last_count: usize,
        /// Consecutive notifications with an unchanged count.
        stable: u32,
    },
    /// A pipeline run is due or waiting on a retry timer.
    Reconciling {
        /// 1-based attempt number of the next run.
        attempt: u32,
    },
    /// Just reflowed; host notifications are absorbed until the grace timer fires.
    Settled {
        /// A notification arrived during the grace period.
        dirty: bool,
    },
}

/// Request to run the pipeline for a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reconcile {
    /// Group root.
    pub group: NodeId,
    /// 1-based attempt number.
    pub attempt: u32,
    /// No retry follows this attempt; reflow with whatever is mounted.
    pub final_attempt: bool,
}

/// How a [`Reconcile`] run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptResult {
    /// Fewer items than the host's expected total are mounted; nothing was written.
    Short,
    /// Geometry could not be inferred; wait for the next notification.
    NotReady,
    /// The reflow was applied.
    Applied,
}

/// Work the controller hands back from [`Controller::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// Run the pipeline.
    Reconcile(Reconcile),
    /// The grace period ended with notifications pending; re-signal the group with a fresh count.
    Recheck(NodeId),
}

#[derive(Clone, Debug)]
struct GroupState {
    phase: Phase,
    timer: Option<TimerId>,
}

/// Per-group stabilization state machine over a virtual clock.
///
/// Each group has at most one pipeline run in flight and at most one pending timer; overlapping
/// triggers coalesce into the run already scheduled.
#[derive(Debug)]
pub struct Controller {
    opts: StabilizeOpts,
    groups: BTreeMap<NodeId, GroupState>,
    timers: TimerQueue<NodeId>,
}

impl Controller {
    /// Controller with no groups.
    pub fn new(opts: StabilizeOpts) -> Self {
        Self {
            opts,
            groups: BTreeMap::new(),
            timers: TimerQueue::new(),
        }
    }

    /// Start tracking a group. Returns `false` when already tracked.
    pub fn track(&mut self, group: NodeId) -> bool {
        if self.groups.contains_key(&group) {
            return false;
        }
        self.groups.insert(
            group,
            GroupState {
                phase: Phase::Idle,
                timer: None,
            },
        );
        tracing::debug!(%group, "tracking reflow group");
        true
    }

    /// Stop tracking a group and cancel its timer.
    pub fn release(&mut self, group: NodeId) -> bool {
        let Some(state) = self.groups.remove(&group) else {
            return false;
        };
        if let Some(t) = state.timer {
            self.timers.cancel(t);
        }
        tracing::debug!(%group, "released reflow group");
        true
    }

    /// Current phase of a group.
    pub fn phase(&self, group: NodeId) -> Option<Phase> {
        self.groups.get(&group).map(|g| g.phase)
    }

    /// Tracked groups.
    pub fn groups(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.groups.keys().copied()
    }

    /// Pending timers across all groups.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// When the next timer fires.
    pub fn next_due(&self) -> Option<Millis> {
        self.timers.next_due()
    }

    /// A mutation notification for `group` with `count` items mounted (filter active).
    pub fn signal(
        &mut self,
        group: NodeId,
        count: usize,
        expected: Option<usize>,
        now: Millis,
    ) -> Option<Reconcile> {
        let threshold = self.opts.stable_threshold;
        let phase = self.groups.get(&group)?.phase;
        let reached = expected.is_some_and(|e| count >= e);
        match phase {
            Phase::Idle => {
                if reached {
                    return Some(self.start_reconciling(group));
                }
                self.set_phase(
                    group,
                    Phase::Observing {
                        last_count: count,
                        stable: 0,
                    },
                );
                self.arm(group, now.after(self.opts.observe_fallback()));
                tracing::info!(%group, count, "observing reflow group");
                None
            }
            Phase::Observing { last_count, stable } => {
                let stable = if count == last_count { stable + 1 } else { 0 };
                if stable >= threshold || reached {
                    tracing::debug!(%group, count, stable, reached, "group stabilized");
                    return Some(self.start_reconciling(group));
                }
                self.set_phase(
                    group,
                    Phase::Observing {
                        last_count: count,
                        stable,
                    },
                );
                self.arm(group, now.after(self.opts.observe_fallback()));
                None
            }
            Phase::Reconciling { .. } => None,
            Phase::Settled { .. } => {
                self.set_phase(group, Phase::Settled { dirty: true });
                None
            }
        }
    }

    /// Run the pipeline now unless a run is already pending (filter or tag change).
    pub fn trigger(&mut self, group: NodeId) -> Option<Reconcile> {
        let phase = self.groups.get(&group)?.phase;
        match phase {
            Phase::Idle | Phase::Settled { .. } => Some(self.start_reconciling(group)),
            Phase::Observing { .. } | Phase::Reconciling { .. } => None,
        }
    }

    /// Drop any in-flight work for a group (the filter was cleared).
    pub fn reset(&mut self, group: NodeId) {
        if self.groups.contains_key(&group) {
            self.disarm(group);
            self.set_phase(group, Phase::Idle);
        }
    }

    /// Fire every timer due by `now`.
    pub fn poll(&mut self, now: Millis) -> Vec<Wake> {
        let mut out = Vec::new();
        while let Some((_, group)) = self.timers.pop_due(now) {
            let Some(state) = self.groups.get_mut(&group) else {
                continue;
            };
            state.timer = None;
            let phase = state.phase;
            match phase {
                Phase::Observing { .. } => {
                    tracing::debug!(%group, "no notification within the fallback window");
                    out.push(Wake::Reconcile(self.start_reconciling(group)));
                }
                Phase::Reconciling { attempt } => {
                    out.push(Wake::Reconcile(self.request(group, attempt)));
                }
                Phase::Settled { dirty } => {
                    self.set_phase(group, Phase::Idle);
                    if dirty {
                        out.push(Wake::Recheck(group));
                    }
                }
                Phase::Idle => {}
            }
        }
        out
    }

    /// Report how a run went.
    pub fn finish(&mut self, run: &Reconcile, result: AttemptResult, now: Millis) {
        if !self.groups.contains_key(&run.group) {
            return;
        }
        match result {
            AttemptResult::Short if !run.final_attempt => {
                let next = run.attempt + 1;
                self.set_phase(run.group, Phase::Reconciling { attempt: next });
                self.arm(run.group, now.after(self.opts.retry_delay(run.attempt)));
                tracing::debug!(group = %run.group, next, "expected total not mounted; retrying");
            }
            AttemptResult::Short | AttemptResult::NotReady => {
                self.disarm(run.group);
                self.set_phase(run.group, Phase::Idle);
            }
            AttemptResult::Applied => {
                self.set_phase(run.group, Phase::Settled { dirty: false });
                self.arm(run.group, now.after(self.opts.settle_grace()));
                tracing::info!(group = %run.group, attempt = run.attempt, "group settled");
            }
        }
    }

    fn start_reconciling(&mut self, group: NodeId) -> Reconcile {
        self.disarm(group);
        self.set_phase(group, Phase::Reconciling { attempt: 1 });
        self.request(group, 1)
    }

    fn request(&self, group: NodeId, attempt: u32) -> Reconcile {
        Reconcile {
            group,
            attempt,
            final_attempt: attempt >= self.opts.max_attempts,
        }
    }

    fn set_phase(&mut self, group: NodeId, phase: Phase) {
        if let Some(state) = self.groups.get_mut(&group) {
            state.phase = phase;
        }
    }

    fn arm(&mut self, group: NodeId, at: Millis) {
        self.disarm(group);
        let id = self.timers.schedule(at, group);
        if let Some(state) = self.groups.get_mut(&group) {
            state.timer = Some(id);
        }
    }

    fn disarm(&mut self, group: NodeId) {
        if let Some(t) = self.groups.get_mut(&group).and_then(|s| s.timer.take()) {
            self.timers.cancel(t);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stabilize/controller.rs"]
mod tests;
