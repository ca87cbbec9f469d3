use std::collections::{BTreeMap, HashMap};

use crate::foundation::core::Millis;

/// Handle returned by [`TimerQueue::schedule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Virtual-time timer queue. Timers due at the same instant fire in scheduling order.
#[derive(Clone, Debug)]
pub struct TimerQueue<T> {
    entries: BTreeMap<(Millis, u64), T>,
    due_at: HashMap<u64, Millis>,
    next_seq: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            due_at: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `payload` at `at`.
    pub fn schedule(&mut self, at: Millis, payload: T) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((at, seq), payload);
        self.due_at.insert(seq, at);
        TimerId(seq)
    }

    /// Cancel a pending timer, returning its payload. Fired or unknown ids yield `None`.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let at = self.due_at.remove(&id.0)?;
        self.entries.remove(&(at, id.0))
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<(Millis, T)> {
        let (&(at, seq), _) = self.entries.first_key_value()?;
        if at > now {
            return None;
        }
        self.due_at.remove(&seq);
        self.entries.remove(&(at, seq)).map(|p| (at, p))
    }

    /// When the earliest pending timer fires.
    pub fn next_due(&self) -> Option<Millis> {
        self.entries.keys().next().map(|(at, _)| *at)
    }

    /// Whether `id` is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.due_at.contains_key(&id.0)
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no timer is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stabilize/timers.rs"]
mod tests;
