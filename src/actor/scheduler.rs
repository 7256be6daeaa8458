//! Virtual clock and timer queue.
//!
//! Time only moves when the host advances it, so delayed transitions are
//! deterministic under test. Timers are keyed by the actor that armed them
//! and an id; arming an existing key replaces the old timer.

use super::reference::ActorKey;
use crate::core::Event;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Timer {
    pub owner: ActorKey,
    pub id: String,
    pub target: ActorKey,
    pub event: Event,
    pub token: Option<u64>,
}

/// Deadline, then arming order.
type Slot = (Duration, u64);

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    now: Duration,
    seq: u64,
    queue: BTreeMap<Slot, Timer>,
    index: HashMap<(ActorKey, String), Slot>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn now(&self) -> Duration {
        self.now
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn schedule(&mut self, delay: Duration, timer: Timer) {
        self.cancel(timer.owner, &timer.id);
        let slot = (self.now + delay, self.seq);
        self.seq += 1;
        self.index.insert((timer.owner, timer.id.clone()), slot);
        self.queue.insert(slot, timer);
    }

    pub(crate) fn cancel(&mut self, owner: ActorKey, id: &str) -> bool {
        match self.index.remove(&(owner, id.to_string())) {
            Some(slot) => self.queue.remove(&slot).is_some(),
            None => false,
        }
    }

    /// Cancel every timer armed by `owner`.
    pub(crate) fn cancel_all(&mut self, owner: ActorKey) -> usize {
        let slots: Vec<Slot> = self
            .index
            .iter()
            .filter(|((key, _), _)| *key == owner)
            .map(|(_, slot)| *slot)
            .collect();
        self.index.retain(|(key, _), _| *key != owner);
        for slot in &slots {
            self.queue.remove(slot);
        }
        slots.len()
    }

    /// Remove the earliest timer due at or before `until` and move the clock
    /// to its deadline.
    pub(crate) fn pop_due(&mut self, until: Duration) -> Option<Timer> {
        let (&slot, _) = self.queue.first_key_value()?;
        if slot.0 > until {
            return None;
        }
        let timer = self.queue.remove(&slot)?;
        self.index.remove(&(timer.owner, timer.id.clone()));
        self.now = self.now.max(slot.0);
        Some(timer)
    }

    pub(crate) fn advance_to(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    /// Time until the next timer is due.
    pub(crate) fn next_in(&self) -> Option<Duration> {
        self.queue
            .first_key_value()
            .map(|((deadline, _), _)| deadline.saturating_sub(self.now))
    }
}
