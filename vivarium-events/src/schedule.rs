//! The timed-event priority queue.

use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One scheduled action.
///
/// `repeat == 0` means single-shot; `max < 0` means unbounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedEvent<A> {
    /// Monotonic id; doubles as the tie-break for equal fire times.
    pub id: u64,
    pub action: A,
    /// Next value at which this event fires.
    pub next: f64,
    pub repeat: f64,
    pub max: f64,
}

/// Heap slot ordered so that `BinaryHeap` behaves as a min-heap over
/// `(next, id)`.
struct Slot<A>(TimedEvent<A>);

impl<A> PartialEq for Slot<A> {
    fn eq(&self, other: &Self) -> bool {
        self.0.next == other.0.next && self.0.id == other.0.id
    }
}

impl<A> Eq for Slot<A> {}

impl<A> Ord for Slot<A> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .0
            .next
            .total_cmp(&self.0.next)
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

impl<A> PartialOrd for Slot<A> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of timed actions against one monotonic value stream.
pub struct EventSchedule<A> {
    queue: BinaryHeap<Slot<A>>,
    cur_value: f64,
    next_id: u64,
}

impl<A> EventSchedule<A> {
    pub fn new() -> Self {
        EventSchedule {
            queue: BinaryHeap::new(),
            cur_value: 0.0,
            next_id: 1,
        }
    }

    pub fn current_value(&self) -> f64 {
        self.cur_value
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue a new action. Returns false when the event can never fire: a
    /// single-shot whose time already passed, or a first firing beyond `max`.
    /// Repeating events that start in the past are fast-forwarded by whole
    /// repeat steps to the first firing at or after the current value.
    pub fn schedule(&mut self, action: A, first: f64, repeat: f64, max: f64) -> bool {
        let mut first = first;
        if first < self.cur_value {
            if repeat == 0.0 {
                debug!(first, cur = self.cur_value, "dropping missed single-shot event");
                return false;
            }
            let offset = self.cur_value - first;
            let steps = (offset / repeat).ceil();
            first += repeat * steps;
        }
        if max >= 0.0 && first > max {
            debug!(first, max, "dropping event scheduled past its max");
            return false;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Slot(TimedEvent {
            id,
            action,
            next: first,
            repeat,
            max,
        }));
        true
    }

    /// Pop the next event due at or before `target`, if any. The caller runs
    /// the action and hands the event back to [`requeue`](Self::requeue).
    pub fn pop_due(&mut self, target: f64) -> Option<TimedEvent<A>> {
        if self.queue.peek()?.0.next <= target {
            self.queue.pop().map(|slot| slot.0)
        } else {
            None
        }
    }

    /// Advance a fired event to its next repetition and reinsert it. Returns
    /// false (dropping the event) for single-shots and for repetitions past
    /// `max`.
    pub fn requeue(&mut self, mut event: TimedEvent<A>) -> bool {
        if event.repeat == 0.0 {
            return false;
        }
        event.next += event.repeat;
        if event.max >= 0.0 && event.next > event.max {
            return false;
        }
        self.queue.push(Slot(event));
        true
    }

    /// Record that the value stream has reached `value`. Call after draining
    /// due events with [`pop_due`](Self::pop_due).
    pub fn set_value(&mut self, value: f64) {
        self.cur_value = value;
    }

    /// Remove and return every queued event in heap order, ignoring times.
    /// Used at shutdown to fire whatever remains exactly once.
    pub fn drain_all(&mut self) -> Vec<TimedEvent<A>> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(slot) = self.queue.pop() {
            out.push(slot.0);
        }
        out
    }

    /// Pending events ordered by `(next, id)`, for serialization.
    pub fn pending(&self) -> Vec<&TimedEvent<A>> {
        let mut out: Vec<&TimedEvent<A>> = self.queue.iter().map(|slot| &slot.0).collect();
        out.sort_by(|a, b| a.next.total_cmp(&b.next).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

impl<A> Default for EventSchedule<A> {
    fn default() -> Self {
        Self::new()
    }
}
