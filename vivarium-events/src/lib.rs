//! Vivarium Events - Timed-Event Scheduler
//!
//! A priority queue of deferred actions keyed by a monotonic value stream.
//! The scheduler is generic over the action payload: the scripting engine
//! instantiates it with AST node ids, so the queue never owns (or frees) the
//! syntax tree it points into.
//!
//! # Update protocol
//!
//! Firing an action usually needs state the scheduler cannot hold (the
//! evaluator, the symbol table), so one update tick is driven from outside:
//!
//! ```text
//! while let Some(ev) = schedule.pop_due(target) {
//!     run(&ev.action);
//!     schedule.requeue(ev);
//! }
//! schedule.set_value(target);
//! ```
//!
//! Actions scheduled *during* a tick land in the same heap, so they fire in
//! the same tick exactly when their time is at or before the target.

mod schedule;

pub use schedule::{EventSchedule, TimedEvent};
