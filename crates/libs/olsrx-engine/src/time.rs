//! Discrete-event clock primitives.
//!
//! The engine never reads a wall clock: every entry point takes the
//! current [`Timestamp`] and all future work goes through a
//! [`Scheduler`]. Events due at the same instant fire in insertion
//! order, which is what makes multi-node simulations reproducible.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// A point on the simulation timeline, microsecond resolution.
///
/// Signed so that "one second before start" is representable: a freshly
/// created link deliberately carries an already-expired symmetry time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000)
    }

    pub fn from_secs_f64(seconds: f64) -> Self {
        Self((seconds * 1_000_000.0) as i64)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Duration since `earlier`, zero if `earlier` is in the future.
    pub fn since(self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0).max(0) as u64)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.as_micros() as i64)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 - rhs.as_micros() as i64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Handle for cancelling a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Entry<E> {
    at: Timestamp,
    seq: u64,
    id: TimerId,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    // reversed: BinaryHeap is a max-heap, we want earliest (then first
    // inserted) on top
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Event queue ordered by deadline, then insertion.
///
/// Scheduling in the past is allowed; such events fire on the next
/// [`Scheduler::pop_due`]. Cancellation is lazy; a cancelled id is
/// dropped when it reaches the head.
pub struct Scheduler<E> {
    heap: BinaryHeap<Entry<E>>,
    cancelled: HashSet<u64>,
    next_seq: u64,
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new(), cancelled: HashSet::new(), next_seq: 0 }
    }

    pub fn schedule(&mut self, at: Timestamp, event: E) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = TimerId(seq);
        self.heap.push(Entry { at, seq, id, event });
        id
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.cancelled.insert(id.0);
    }

    /// Earliest pending deadline, skipping cancelled events.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.drop_cancelled();
        self.heap.peek().map(|entry| entry.at)
    }

    /// Take the next event due at or before `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<E> {
        self.drop_cancelled();
        if self.heap.peek().is_some_and(|entry| entry.at <= now) {
            self.heap.pop().map(|entry| entry.event)
        } else {
            None
        }
    }

    fn drop_cancelled(&mut self) {
        while let Some(head) = self.heap.peek() {
            if self.cancelled.remove(&head.id.0) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}
