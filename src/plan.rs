//! The future events of one rollout, ordered by time.
//!
//! `Queue<T>` holds payloads of type `T` keyed by an `f64` time, so-called plans. Pushing
//! and popping are *O*(log(*n*)). Every push takes the next value of a sequence counter,
//! and plans due at the same time leave in that order, so the pop order is a pure function
//! of the push order.

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::error::SimError;

/// A min-queue of plans keyed by `(time, sequence number)`.
pub struct Queue<T> {
    heap: BinaryHeap<Slot<T>>,
    next_seq: u64,
}

impl<T> Queue<T> {
    #[must_use]
    pub fn new() -> Queue<T> {
        Queue {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedules `data` at `time`.
    ///
    /// Times are ordered with `f64::total_cmp`, so NaN must be rejected by the caller.
    pub fn push(&mut self, time: f64, data: T) -> PlanId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Slot { time, seq, data });
        PlanId(seq)
    }

    /// # Errors
    ///
    /// `SimError::EmptyQueueError` once every plan has been taken.
    pub fn pop_min(&mut self) -> Result<Plan<T>, SimError> {
        let Slot { time, seq, data } = self.heap.pop().ok_or(SimError::EmptyQueueError)?;
        Ok(Plan {
            time,
            id: PlanId(seq),
            data,
        })
    }

    #[must_use]
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|slot| slot.time)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Queue::new()
    }
}

// The payload takes no part in the ordering.
struct Slot<T> {
    time: f64,
    seq: u64,
    data: T,
}

impl<T> Ord for Slot<T> {
    // `BinaryHeap` pops the greatest slot, so the earliest `(time, seq)` must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Slot<T> {}

/// The sequence number a plan was pushed with. Unique within one queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlanId(u64);

impl PlanId {
    #[must_use]
    pub fn seq(self) -> u64 {
        self.0
    }
}

pub struct Plan<T> {
    pub time: f64,
    pub id: PlanId,
    pub data: T,
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::Queue;
    use crate::error::SimError;

    fn drain<T>(queue: &mut Queue<T>) -> Vec<(f64, T)> {
        std::iter::from_fn(|| queue.pop_min().ok().map(|plan| (plan.time, plan.data))).collect()
    }

    #[test]
    fn empty_queue() {
        let mut queue = Queue::<&str>::new();
        assert!(queue.is_empty());
        assert_eq!(queue.peek_time(), None);
        assert!(matches!(queue.pop_min(), Err(SimError::EmptyQueueError)));
    }

    #[test]
    fn add_plans() {
        let mut queue = Queue::new();
        queue.push(24.0, "isym");
        queue.push(72.0, "resi");
        queue.push(0.0, "expo");
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek_time(), Some(0.0));
        assert_eq!(drain(&mut queue), vec![(0.0, "expo"), (24.0, "isym"), (72.0, "resi")]);
    }

    #[test]
    fn add_plans_at_same_time() {
        let mut queue = Queue::new();
        let ids: Vec<_> = (0..10).map(|person| queue.push(12.0, person)).collect();
        assert!(ids.windows(2).all(|pair| pair[0].seq() < pair[1].seq()));
        let order: Vec<_> = drain(&mut queue).into_iter().map(|(_, person)| person).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn add_and_get_plans() {
        let mut queue = Queue::new();
        queue.push(1.0, 'a');
        queue.push(2.0, 'b');
        assert_eq!(queue.pop_min().unwrap().data, 'a');

        // A plan pushed after a pop still goes ahead of later ones.
        queue.push(1.5, 'c');
        queue.push(2.0, 'd');
        assert_eq!(drain(&mut queue), vec![(1.5, 'c'), (2.0, 'b'), (2.0, 'd')]);
    }

    #[test]
    fn interleaved_pushes_replay_identically() {
        let run = || {
            let mut queue = Queue::new();
            let mut popped = Vec::new();
            for step in 0..50u32 {
                queue.push(f64::from(step % 7), step);
                queue.push(f64::from(step % 3), step + 100);
                if step % 2 == 0 {
                    let plan = queue.pop_min().unwrap();
                    popped.push((plan.time.to_bits(), plan.data));
                }
            }
            popped.extend(drain(&mut queue).into_iter().map(|(t, step)| (t.to_bits(), step)));
            popped
        };
        assert_eq!(run(), run());
    }
}
