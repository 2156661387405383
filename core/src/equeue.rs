//! Bounded, dual-ended event queue.
//!
//! A single front-cell fast path plus a ring-buffered tail, directly
//! grounded in `aof_sync::ring::RingBuffer` and generalized from it to the
//! original `QEQueue`'s front-slot discipline: one event sits in `front`
//! ready for immediate removal, and up to `N` more queue behind it in the
//! ring. Total capacity is therefore `N + 1`.
//!
//! Queue entries are type-erased `*const Event` — an active object's queue
//! carries whatever event types its state machine accepts, exactly as the
//! original's `QEQueue` carries `QEvt const *`.

use aof_abi::event::Event;
use aof_abi::EQueueCtr;
use aof_sync::critical_section::CriticalSection;
use aof_sync::ring::RingBuffer;

/// How much headroom a post must leave behind. `Bare` never fails but is a
/// contract violation on overflow (the caller has proven the queue can
/// never fill, matching `QF_NO_MARGIN` in the original); `AtLeast(n)` is a
/// soft check that returns `false` instead of violating a contract.
#[derive(Clone, Copy, Debug)]
pub enum Margin {
    Bare,
    AtLeast(EQueueCtr),
}

pub struct EventQueue<const N: usize> {
    front: Option<*const Event>,
    ring: RingBuffer<*const Event, N>,
    min_free: EQueueCtr,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            front: None,
            ring: RingBuffer::new_with([None; N]),
            min_free: (N + 1) as EQueueCtr,
        }
    }

    pub const fn capacity(&self) -> usize {
        N + 1
    }

    pub fn is_empty(&self) -> bool {
        self.front.is_none()
    }

    fn free_slots(&self) -> EQueueCtr {
        let used = self.ring.len() + if self.front.is_some() { 1 } else { 0 };
        (self.capacity() - used) as EQueueCtr
    }

    /// Queue low-water mark, matching `QF::getQueueMin`.
    pub fn min_free(&self) -> EQueueCtr {
        self.min_free
    }

    fn record_free(&mut self, free: EQueueCtr) {
        if free < self.min_free {
            self.min_free = free;
        }
    }

    /// Posts to the tail (FIFO order for readers draining via `get`).
    pub fn post_fifo(&mut self, e: *const Event, margin: Margin) -> bool {
        let _cs = CriticalSection::enter();
        let free_before = self.free_slots();
        let ok = match margin {
            Margin::Bare => free_before > 0,
            Margin::AtLeast(m) => free_before > m,
        };
        if !ok {
            return false;
        }
        if self.front.is_none() {
            self.front = Some(e);
        } else {
            let pushed = self.ring.try_push(e);
            debug_assert!(pushed, "margin check should have guaranteed room");
        }
        self.record_free(free_before - 1);
        true
    }

    /// Posts to the head: the event becomes the very next one delivered,
    /// ahead of anything already queued. Used for urgent/priority events.
    pub fn post_lifo(&mut self, e: *const Event) -> bool {
        let _cs = CriticalSection::enter();
        let free_before = self.free_slots();
        if free_before == 0 {
            return false;
        }
        if let Some(old_front) = self.front.take() {
            // Old front must move to the very head of the ring; since the
            // ring only supports tail insertion, rebuild it with the old
            // front first. N is small (bounded queue depth) so this is a
            // cheap, finite rebuild, not an unbounded shift.
            let mut rest = RingBuffer::<*const Event, N>::new_with(core::array::from_fn(|_| None));
            rest.try_push(old_front);
            while let Some(item) = self.ring.try_pop() {
                rest.try_push(item);
            }
            self.ring = rest;
        }
        self.front = Some(e);
        self.record_free(free_before - 1);
        true
    }

    /// Removes and returns the front event, or `None` if empty.
    pub fn get(&mut self) -> Option<*const Event> {
        let _cs = CriticalSection::enter();
        let taken = self.front.take()?;
        self.front = self.ring.try_pop();
        Some(taken)
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
