//! Active objects: priority, private event queue, and the operations the
//! framework and application code perform on them.
//!
//! An active object is a concrete extended-state struct that embeds both
//! an [`crate::hsm::Hsm`] (via [`crate::hsm::HasHsm`]) and an [`AoCore`]
//! (its priority and queue), composing the original's `QActive`
//! inheritance chain (`QHsm` -> `QActive` -> application class) as two
//! embedded fields instead. The framework's scheduler only ever reaches an
//! active object through the dyn-safe [`AoHandle`] vtable, registered as a
//! raw pointer the way `core/src/scheduler/scheduler.rs` threads `*mut
//! Task` through its ready queues.

use aof_abi::event::{Event, Priority};
use aof_sync::critical_section::CriticalSection;

use crate::equeue::{EventQueue, Margin};
use crate::gc;
use crate::hsm::{self, HasHsm};
use crate::pool::EpoolRegistry;

/// Priority and private queue shared by every active object, regardless
/// of its extended-state type or queue depth.
pub struct AoCore<const QLEN: usize> {
    priority: Priority,
    queue: EventQueue<QLEN>,
}

impl<const QLEN: usize> AoCore<QLEN> {
    pub const fn new(priority: Priority) -> Self {
        Self {
            priority,
            queue: EventQueue::new(),
        }
    }

    pub const fn priority(&self) -> Priority {
        self.priority
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queue_min_free(&self) -> aof_abi::EQueueCtr {
        self.queue.min_free()
    }
}

/// Posts `e` to `core`'s own queue (FIFO order), pinning a reference for
/// the queue slot. Returns `false` if `margin` was not satisfied.
pub fn post_fifo<const QLEN: usize>(core: &mut AoCore<QLEN>, e: *const Event, margin: Margin) -> bool {
    let _cs = CriticalSection::enter();
    let ok = core.queue.post_fifo(e, margin);
    if ok {
        // SAFETY: `e` outlives the queue slot by caller contract.
        gc::ref_inc(unsafe { &*e });
    }
    ok
}

/// Posts `e` to the head of `core`'s own queue, ahead of anything already
/// queued. Used for urgent events; `margin` is always `Bare` since the
/// original's `postLIFO` has no overflow-margin parameter.
pub fn post_lifo<const QLEN: usize>(core: &mut AoCore<QLEN>, e: *const Event) -> bool {
    let _cs = CriticalSection::enter();
    let ok = core.queue.post_lifo(e);
    if ok {
        // SAFETY: see `post_fifo`.
        gc::ref_inc(unsafe { &*e });
    }
    ok
}

/// Moves `e` to a private deferred queue instead of processing it now,
/// matching `QActive::defer`. The reference the caller's queue slot held
/// transfers to the deferred queue's slot (net reference count is
/// unchanged: one pin added here balances the one `release` will remove
/// when the event was taken off the active queue to be deferred).
pub fn defer<const DQLEN: usize>(dq: &mut EventQueue<DQLEN>, e: *const Event) -> bool {
    let _cs = CriticalSection::enter();
    let ok = dq.post_fifo(e, Margin::Bare);
    if ok {
        // SAFETY: see `post_fifo`.
        gc::ref_inc(unsafe { &*e });
    }
    ok
}

/// Moves the oldest deferred event back to the front of `core`'s own
/// queue, matching `QActive::recall`. Returns `false` if nothing was
/// deferred.
pub fn recall<const QLEN: usize, const DQLEN: usize>(
    core: &mut AoCore<QLEN>,
    dq: &mut EventQueue<DQLEN>,
) -> bool {
    let _cs = CriticalSection::enter();
    match dq.get() {
        Some(e) => {
            let posted = core.queue.post_lifo(e);
            aof_sync::require!(posted, "recall into own queue must not fail");
            true
        }
        None => false,
    }
}

/// Type-erased handle the scheduler and publish-subscribe code use to
/// reach an active object without knowing its extended-state type or
/// queue depth.
pub trait AoHandle {
    fn priority(&self) -> Priority;
    fn queue_is_empty(&self) -> bool;
    /// Dequeues and dispatches exactly one event (run-to-completion step).
    /// No-op if the queue is empty.
    fn run_to_completion(&mut self, pools: &EpoolRegistry<{ aof_abi::MAX_EPOOL }>);
    fn post_fifo_dyn(&mut self, e: *const Event, margin: Margin) -> bool;
    fn post_lifo_dyn(&mut self, e: *const Event) -> bool;
    /// Low-water mark of this active object's own queue, matching
    /// `QF::getQueueMin`.
    fn queue_min_free(&self) -> aof_abi::EQueueCtr;
}

/// Blanket implementation for any extended-state struct that embeds both
/// an [`AoCore`] and an [`hsm::Hsm`] over itself. `core_field`/`core_field_mut`
/// let a concrete type point at its own `AoCore` without this trait having
/// to know the field's name.
pub trait HasAoCore<const QLEN: usize>: HasHsm {
    fn ao_core(&self) -> &AoCore<QLEN>;
    fn ao_core_mut(&mut self) -> &mut AoCore<QLEN>;
}

impl<T, const QLEN: usize> AoHandle for T
where
    T: HasAoCore<QLEN>,
{
    fn priority(&self) -> Priority {
        self.ao_core().priority()
    }

    fn queue_is_empty(&self) -> bool {
        self.ao_core().queue_is_empty()
    }

    fn run_to_completion(&mut self, pools: &EpoolRegistry<{ aof_abi::MAX_EPOOL }>) {
        let taken = {
            let _cs = CriticalSection::enter();
            self.ao_core_mut().queue.get()
        };
        if let Some(e) = taken {
            // SAFETY: `e` was posted through `post_fifo`/`post_lifo`,
            // which pinned a reference kept alive until `release` below.
            hsm::dispatch(self, unsafe { &*e });
            gc::release(e, pools);
        }
    }

    fn post_fifo_dyn(&mut self, e: *const Event, margin: Margin) -> bool {
        post_fifo(self.ao_core_mut(), e, margin)
    }

    fn post_lifo_dyn(&mut self, e: *const Event) -> bool {
        post_lifo(self.ao_core_mut(), e)
    }

    fn queue_min_free(&self) -> aof_abi::EQueueCtr {
        self.ao_core().queue_min_free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hsm::{Hsm, Outcome};
    use aof_abi::signal::USER_SIG;

    struct Counter {
        hsm: Hsm<Counter>,
        core: AoCore<4>,
        hits: u32,
    }

    impl HasHsm for Counter {
        fn hsm(&self) -> &Hsm<Self> {
            &self.hsm
        }
        fn hsm_mut(&mut self) -> &mut Hsm<Self> {
            &mut self.hsm
        }
    }

    impl HasAoCore<4> for Counter {
        fn ao_core(&self) -> &AoCore<4> {
            &self.core
        }
        fn ao_core_mut(&mut self) -> &mut AoCore<4> {
            &mut self.core
        }
    }

    fn initial(_c: &mut Counter, _e: &Event) -> Outcome<Counter> {
        Outcome::Tran(counting)
    }

    fn counting(c: &mut Counter, e: &Event) -> Outcome<Counter> {
        match e.signal {
            USER_SIG => {
                c.hits += 1;
                Outcome::Handled
            }
            _ => Outcome::Super(hsm::top),
        }
    }

    #[test]
    fn post_then_run_to_completion_dispatches_one_event() {
        let mut c = Counter {
            hsm: Hsm::new(initial),
            core: AoCore::new(1),
            hits: 0,
        };
        hsm::init(&mut c, &Event::new_static(aof_abi::signal::INIT_SIG));

        let e = Event::new_static(USER_SIG);
        assert!(post_fifo(&mut c.core, &e as *const Event, Margin::Bare));

        let pools: EpoolRegistry<{ aof_abi::MAX_EPOOL }> = EpoolRegistry::new();
        c.run_to_completion(&pools);
        assert_eq!(c.hits, 1);
        assert!(c.queue_is_empty());
    }

    #[test]
    fn defer_then_recall_replays_event() {
        let mut dq: EventQueue<2> = EventQueue::new();
        let mut core: AoCore<2> = AoCore::new(1);
        let e = Event::new_static(USER_SIG);
        assert!(defer(&mut dq, &e as *const Event));
        assert!(core.queue_is_empty());
        assert!(recall(&mut core, &mut dq));
        assert!(!core.queue_is_empty());
    }
}
