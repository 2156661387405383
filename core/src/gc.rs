//! Dynamic-event reference counting and garbage collection.
//!
//! Grounded in the original's `QF_EVT_REF_CTR_INC_`/`_DEC_` macros and
//! `QF::gc()`. Every enqueue of a dynamic event increments its reference
//! count (`ref_inc`); every active object decrements it once after
//! processing a dequeued event and then calls `gc`, which is a pure
//! check-and-maybe-free: it never decrements itself, it only frees the
//! block once the count has already reached zero. `publish` brackets its
//! whole subscriber loop with one extra `ref_inc`/`ref_dec` pin so the
//! event survives even if every subscriber finishes and calls `gc` before
//! the loop itself is done (and so that publishing to zero subscribers
//! still collects the event — see spec scenario S5).

use aof_abi::event::{Event, STATIC_POOL_ID};
use aof_sync::critical_section::CriticalSection;

use crate::pool::EpoolRegistry;

/// Increments `e`'s reference count. No-op for static events.
pub fn ref_inc(e: &Event) {
    if e.pool_id == STATIC_POOL_ID {
        return;
    }
    let _cs = CriticalSection::enter();
    // SAFETY: mutation of a shared field under a critical section,
    // matching every other pool/queue access in this crate.
    let ptr = e as *const Event as *mut Event;
    unsafe { (*ptr).ref_ctr += 1 };
}

/// Decrements `e`'s reference count. No-op for static events. Panics via
/// the contract hook on underflow (more `gc`-triggering decrements than
/// `ref_inc` calls is always a framework bug, never recoverable).
pub fn ref_dec(e: &Event) {
    if e.pool_id == STATIC_POOL_ID {
        return;
    }
    let _cs = CriticalSection::enter();
    let ptr = e as *const Event as *mut Event;
    // SAFETY: see `ref_inc`.
    unsafe {
        aof_sync::require!((*ptr).ref_ctr > 0, "ref_dec underflow");
        (*ptr).ref_ctr -= 1;
    }
}

/// Frees `e` back to its pool if its reference count has reached zero.
/// No-op for static events (`pool_id == 0`), which are never recycled.
pub fn gc<const MAX_EPOOL: usize>(e: *const Event, pools: &EpoolRegistry<MAX_EPOOL>) {
    let _cs = CriticalSection::enter();
    // SAFETY: `e` is a live event pointer owned by the caller for the
    // duration of this call.
    let header = unsafe { &*e };
    if header.pool_id == STATIC_POOL_ID {
        return;
    }
    if header.ref_ctr == 0 {
        if let Some(pool) = pools.get(header.pool_id) {
            pool.free_raw(e);
        }
    }
}

/// Convenience for the common "done with this dequeued event" sequence:
/// decrement, then collect if that was the last reference.
pub fn release<const MAX_EPOOL: usize>(e: *const Event, pools: &EpoolRegistry<MAX_EPOOL>) {
    // SAFETY: see `gc`.
    let header = unsafe { &*e };
    ref_dec(header);
    gc(e, pools);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{EventPayload, EventPool};
    use aof_abi::signal::USER_SIG;

    #[repr(C)]
    struct Ping {
        event: Event,
        count: u32,
    }

    impl EventPayload for Ping {
        fn event(&self) -> &Event {
            &self.event
        }
        fn event_mut(&mut self) -> &mut Event {
            &mut self.event
        }
    }

    #[test]
    fn publish_to_no_subscribers_still_collects() {
        static POOL: EventPool<Ping, 2> = EventPool::new(1);
        let mut reg: EpoolRegistry<1> = EpoolRegistry::new();
        reg.register(&POOL);

        let ptr = POOL
            .alloc(Ping {
                event: Event::new_static(USER_SIG),
                count: 0,
            })
            .unwrap();
        let e = ptr as *const Event;

        // mirrors `publish`'s pin/unpin around an empty subscriber loop
        ref_inc(unsafe { &*e });
        ref_dec(unsafe { &*e });
        gc(e, &reg);

        assert_eq!(POOL.free_count(), 2);
    }

    #[test]
    fn event_survives_until_last_reference_released() {
        static POOL: EventPool<Ping, 2> = EventPool::new(1);
        let mut reg: EpoolRegistry<1> = EpoolRegistry::new();
        reg.register(&POOL);

        let ptr = POOL
            .alloc(Ping {
                event: Event::new_static(USER_SIG),
                count: 0,
            })
            .unwrap();
        let e = ptr as *const Event;

        // publish to two subscribers: pin, two subscriber enqueues, unpin
        ref_inc(unsafe { &*e });
        ref_inc(unsafe { &*e });
        ref_inc(unsafe { &*e });
        ref_dec(unsafe { &*e });
        gc(e, &reg);
        assert_eq!(POOL.free_count(), 1, "still referenced by both subscribers");

        release(e, &reg);
        assert_eq!(POOL.free_count(), 1, "one subscriber still holds it");

        release(e, &reg);
        assert_eq!(POOL.free_count(), 2, "last subscriber released it");
    }
}
