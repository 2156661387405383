//! Publish-subscribe.
//!
//! A direct port of `qf/source/qf_pspub.cpp`'s `QF::publish()`: pin the
//! event under a critical section, walk the subscriber bitset from the
//! highest priority down (matching the original's `QF_LOG2`-based
//! most-significant-bit-first iteration, here `PrioritySet64::find_max`),
//! guarantee-post to every subscriber, then unpin and collect. See
//! [`crate::gc`] for why the pin/unpin bracket is what makes publishing to
//! zero subscribers still free the event (scenario S5).

use aof_abi::event::{Event, Priority};
use aof_abi::MAX_ACTIVE;
use aof_sync::critical_section::CriticalSection;
use aof_sync::pset::PrioritySet64;

use crate::ao::AoHandle;
use crate::equeue::Margin;
use crate::gc;
use crate::pool::EpoolRegistry;

/// One subscriber bitset per signal the application publishes, indexed by
/// active-object priority (`1..=MAX_ACTIVE`).
pub struct SubscriberLists<const MAX_SIGNAL: usize> {
    lists: [PrioritySet64; MAX_SIGNAL],
}

impl<const MAX_SIGNAL: usize> SubscriberLists<MAX_SIGNAL> {
    pub const fn new() -> Self {
        Self {
            lists: [PrioritySet64::new(); MAX_SIGNAL],
        }
    }

    pub fn subscribe(&mut self, signal: u16, priority: Priority) {
        let _cs = CriticalSection::enter();
        self.lists[signal as usize].insert(priority);
    }

    pub fn unsubscribe(&mut self, signal: u16, priority: Priority) {
        let _cs = CriticalSection::enter();
        self.lists[signal as usize].remove(priority);
    }

    pub fn unsubscribe_all(&mut self, priority: Priority) {
        let _cs = CriticalSection::enter();
        for list in self.lists.iter_mut() {
            list.remove(priority);
        }
    }

    fn subscribers(&self, signal: u16) -> PrioritySet64 {
        self.lists[signal as usize]
    }
}

impl<const MAX_SIGNAL: usize> Default for SubscriberLists<MAX_SIGNAL> {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes `e` to every active object subscribed to `e.signal`,
/// highest priority first. `registry` maps a priority to its active
/// object; entries for priorities with no registered active object are
/// `None` and skipped (can only happen if a subscriber unregistered
/// without unsubscribing, itself a contract violation upstream). Every
/// successful post marks that priority ready in `ready`, the same bitset
/// the scheduler consults — a posted event a direct `Scheduler::post`
/// call would have marked ready is no different just because it arrived
/// through the subscriber fan-out instead.
pub fn publish<const MAX_SIGNAL: usize>(
    e: *const Event,
    subscribers: &SubscriberLists<MAX_SIGNAL>,
    registry: &mut [Option<&mut dyn AoHandle>; MAX_ACTIVE as usize + 1],
    ready: &mut PrioritySet64,
    pools: &EpoolRegistry<{ aof_abi::MAX_EPOOL }>,
) {
    // SAFETY: `e` is valid for the duration of this call by caller contract.
    let header = unsafe { &*e };
    {
        let _cs = CriticalSection::enter();
        gc::ref_inc(header);
    }

    let mut remaining = subscribers.subscribers(header.signal);
    while let Some(prio) = remaining.find_max() {
        remaining.remove(prio);
        if let Some(ao) = registry[prio as usize].as_deref_mut() {
            let posted = ao.post_fifo_dyn(e, Margin::Bare);
            aof_sync::require!(posted, "publish must never fail to post to a subscriber");
            ready.insert(prio);
        }
    }

    {
        let _cs = CriticalSection::enter();
        gc::ref_dec(header);
    }
    gc::gc(e, pools);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ao::{AoCore, HasAoCore};
    use crate::hsm::{self, HasHsm, Hsm, Outcome};
    use aof_abi::signal::{INIT_SIG, USER_SIG};

    struct Listener {
        hsm: Hsm<Listener>,
        core: AoCore<4>,
        received: u32,
    }

    impl HasHsm for Listener {
        fn hsm(&self) -> &Hsm<Self> {
            &self.hsm
        }
        fn hsm_mut(&mut self) -> &mut Hsm<Self> {
            &mut self.hsm
        }
    }

    impl HasAoCore<4> for Listener {
        fn ao_core(&self) -> &AoCore<4> {
            &self.core
        }
        fn ao_core_mut(&mut self) -> &mut AoCore<4> {
            &mut self.core
        }
    }

    fn initial(_l: &mut Listener, _e: &Event) -> Outcome<Listener> {
        Outcome::Tran(ready)
    }

    fn ready(l: &mut Listener, e: &Event) -> Outcome<Listener> {
        match e.signal {
            USER_SIG => {
                l.received += 1;
                Outcome::Handled
            }
            _ => Outcome::Super(hsm::top),
        }
    }

    fn listener(priority: u8) -> Listener {
        let mut l = Listener {
            hsm: Hsm::new(initial),
            core: AoCore::new(priority),
            received: 0,
        };
        hsm::init(&mut l, &Event::new_static(INIT_SIG));
        l
    }

    #[test]
    fn publish_reaches_every_subscriber() {
        let mut a = listener(5);
        let mut b = listener(3);
        let mut subs: SubscriberLists<8> = SubscriberLists::new();
        subs.subscribe(USER_SIG, 5);
        subs.subscribe(USER_SIG, 3);

        let pools: EpoolRegistry<{ aof_abi::MAX_EPOOL }> = EpoolRegistry::new();
        let e = Event::new_static(USER_SIG);
        let mut registry: [Option<&mut dyn AoHandle>; MAX_ACTIVE as usize + 1] =
            core::array::from_fn(|_| None);
        registry[5] = Some(&mut a);
        registry[3] = Some(&mut b);
        let mut ready = PrioritySet64::new();

        publish(&e as *const Event, &subs, &mut registry, &mut ready, &pools);

        assert!(ready.find_max() == Some(5) || ready.find_max() == Some(3));
        drop(registry);
        a.run_to_completion(&pools);
        b.run_to_completion(&pools);
        assert_eq!(a.received, 1);
        assert_eq!(b.received, 1);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let subs: SubscriberLists<8> = SubscriberLists::new();
        let pools: EpoolRegistry<{ aof_abi::MAX_EPOOL }> = EpoolRegistry::new();
        let e = Event::new_static(USER_SIG);
        let mut registry: [Option<&mut dyn AoHandle>; MAX_ACTIVE as usize + 1] =
            core::array::from_fn(|_| None);
        let mut ready = PrioritySet64::new();
        publish(&e as *const Event, &subs, &mut registry, &mut ready, &pools);
    }
}
