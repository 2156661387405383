//! Time-event wheel.
//!
//! A direct port of the armed singly-linked list and `tick_x` scan from
//! `include/qf.h`'s `QTimeEvt` and the disarm race documented verbatim by
//! `qf/source/qte_darm.cpp`: **the countdown counter, not list membership,
//! is the single source of truth for "armed."** `disarm` only ever zeroes
//! the counter; it never touches the list. Unlinking a disarmed node is
//! deferred to the next `tick_x` scan of that tick rate, which notices
//! `ctr == 0` while it is already walking the list and removes it there —
//! "no harm disarming an already-disarmed time event," and no race window
//! where disarming and firing can corrupt the list, since both paths only
//! ever touch `ctr` and the scan is the sole list mutator.
//!
//! Per spec design note: time events are never pool-allocated. There is no
//! `new_x::<TimeEvt>` — every instance is a `'static` value the
//! application owns for the program's lifetime, structurally enforced by
//! `arm`/`disarm`/`rearm` taking `&'static mut TimeEvt` (the original
//! enforces the same rule only by convention/assertion; here it is the
//! type signature).

use aof_abi::event::{Event, Priority};
use aof_abi::{TimeEvtCtr, MAX_TICK_RATE};
use aof_sync::critical_section::CriticalSection;
use aof_sync::pset::PrioritySet64;

use crate::ao::AoHandle;
use crate::equeue::Margin;

/// A single armable timer. Embeds [`Event`] as its first field so it can
/// be posted directly to an active object's queue when it expires.
#[repr(C)]
pub struct TimeEvt {
    pub event: Event,
    ctr: TimeEvtCtr,
    interval: TimeEvtCtr,
    tick_rate: u8,
    target: Priority,
    linked: bool,
    next: Option<*mut TimeEvt>,
}

impl TimeEvt {
    /// `signal` is delivered to `target`'s queue on every expiry;
    /// `tick_rate` selects which of the wheel's `tick_x` channels drives
    /// this timer.
    pub const fn new(signal: u16, tick_rate: u8, target: Priority) -> Self {
        Self {
            event: Event::new_static(signal),
            ctr: 0,
            interval: 0,
            tick_rate,
            target,
            linked: false,
            next: None,
        }
    }

    pub const fn is_armed(&self) -> bool {
        self.ctr > 0
    }

    pub const fn ctr(&self) -> TimeEvtCtr {
        self.ctr
    }
}

/// One list head per tick rate. `heads[r]` is the first node currently
/// linked for tick rate `r` (armed or awaiting lazy unlink).
pub struct TimeWheel<const MAX_TICK_RATE_: usize = MAX_TICK_RATE> {
    heads: [Option<*mut TimeEvt>; MAX_TICK_RATE_],
}

impl<const MAX_TICK_RATE_: usize> TimeWheel<MAX_TICK_RATE_> {
    pub const fn new() -> Self {
        Self {
            heads: [None; MAX_TICK_RATE_],
        }
    }

    fn link(&mut self, te: &mut TimeEvt) {
        if te.linked {
            return;
        }
        te.next = self.heads[te.tick_rate as usize];
        self.heads[te.tick_rate as usize] = Some(te as *mut TimeEvt);
        te.linked = true;
    }

    /// Arms `te` to fire once after `nticks` ticks, then reload to
    /// `interval` ticks (0 means one-shot).
    pub fn arm(&mut self, te: &'static mut TimeEvt, nticks: TimeEvtCtr, interval: TimeEvtCtr) {
        let _cs = CriticalSection::enter();
        aof_sync::require!(nticks > 0, "arm with zero ticks is a contract violation");
        aof_sync::require!(te.ctr == 0, "arm on an already-armed time event is a contract violation");
        te.ctr = nticks;
        te.interval = interval;
        self.link(te);
    }

    /// Zeroes `te`'s countdown. Returns whether it was armed beforehand.
    /// List membership is untouched; see module docs.
    pub fn disarm(&self, te: &mut TimeEvt) -> bool {
        let _cs = CriticalSection::enter();
        let was_armed = te.ctr > 0;
        te.ctr = 0;
        was_armed
    }

    /// Re-arms `te` to fire after `nticks` more ticks, keeping its reload
    /// interval. Returns whether it was already armed.
    pub fn rearm(&mut self, te: &'static mut TimeEvt, nticks: TimeEvtCtr) -> bool {
        let _cs = CriticalSection::enter();
        let was_armed = te.ctr > 0;
        aof_sync::require!(nticks > 0, "rearm with zero ticks is a contract violation");
        te.ctr = nticks;
        self.link(te);
        was_armed
    }

    /// Advances every timer on `tick_rate` by one tick, posting to
    /// `registry[target]` on expiry and lazily unlinking disarmed nodes
    /// encountered along the way. Every expiry that posts also marks
    /// `target` ready, the same bitset `Scheduler::post` updates — a timer
    /// firing is otherwise indistinguishable from any other post and must
    /// wake the scheduler the same way.
    pub fn tick_x(
        &mut self,
        tick_rate: u8,
        registry: &mut [Option<&mut dyn AoHandle>],
        ready: &mut PrioritySet64,
    ) {
        let _cs = CriticalSection::enter();
        let mut prev: Option<*mut TimeEvt> = None;
        let mut cursor = self.heads[tick_rate as usize];
        while let Some(raw) = cursor {
            // SAFETY: every linked node is a `'static` value registered
            // through `arm`/`rearm`, so it outlives the wheel.
            let te = unsafe { &mut *raw };
            let next = te.next;
            if te.ctr == 0 {
                // Lazily unlink: this node was disarmed since the last scan.
                match prev {
                    Some(p) => unsafe { (*p).next = next },
                    None => self.heads[tick_rate as usize] = next,
                }
                te.linked = false;
                cursor = next;
                continue;
            }

            te.ctr -= 1;
            if te.ctr == 0 {
                if let Some(ao) = registry.get_mut(te.target as usize).and_then(|s| s.as_deref_mut()) {
                    let posted = ao.post_fifo_dyn(&te.event as *const Event, Margin::Bare);
                    aof_sync::require!(posted, "time event post must never fail");
                    ready.insert(te.target);
                }
                if te.interval > 0 {
                    te.ctr = te.interval;
                }
            }
            prev = Some(raw);
            cursor = next;
        }
    }
}

impl<const MAX_TICK_RATE_: usize> Default for TimeWheel<MAX_TICK_RATE_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ao::{AoCore, HasAoCore};
    use crate::hsm::{self, HasHsm, Hsm, Outcome};
    use aof_abi::signal::{INIT_SIG, USER_SIG};

    struct Watcher {
        hsm: Hsm<Watcher>,
        core: AoCore<4>,
        fires: u32,
    }

    impl HasHsm for Watcher {
        fn hsm(&self) -> &Hsm<Self> {
            &self.hsm
        }
        fn hsm_mut(&mut self) -> &mut Hsm<Self> {
            &mut self.hsm
        }
    }

    impl HasAoCore<4> for Watcher {
        fn ao_core(&self) -> &AoCore<4> {
            &self.core
        }
        fn ao_core_mut(&mut self) -> &mut AoCore<4> {
            &mut self.core
        }
    }

    fn initial(_w: &mut Watcher, _e: &Event) -> Outcome<Watcher> {
        Outcome::Tran(ready)
    }

    fn ready(w: &mut Watcher, e: &Event) -> Outcome<Watcher> {
        match e.signal {
            USER_SIG => {
                w.fires += 1;
                Outcome::Handled
            }
            _ => Outcome::Super(hsm::top),
        }
    }

    fn watcher(priority: u8) -> Watcher {
        let mut w = Watcher {
            hsm: Hsm::new(initial),
            core: AoCore::new(priority),
            fires: 0,
        };
        hsm::init(&mut w, &Event::new_static(INIT_SIG));
        w
    }

    #[test]
    fn one_shot_fires_exactly_once() {
        static mut TE: TimeEvt = TimeEvt::new(USER_SIG, 0, 1);
        let mut wheel: TimeWheel<1> = TimeWheel::new();
        let mut target = watcher(1);

        // SAFETY: single-threaded test, no other reference to TE alive.
        let te: &'static mut TimeEvt = unsafe { &mut *core::ptr::addr_of_mut!(TE) };
        wheel.arm(te, 2, 0);

        let mut registry: [Option<&mut dyn AoHandle>; 2] = [None, Some(&mut target)];
        let mut ready = PrioritySet64::new();
        wheel.tick_x(0, &mut registry, &mut ready);
        wheel.tick_x(0, &mut registry, &mut ready);
        wheel.tick_x(0, &mut registry, &mut ready);
        drop(registry);

        assert_eq!(ready.find_max(), Some(1));
        let pools = crate::pool::EpoolRegistry::<{ aof_abi::MAX_EPOOL }>::new();
        while !target.queue_is_empty() {
            target.run_to_completion(&pools);
        }
        assert_eq!(target.fires, 1);
    }

    #[test]
    fn periodic_reloads_after_each_expiry() {
        static mut TE: TimeEvt = TimeEvt::new(USER_SIG, 0, 1);
        let mut wheel: TimeWheel<1> = TimeWheel::new();
        let mut target = watcher(1);

        let te: &'static mut TimeEvt = unsafe { &mut *core::ptr::addr_of_mut!(TE) };
        wheel.arm(te, 1, 1);

        let pools = crate::pool::EpoolRegistry::<{ aof_abi::MAX_EPOOL }>::new();
        let mut ready = PrioritySet64::new();
        for _ in 0..4 {
            let mut registry: [Option<&mut dyn AoHandle>; 2] = [None, Some(&mut target)];
            wheel.tick_x(0, &mut registry, &mut ready);
            drop(registry);
            while !target.queue_is_empty() {
                target.run_to_completion(&pools);
            }
        }
        assert_eq!(target.fires, 4);
    }

    #[test]
    fn disarm_before_expiry_suppresses_firing() {
        static mut TE: TimeEvt = TimeEvt::new(USER_SIG, 0, 0);
        let mut wheel: TimeWheel<1> = TimeWheel::new();
        let mut target = watcher(1);

        let te: &'static mut TimeEvt = unsafe { &mut *core::ptr::addr_of_mut!(TE) };
        wheel.arm(te, 2, 0);
        let te2: &mut TimeEvt = unsafe { &mut *core::ptr::addr_of_mut!(TE) };
        assert!(wheel.disarm(te2));
        // disarming twice is harmless
        assert!(!wheel.disarm(te2));

        let pools = crate::pool::EpoolRegistry::<{ aof_abi::MAX_EPOOL }>::new();
        let mut registry: [Option<&mut dyn AoHandle>; 2] = [None, Some(&mut target)];
        let mut ready = PrioritySet64::new();
        wheel.tick_x(0, &mut registry, &mut ready);
        wheel.tick_x(0, &mut registry, &mut ready);
        drop(registry);
        assert!(ready.find_max().is_none());
        while !target.queue_is_empty() {
            target.run_to_completion(&pools);
        }
        assert_eq!(target.fires, 0);
    }
}
