//! Cooperative ("vanilla") scheduler.
//!
//! A direct port of `qf/source/qvanilla.cpp`'s `QF::run()`, generalized to
//! Rust control flow and grounded stylistically in
//! `core/src/scheduler/scheduler.rs`'s `schedule()`/`schedule_internal()`
//! shape: disable interrupts, pick the highest-ready active object,
//! dispatch one event run-to-completion, restore interrupts, repeat. When
//! nothing is ready, call the registered idle hook — this single-core,
//! single-thread model never preempts; an active object always runs its
//! current event to completion before the next `run()` iteration picks
//! again.

use aof_sync::critical_section::CriticalSection;
use aof_sync::pset::PrioritySet64;

use crate::ao::AoHandle;
use crate::equeue::Margin;
use crate::pool::EpoolRegistry;
use aof_abi::event::{Event, Priority};

use super::{default_on_idle, OnIdle, Registry, SchedulerStats};

pub struct Vanilla<'a> {
    registry: Registry<'a>,
    ready: PrioritySet64,
    on_idle: OnIdle,
    running: bool,
    stats: SchedulerStats,
}

impl<'a> Vanilla<'a> {
    pub const fn new() -> Self {
        Self {
            registry: [const { None }; aof_abi::MAX_ACTIVE as usize + 1],
            ready: PrioritySet64::new(),
            on_idle: default_on_idle,
            running: false,
            stats: SchedulerStats::new(),
        }
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn register_on_idle(&mut self, on_idle: OnIdle) {
        self.on_idle = on_idle;
    }

    /// Registers an active object at `priority`, matching `QActive::start`.
    /// Priority must be unique; re-registering an occupied priority is a
    /// contract violation.
    pub fn start(&mut self, priority: Priority, ao: &'a mut dyn AoHandle) {
        aof_sync::require!(
            self.registry[priority as usize].is_none(),
            "priority already registered"
        );
        self.registry[priority as usize] = Some(ao);
    }

    pub fn stop(&mut self, priority: Priority) {
        self.registry[priority as usize] = None;
        self.ready.remove(priority);
    }

    /// Posts `e` to the active object at `priority` and marks it ready.
    /// `pools` is unused here (the cooperative scheduler never runs a
    /// step inline from `post`) but the parameter is kept to match
    /// [`super::qk::Qk::post`]'s signature, since both are reached through
    /// the shared `Scheduler` type alias.
    pub fn post(
        &mut self,
        priority: Priority,
        e: *const Event,
        margin: Margin,
        _pools: &EpoolRegistry<{ aof_abi::MAX_EPOOL }>,
    ) -> bool {
        let _cs = CriticalSection::enter();
        let ok = match self.registry[priority as usize].as_deref_mut() {
            Some(ao) => ao.post_fifo_dyn(e, margin),
            None => false,
        };
        if ok {
            self.ready.insert(priority);
        }
        ok
    }

    pub fn registry_mut(&mut self) -> &mut Registry<'a> {
        &mut self.registry
    }

    pub fn ready_mut(&mut self) -> &mut PrioritySet64 {
        &mut self.ready
    }

    /// Splits off disjoint mutable borrows of the registry and ready set,
    /// for callers (timer `tick_x`, pub-sub `publish`) that post into an
    /// active object's queue directly and must mark it ready themselves
    /// without going through [`Self::post`].
    pub fn registry_and_ready_mut(&mut self) -> (&mut Registry<'a>, &mut PrioritySet64) {
        (&mut self.registry, &mut self.ready)
    }

    pub fn request_stop(&mut self) {
        self.running = false;
    }

    /// Runs one schedule step: dispatches a single event from the
    /// highest-priority ready active object, or calls the idle hook if
    /// none is ready. Returns whether work was done (useful for tests
    /// that want to drain the system without an idle hook tripping an
    /// infinite loop).
    pub fn step(&mut self, pools: &EpoolRegistry<{ aof_abi::MAX_EPOOL }>) -> bool {
        self.stats.record_schedule();
        let prio = {
            let _cs = CriticalSection::enter();
            self.ready.find_max()
        };
        match prio {
            Some(p) => {
                if let Some(ao) = self.registry[p as usize].as_deref_mut() {
                    ao.run_to_completion(pools);
                    let _cs = CriticalSection::enter();
                    if ao.queue_is_empty() {
                        self.ready.remove(p);
                    }
                }
                self.stats.record_dispatch();
                true
            }
            None => {
                (self.on_idle)();
                self.stats.record_idle();
                false
            }
        }
    }

    /// Runs until [`Self::request_stop`] is called.
    pub fn run(&mut self, pools: &EpoolRegistry<{ aof_abi::MAX_EPOOL }>) {
        self.running = true;
        while self.running {
            self.step(pools);
        }
    }
}

impl<'a> Default for Vanilla<'a> {
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

    struct Worker {
        hsm: Hsm<Worker>,
        core: AoCore<4>,
        done: u32,
    }

    impl HasHsm for Worker {
        fn hsm(&self) -> &Hsm<Self> {
            &self.hsm
        }
        fn hsm_mut(&mut self) -> &mut Hsm<Self> {
            &mut self.hsm
        }
    }

    impl HasAoCore<4> for Worker {
        fn ao_core(&self) -> &AoCore<4> {
            &self.core
        }
        fn ao_core_mut(&mut self) -> &mut AoCore<4> {
            &mut self.core
        }
    }

    fn initial(_w: &mut Worker, _e: &Event) -> Outcome<Worker> {
        Outcome::Tran(ready)
    }

    fn ready(w: &mut Worker, e: &Event) -> Outcome<Worker> {
        match e.signal {
            USER_SIG => {
                w.done += 1;
                Outcome::Handled
            }
            _ => Outcome::Super(hsm::top),
        }
    }

    fn worker() -> Worker {
        let mut w = Worker {
            hsm: Hsm::new(initial),
            core: AoCore::new(1),
            done: 0,
        };
        hsm::init(&mut w, &Event::new_static(INIT_SIG));
        w
    }

    #[test]
    fn picks_highest_priority_ready_first() {
        let mut low = worker();
        let mut high = worker();
        let mut sched = Vanilla::new();
        sched.start(1, &mut low);
        sched.start(2, &mut high);

        let pools: EpoolRegistry<{ aof_abi::MAX_EPOOL }> = EpoolRegistry::new();
        let e = Event::new_static(USER_SIG);
        sched.post(1, &e as *const Event, Margin::Bare, &pools);
        sched.post(2, &e as *const Event, Margin::Bare, &pools);

        assert!(sched.step(&pools));
        drop(sched);
        assert_eq!(high.done, 1);
        assert_eq!(low.done, 0);
    }

    #[test]
    fn idle_hook_runs_when_nothing_ready() {
        static CALLS: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(0);
        fn on_idle() {
            CALLS.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        }

        let mut sched = Vanilla::new();
        sched.register_on_idle(on_idle);
        let pools: EpoolRegistry<{ aof_abi::MAX_EPOOL }> = EpoolRegistry::new();
        assert!(!sched.step(&pools));
        assert_eq!(CALLS.load(core::sync::atomic::Ordering::Relaxed), 1);
    }
}
