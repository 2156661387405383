//! The `Framework` singleton: the external surface an application and its
//! BSP drive, tying the independently-testable pieces (pools, queues,
//! pub-sub, timers, scheduler) into the one entry point the original
//! exposes as static `QF::` methods.
//!
//! Grounded in `core/src/scheduler/scheduler.rs`'s top-level `Scheduler`
//! struct, which plays the same role for `slopos`: one owned object the
//! rest of the crate's free functions are threaded through rather than a
//! scattering of global statics.

use aof_abi::event::{Event, PoolId, Priority};
use aof_abi::signal::Signal;
use aof_abi::MPoolCtr;

use crate::ao::AoHandle;
use crate::equeue::Margin;
use crate::gc;
use crate::pool::{EpoolRegistry, ErasedPool, EventPayload, EventPool};
use crate::pubsub::{self, SubscriberLists};
use crate::sched::{self, OnIdle, Scheduler, SchedulerStats};
use crate::timer::TimeWheel;

/// Crate version string, surfaced the way `QF::getVersion()` reports the
/// original's build version.
pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Registers the BSP's critical-section backend. Must be called before
/// [`Framework::run`] if the default single-core no-op is not suitable.
pub fn register_critical_section(
    enter: aof_sync::critical_section::EnterFn,
    exit: aof_sync::critical_section::ExitFn,
) {
    aof_sync::critical_section::register_backend(enter, exit);
}

/// Registers the BSP's diagnostic-log sink.
pub fn register_trace_backend(backend: aof_sync::trace::Backend) {
    aof_sync::trace::register_backend(backend);
}

/// Registers the BSP's contract-violation hook.
pub fn register_assert_hook(hook: aof_sync::contract::AssertHook) {
    aof_sync::contract::register_hook(hook);
}

/// The whole framework: event pools, publish-subscribe subscriber lists
/// (sized for `MAX_SIGNAL` distinct signals), the time-event wheel, and
/// the active-object scheduler selected at build time by the `sched-coop`
/// / `sched-qk` Cargo features.
///
/// `'a` is the lifetime of the active objects registered with
/// [`Framework::start`]; applications typically hold them as `'static`
/// values, matching the original's expectation that `QActive` instances
/// outlive `QF::run()`.
pub struct Framework<'a, const MAX_SIGNAL: usize> {
    scheduler: Scheduler<'a>,
    pools: EpoolRegistry<{ aof_abi::MAX_EPOOL }>,
    subscribers: SubscriberLists<MAX_SIGNAL>,
    wheel: TimeWheel,
}

impl<'a, const MAX_SIGNAL: usize> Framework<'a, MAX_SIGNAL> {
    /// Builds a fresh framework instance, matching `QF::init()`: all
    /// registries start empty and the scheduler is idle.
    pub const fn init() -> Self {
        Self {
            scheduler: Scheduler::new(),
            pools: EpoolRegistry::new(),
            subscribers: SubscriberLists::new(),
            wheel: TimeWheel::new(),
        }
    }

    /// Clears every subscriber list, matching `QF::psInit`. Rarely needed
    /// outside tests since [`Self::init`] already starts empty.
    pub fn ps_init(&mut self) {
        self.subscribers = SubscriberLists::new();
    }

    /// Registers a fixed-block event pool, matching `QF::poolInit`. Pools
    /// must be registered in ascending block-size order, smallest first,
    /// the same discipline the original's `newX_` relies on.
    pub fn pool_init(&mut self, pool: &'static dyn ErasedPool) {
        self.pools.register(pool);
    }

    /// Allocates a dynamic event from `pool`, tagging it with that pool's
    /// id so [`Self::gc`] can later recycle it without knowing `T`.
    /// Mirrors `QF::newX_`'s margin contract: `Margin::Bare` trips the
    /// assert hook on exhaustion, `Margin::AtLeast(n)` returns `None`
    /// instead if fewer than `n` blocks would remain free.
    pub fn new_x<T: EventPayload, const N: usize>(
        &self,
        pool: &'static EventPool<T, N>,
        value: T,
        margin: Margin,
    ) -> Option<*mut T> {
        let free_before = pool.free_count();
        let ok = match margin {
            Margin::Bare => free_before > 0,
            Margin::AtLeast(m) => (free_before as u32) > (m as u32),
        };
        aof_sync::require!(
            !matches!(margin, Margin::Bare) || ok,
            "dynamic event pool exhausted"
        );
        if !ok {
            return None;
        }
        pool.alloc(value)
    }

    /// Registers `ao` at `priority`, matching `QActive::start`.
    pub fn start(&mut self, priority: Priority, ao: &'a mut dyn AoHandle) {
        self.scheduler.start(priority, ao);
    }

    /// Deregisters the active object at `priority`.
    pub fn stop_active(&mut self, priority: Priority) {
        self.scheduler.stop(priority);
    }

    pub fn register_on_idle(&mut self, on_idle: OnIdle) {
        self.scheduler.register_on_idle(on_idle);
    }

    pub fn stats(&self) -> &SchedulerStats {
        self.scheduler.stats()
    }

    /// Posts `e` to the active object registered at `priority`.
    pub fn post(&mut self, priority: Priority, e: *const Event, margin: Margin) -> bool {
        self.scheduler.post(priority, e, margin, &self.pools)
    }

    /// Subscribes the active object at `priority` to `signal`.
    pub fn subscribe(&mut self, signal: Signal, priority: Priority) {
        self.subscribers.subscribe(signal, priority);
    }

    pub fn unsubscribe(&mut self, signal: Signal, priority: Priority) {
        self.subscribers.unsubscribe(signal, priority);
    }

    pub fn unsubscribe_all(&mut self, priority: Priority) {
        self.subscribers.unsubscribe_all(priority);
    }

    /// Publishes `e` to every subscriber of its signal, matching
    /// `QF::publish`.
    pub fn publish(&mut self, e: *const Event) {
        let (registry, ready) = self.scheduler.registry_and_ready_mut();
        pubsub::publish(e, &self.subscribers, registry, ready, &self.pools);
    }

    /// Advances tick rate `tick_rate` by one tick, firing any time events
    /// due this tick, matching `QF::tickX`.
    pub fn tick_x(&mut self, tick_rate: u8) {
        let (registry, ready) = self.scheduler.registry_and_ready_mut();
        self.wheel.tick_x(tick_rate, registry, ready);
    }

    /// Drops `e`'s reference count and frees it back to its pool if that
    /// was the last reference, matching `QF::gc`.
    pub fn gc(&mut self, e: *const Event) {
        gc::gc(e, &self.pools);
    }

    /// Low-water mark for pool `pool_id`, matching `QF::getPoolMin`.
    /// Requesting the minimum of a pool that was never registered is a
    /// contract violation, matching the original's documented assertion.
    pub fn get_pool_min(&self, pool_id: PoolId) -> MPoolCtr {
        match self.pools.min_free(pool_id) {
            Some(min) => min,
            None => aof_sync::contract::fail(module_path!(), line!()),
        }
    }

    /// Low-water mark for the queue of the active object registered at
    /// `priority`, matching `QF::getQueueMin`. Requesting the minimum of a
    /// priority with no registered active object is a contract violation.
    pub fn get_queue_min(&mut self, priority: Priority) -> aof_abi::EQueueCtr {
        match self.scheduler.registry_mut()[priority as usize].as_mut() {
            Some(ao) => ao.queue_min_free(),
            None => aof_sync::contract::fail(module_path!(), line!()),
        }
    }

    /// Runs the scheduler until [`Self::request_stop`] is called, matching
    /// `QF::run`.
    pub fn run(&mut self) {
        self.scheduler.run(&self.pools);
    }

    pub fn request_stop(&mut self) {
        self.scheduler.request_stop();
    }

    pub fn highest_priority(&self) -> Priority {
        sched::highest_priority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ao::{AoCore, HasAoCore};
    use crate::hsm::{self as hsm_mod, HasHsm, Hsm, Outcome};
    use aof_abi::signal::{INIT_SIG, USER_SIG};

    struct Relay {
        hsm: Hsm<Relay>,
        core: AoCore<4>,
        received: u32,
    }

    impl HasHsm for Relay {
        fn hsm(&self) -> &Hsm<Self> {
            &self.hsm
        }
        fn hsm_mut(&mut self) -> &mut Hsm<Self> {
            &mut self.hsm
        }
    }

    impl HasAoCore<4> for Relay {
        fn ao_core(&self) -> &AoCore<4> {
            &self.core
        }
        fn ao_core_mut(&mut self) -> &mut AoCore<4> {
            &mut self.core
        }
    }

    fn initial(_r: &mut Relay, _e: &Event) -> Outcome<Relay> {
        Outcome::Tran(ready)
    }

    fn ready(r: &mut Relay, e: &Event) -> Outcome<Relay> {
        match e.signal {
            USER_SIG => {
                r.received += 1;
                Outcome::Handled
            }
            _ => Outcome::Super(hsm_mod::top),
        }
    }

    fn relay(priority: u8) -> Relay {
        let mut r = Relay {
            hsm: Hsm::new(initial),
            core: AoCore::new(priority),
            received: 0,
        };
        hsm_mod::init(&mut r, &Event::new_static(INIT_SIG));
        r
    }

    #[test]
    fn publish_through_framework_reaches_subscriber() {
        let mut fw: Framework<8> = Framework::init();
        let mut r = relay(1);
        fw.start(1, &mut r);
        fw.subscribe(USER_SIG, 1);

        let e = Event::new_static(USER_SIG);
        fw.publish(&e as *const Event);
        drop(fw);
        r.run_to_completion(&EpoolRegistry::<{ aof_abi::MAX_EPOOL }>::new());
        assert_eq!(r.received, 1);
    }

    #[test]
    fn get_version_returns_nonempty_string() {
        assert!(!get_version().is_empty());
    }

    #[repr(C)]
    struct Ping {
        event: Event,
        n: u32,
    }

    impl crate::pool::EventPayload for Ping {
        fn event(&self) -> &Event {
            &self.event
        }
        fn event_mut(&mut self) -> &mut Event {
            &mut self.event
        }
    }

    #[test]
    #[should_panic]
    fn new_x_with_bare_margin_asserts_on_exhaustion() {
        static POOL: EventPool<Ping, 1> = EventPool::new(1);
        let fw: Framework<4> = Framework::init();
        let ping = |n| Ping {
            event: Event::new_static(USER_SIG),
            n,
        };
        assert!(fw.new_x(&POOL, ping(1), Margin::Bare).is_some());
        fw.new_x(&POOL, ping(2), Margin::Bare);
    }

    #[test]
    fn new_x_with_at_least_margin_returns_none_instead_of_asserting() {
        static POOL: EventPool<Ping, 1> = EventPool::new(2);
        let fw: Framework<4> = Framework::init();
        let ping = |n| Ping {
            event: Event::new_static(USER_SIG),
            n,
        };
        assert!(fw.new_x(&POOL, ping(1), Margin::Bare).is_some());
        assert!(fw
            .new_x(&POOL, ping(2), Margin::AtLeast(0))
            .is_none());
    }
}
