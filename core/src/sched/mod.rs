//! Scheduler bodies. Exactly one of `sched-coop` (default) / `sched-qk` is
//! compiled in, selected by Cargo feature, mirroring how `slopos` gates
//! kernel subsystems behind features in its root `Cargo.toml`.

#[cfg(all(feature = "sched-coop", feature = "sched-qk"))]
compile_error!("features `sched-coop` and `sched-qk` are mutually exclusive");

#[cfg(not(any(feature = "sched-coop", feature = "sched-qk")))]
compile_error!("exactly one of `sched-coop` or `sched-qk` must be enabled");

use core::sync::atomic::{AtomicU32, Ordering};

use aof_abi::event::Priority;
use aof_abi::MAX_ACTIVE;

use crate::ao::AoHandle;

pub type Registry<'a> = [Option<&'a mut dyn AoHandle>; MAX_ACTIVE as usize + 1];

/// Called when no active object has a ready event. The BSP typically
/// halts the core (`wfi`/`hlt`) here; the default does nothing, suitable
/// for host tests that just want the loop to return once idle.
pub type OnIdle = fn();

pub(crate) fn default_on_idle() {}

/// Lightweight scheduler counters, grounded in
/// `core/src/scheduler/per_cpu.rs`'s `SchedulerStats` — ambient
/// observability carried alongside the scheduler regardless of the BSP's
/// own trace emitter.
#[derive(Default)]
pub struct SchedulerStats {
    schedule_calls: AtomicU32,
    dispatches: AtomicU32,
    idle_calls: AtomicU32,
}

impl SchedulerStats {
    pub const fn new() -> Self {
        Self {
            schedule_calls: AtomicU32::new(0),
            dispatches: AtomicU32::new(0),
            idle_calls: AtomicU32::new(0),
        }
    }

    pub fn schedule_calls(&self) -> u32 {
        self.schedule_calls.load(Ordering::Relaxed)
    }

    pub fn dispatches(&self) -> u32 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn idle_calls(&self) -> u32 {
        self.idle_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn record_schedule(&self) {
        self.schedule_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_idle(&self) {
        self.idle_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Priority a registry slot is valid at; used to bound loops over the
/// fixed-size registry array without scanning past `MAX_ACTIVE`.
pub const fn highest_priority() -> Priority {
    MAX_ACTIVE
}

#[cfg(feature = "sched-coop")]
pub mod vanilla;
#[cfg(feature = "sched-coop")]
pub use vanilla::Vanilla as Scheduler;

#[cfg(feature = "sched-qk")]
pub mod qk;
#[cfg(feature = "sched-qk")]
pub use qk::Qk as Scheduler;
