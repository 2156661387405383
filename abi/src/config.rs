//! Compile-time configuration constants.
//!
//! Mirrors `QF_MAX_ACTIVE`, `QF_MAX_EPOOL`, `QF_MAX_TICK_RATE`, and the
//! counter-width typedefs from the original QP/C++ `qf_port.h`. Counter
//! widths are chosen with Cargo features on this crate; 16-bit counters are
//! the default, matching the original's defaults.

/// Highest usable active-object priority. Priorities run `1..=MAX_ACTIVE`;
/// priority 0 is reserved and never assigned.
pub const MAX_ACTIVE: u8 = 63;

/// Maximum number of fixed-block event pools `EpoolRegistry` can hold.
pub const MAX_EPOOL: usize = 3;

/// Number of independent tick-rate channels the time-event wheel maintains.
pub const MAX_TICK_RATE: usize = 1;

/// Bound on HSM nesting depth (composite-state chain length) the
/// ancestor-chain walk will record. Matches the original's `QHSM_MAX_NEST_DEPTH`.
pub const MAX_NEST_DEPTH: usize = 8;

macro_rules! width_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[cfg(feature = "ctr-width-32")]
        pub type $name = u32;
        $(#[$meta])*
        #[cfg(all(feature = "ctr-width-8", not(feature = "ctr-width-32")))]
        pub type $name = u8;
        $(#[$meta])*
        #[cfg(not(any(feature = "ctr-width-8", feature = "ctr-width-32")))]
        pub type $name = u16;
    };
}

width_type!(
    /// Width of the dynamic event's internal size/ref-count bookkeeping
    /// as stored by a pool. (`QF_EVENT_SIZ_SIZE`)
    EventSize
);
width_type!(
    /// Width of a time event's countdown/interval counters. (`QF_TIMEEVT_CTR_SIZE`)
    TimeEvtCtr
);
width_type!(
    /// Width of an event queue's free-slot counter. (`QF_EQUEUE_CTR_SIZE`)
    EQueueCtr
);
width_type!(
    /// Width of a fixed-block pool's free-block counter. (`QF_MPOOL_CTR_SIZE`)
    MPoolCtr
);
width_type!(
    /// Width of a fixed-block pool's block-size counter. (`QF_MPOOL_SIZ_SIZE`)
    MPoolSiz
);
