//! The event header shared by every signal payload in the framework.

use crate::signal::Signal;

/// An active-object priority. Valid range is `1..=config::MAX_ACTIVE`.
pub type Priority = u8;

/// Identifies which `EventPool` a dynamic event block was carved from.
/// `0` is reserved for events that are never pool-recycled (static events
/// and, structurally, every time event).
pub type PoolId = u8;

/// Outstanding-reference count for a pool-allocated event.
pub type RefCtr = u8;

/// Sentinel `pool_id` meaning "not pool memory, never garbage collected."
pub const STATIC_POOL_ID: PoolId = 0;

/// Event header. Application events embed this as their first field and add
/// their own payload after it, matching the original `QEvt` base-class
/// idiom via composition instead of inheritance.
///
/// `pool_id` and `ref_ctr` are plain fields, not atomics: every framework
/// path that mutates them (`new_x`, `gc`, `publish`) does so from inside a
/// critical section, exactly as the original protects `QEvt::poolId_` and
/// `QEvt::refCtr_`.
#[derive(Debug)]
#[repr(C)]
pub struct Event {
    pub signal: Signal,
    pub pool_id: PoolId,
    pub ref_ctr: RefCtr,
}

impl Event {
    /// Builds a `'static` event with no pool affiliation. Used for the
    /// framework's reserved pseudo-events (`ENTRY_SIG`/`EXIT_SIG`/etc.) and
    /// for application events that live for the life of the program.
    pub const fn new_static(signal: Signal) -> Self {
        Self {
            signal,
            pool_id: STATIC_POOL_ID,
            ref_ctr: 0,
        }
    }

    /// True once a pool has claimed this event (`pool_id != 0`).
    pub const fn is_dynamic(&self) -> bool {
        self.pool_id != STATIC_POOL_ID
    }
}
