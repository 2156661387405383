//! Single-assignment lazy cell, adapted from the teacher's kernel-native
//! `OnceLock` (which itself replaces the external `spin` crate for this
//! purpose). Available to applications that want to lazily construct a
//! process-lifetime value (a BSP-provided collaborator, a static lookup
//! table) without requiring `std::sync::Once`; `aof_core::Framework` itself
//! is a plain owned value rather than a lazy global, per the framework
//! state design note (a single owned object passed as context).

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const STATE_UNINIT: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_COMPLETE: u8 = 2;

pub struct OnceLock<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: access to `value` is gated by `state`, which only ever
// transitions UNINIT -> RUNNING -> COMPLETE under a compare-exchange; a
// reader never observes the cell until COMPLETE is visible.
unsafe impl<T: Send> Sync for OnceLock<T> {}

impl<T> OnceLock<T> {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Returns the initialized value, running `init` exactly once if this
    /// is the first call. Concurrent callers during initialization spin
    /// until the winner completes.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        loop {
            match self.state.compare_exchange(
                STATE_UNINIT,
                STATE_RUNNING,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // SAFETY: we hold the unique RUNNING state; no other
                    // caller may write `value` until we store COMPLETE.
                    unsafe { (*self.value.get()).write(init()) };
                    self.state.store(STATE_COMPLETE, Ordering::Release);
                    break;
                }
                Err(STATE_COMPLETE) => break,
                Err(_) => core::hint::spin_loop(),
            }
        }
        // SAFETY: state is COMPLETE, so `value` was written and is never
        // mutated again.
        unsafe { (*self.value.get()).assume_init_ref() }
    }

    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == STATE_COMPLETE {
            // SAFETY: see `get_or_init`.
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }
}

impl<T> Default for OnceLock<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_once() {
        static CELL: OnceLock<u32> = OnceLock::new();
        assert_eq!(CELL.get(), None);
        assert_eq!(*CELL.get_or_init(|| 42), 42);
        assert_eq!(*CELL.get_or_init(|| 99), 42);
        assert_eq!(CELL.get(), Some(&42));
    }
}
