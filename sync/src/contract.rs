//! Contract-violation handling.
//!
//! Matches the teacher's assert-heavy style (`core/src/scheduler/*.rs`):
//! violated invariants are always a programming error, never a recoverable
//! condition, so they funnel into a single registrable hook carrying
//! `(module, line)` instead of panicking with ad-hoc messages scattered
//! through the crate. Soft failures (pool exhausted, queue full) are never
//! routed here; those return `Option`/`bool`.

use core::sync::atomic::{AtomicPtr, Ordering};

/// Called with the source module name and line number of a violated
/// contract. The default hook panics; a BSP may register one that resets
/// the target instead.
pub type AssertHook = fn(module: &'static str, line: u32) -> !;

fn default_hook(module: &'static str, line: u32) -> ! {
    panic!("contract violated at {module}:{line}");
}

static HOOK: AtomicPtr<()> = AtomicPtr::new(default_hook as *mut ());

/// Registers the BSP's assertion hook.
pub fn register_hook(hook: AssertHook) {
    HOOK.store(hook as *mut (), Ordering::Release);
}

#[doc(hidden)]
pub fn fail(module: &'static str, line: u32) -> ! {
    let ptr = HOOK.load(Ordering::Acquire);
    // SAFETY: only ever stored from `register_hook` with a value cast
    // from a real `AssertHook`.
    let f: AssertHook = unsafe { core::mem::transmute(ptr) };
    f(module, line)
}

/// Panics through the registered assert hook if `cond` is false.
#[macro_export]
macro_rules! require {
    ($cond:expr) => {
        if !($cond) {
            $crate::contract::fail(module_path!(), line!());
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::contract::fail(module_path!(), line!());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicBool;

    static TRIPPED: AtomicBool = AtomicBool::new(false);

    fn recording_hook(_module: &'static str, _line: u32) -> ! {
        TRIPPED.store(true, Ordering::SeqCst);
        panic!("recorded");
    }

    #[test]
    fn require_passes_when_true() {
        require!(1 + 1 == 2);
    }

    #[test]
    #[should_panic]
    fn require_trips_hook_when_false() {
        register_hook(recording_hook);
        require!(1 == 2, "unreachable");
    }
}
