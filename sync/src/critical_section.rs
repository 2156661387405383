//! Critical-section abstraction.
//!
//! The framework core never hard-codes an ISA-specific `cli`/`sti` pair;
//! the BSP registers a backend once at startup and every internal lock
//! acquires through it. This mirrors the backend-pointer pattern used for
//! the logging backend (`trace::register_backend`) rather than inlining
//! architecture asm, since the interrupt controller is an out-of-scope
//! external collaborator.
//!
//! The default backend is a single-core no-op so the crate builds and its
//! tests run under a hosted `std` target without any BSP registered.

use core::sync::atomic::{AtomicPtr, Ordering};

/// Enters a critical section, returning an opaque token that must be
/// passed back to the matching `exit`. On real hardware this is normally
/// the saved interrupt-enable flags.
pub type EnterFn = fn() -> u32;
/// Leaves a critical section, restoring the state captured by `enter`.
pub type ExitFn = fn(u32);

fn noop_enter() -> u32 {
    0
}

fn noop_exit(_token: u32) {}

static ENTER: AtomicPtr<()> = AtomicPtr::new(noop_enter as *mut ());
static EXIT: AtomicPtr<()> = AtomicPtr::new(noop_exit as *mut ());

/// Registers the BSP's critical-section backend. Call once during startup,
/// before any active object is started.
pub fn register_backend(enter: EnterFn, exit: ExitFn) {
    ENTER.store(enter as *mut (), Ordering::Release);
    EXIT.store(exit as *mut (), Ordering::Release);
}

fn enter() -> u32 {
    let ptr = ENTER.load(Ordering::Acquire);
    // SAFETY: only ever stored from `register_backend` with a value cast
    // from a real `EnterFn`, never from arbitrary data.
    let f: EnterFn = unsafe { core::mem::transmute(ptr) };
    f()
}

fn exit(token: u32) {
    let ptr = EXIT.load(Ordering::Acquire);
    // SAFETY: see `enter`.
    let f: ExitFn = unsafe { core::mem::transmute(ptr) };
    f(token)
}

/// RAII critical-section guard. Enters on construction, exits on drop,
/// matching `IrqMutexGuard`'s save-on-enter / restore-on-drop shape.
#[must_use]
pub struct CriticalSection {
    token: u32,
}

impl CriticalSection {
    /// Enters a new critical section.
    pub fn enter() -> Self {
        Self { token: enter() }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        exit(self.token);
    }
}

/// Runs `f` with the critical section held, restoring it on every exit
/// path including unwinding.
pub fn with<R>(f: impl FnOnce() -> R) -> R {
    let _guard = CriticalSection::enter();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static ENTERED: AtomicU32 = AtomicU32::new(0);
    static EXITED: AtomicU32 = AtomicU32::new(0);

    fn counting_enter() -> u32 {
        ENTERED.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn counting_exit(_token: u32) {
        EXITED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn default_backend_is_noop() {
        let guard = CriticalSection::enter();
        drop(guard);
    }

    #[test]
    fn with_runs_closure_and_restores() {
        register_backend(counting_enter, counting_exit);
        let before = EXITED.load(Ordering::SeqCst);
        let result = with(|| 7);
        assert_eq!(result, 7);
        assert_eq!(EXITED.load(Ordering::SeqCst), before + 1);
        register_backend(noop_enter, noop_exit);
    }
}
