//! Internal diagnostic logging.
//!
//! Modeled on `klog.rs`'s swappable-backend design: a global level filter
//! plus a registered backend function pointer. This is the framework's own
//! diagnostic log, not a replacement for a BSP's QS-style trace-record
//! emitter (that stays an external collaborator). The default backend is a
//! null sink so tests run silently.

use core::fmt;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl Level {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

pub type Backend = fn(fmt::Arguments<'_>);

static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static BACKEND: AtomicPtr<()> = AtomicPtr::new(null_backend as *mut ());

fn null_backend(_args: fmt::Arguments<'_>) {}

/// Registers the backend that receives formatted log lines.
pub fn register_backend(backend: Backend) {
    BACKEND.store(backend as *mut (), Ordering::Release);
}

/// Sets the minimum level that will reach the backend.
pub fn set_level(level: Level) {
    CURRENT_LEVEL.store(level as u8, Ordering::Release);
}

pub fn get_level() -> Level {
    Level::from_u8(CURRENT_LEVEL.load(Ordering::Acquire))
}

pub fn is_enabled(level: Level) -> bool {
    level <= get_level()
}

#[doc(hidden)]
pub fn dispatch(level: Level, args: fmt::Arguments<'_>) {
    if !is_enabled(level) {
        return;
    }
    let ptr = BACKEND.load(Ordering::Acquire);
    // SAFETY: only ever stored from `register_backend` with a value cast
    // from a real `Backend`.
    let f: Backend = unsafe { core::mem::transmute(ptr) };
    f(args);
}

#[macro_export]
macro_rules! trace_error {
    ($($arg:tt)*) => {
        $crate::trace::dispatch($crate::trace::Level::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! trace_warn {
    ($($arg:tt)*) => {
        $crate::trace::dispatch($crate::trace::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! trace_info {
    ($($arg:tt)*) => {
        $crate::trace::dispatch($crate::trace::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! trace_debug {
    ($($arg:tt)*) => {
        $crate::trace::dispatch($crate::trace::Level::Debug, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_is_info() {
        assert_eq!(get_level(), Level::Info);
        assert!(is_enabled(Level::Warn));
        assert!(!is_enabled(Level::Debug));
    }

    #[test]
    fn set_level_changes_filter() {
        set_level(Level::Trace);
        assert!(is_enabled(Level::Trace));
        set_level(Level::Info);
    }
}
