//! Signal identifiers.
//!
//! A [`Signal`] names the reason an [`crate::event::Event`] was raised. The
//! low-valued signals below are reserved pseudo-signals the HSM engine
//! dispatches internally; application signals start at [`USER_SIG`].

pub type Signal = u16;

/// Probe signal used to walk a state's superstate chain without invoking
/// any real behavior. A well-formed state handler never reacts to this
/// signal explicitly; it falls through to the default arm, which reports
/// the superstate.
pub const EMPTY_SIG: Signal = 0;

/// Delivered when a state is entered during a transition.
pub const ENTRY_SIG: Signal = 1;

/// Delivered when a state is exited during a transition.
pub const EXIT_SIG: Signal = 2;

/// Delivered to drive a nested initial transition, both for the top-level
/// `Hsm::init` call and for every initial pseudostate reached while
/// descending into a composite target state.
pub const INIT_SIG: Signal = 3;

/// First signal value available to application code.
pub const USER_SIG: Signal = 4;
