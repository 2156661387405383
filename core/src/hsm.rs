//! Hierarchical state machine engine.
//!
//! Modeled in Rust idiom on the tagged-enum transition-result design note
//! (spec §9) rather than the original's side-channel `QState`/`m_temp.fun`
//! protocol: a state handler returns an [`Outcome`] that names its next
//! handler directly, so the engine never needs a hidden field to smuggle a
//! transition target out of a function call.
//!
//! A state's superstate is still discovered the original way: probing the
//! handler with the reserved [`EMPTY_SIG`] event. A well-formed handler
//! never matches that signal explicitly, so it falls through to its
//! default arm, which returns `Outcome::Super(parent)` — this is exactly
//! how the original's `QHsm` walks ancestor chains for the LCA computation,
//! just without needing a dedicated "get superstate" virtual call.

use aof_abi::event::Event;
use aof_abi::signal::{EMPTY_SIG, ENTRY_SIG, EXIT_SIG, INIT_SIG};
use aof_abi::MAX_NEST_DEPTH;

/// A state handler: given the extended state and an event, decides
/// whether it handled the event, delegates to a superstate, or
/// transitions.
pub type Handler<T> = fn(&mut T, &Event) -> Outcome<T>;

/// Result of a state handler's reaction to an event.
pub enum Outcome<T> {
    /// The event was handled; no transition.
    Handled,
    /// The event was not recognized by this state or any of its
    /// ancestors; contract violation at the framework boundary.
    Unhandled,
    /// Take a transition to `target`.
    Tran(Handler<T>),
    /// Delegate to the superstate `parent` (re-dispatch the same event
    /// there).
    Super(Handler<T>),
}

// Manual impls: `#[derive(Clone, Copy)]` would require `T: Clone`/`Copy`,
// but a fn pointer is Copy regardless of its argument types.
impl<T> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Outcome<T> {}

/// The ultimate root superstate. Handles every signal, including the
/// `EMPTY_SIG` probe, which is how ancestor-chain walks know they have
/// reached the top.
pub fn top<T>(_ext: &mut T, _e: &Event) -> Outcome<T> {
    Outcome::Handled
}

/// A type that owns an embedded [`Hsm`] over itself. Implemented by the
/// concrete active-object extended-state struct, e.g. `impl HasHsm for
/// Philo { fn hsm(&self) -> &Hsm<Philo> { &self.hsm } ... }`.
pub trait HasHsm: Sized {
    fn hsm(&self) -> &Hsm<Self>;
    fn hsm_mut(&mut self) -> &mut Hsm<Self>;
}

/// State-machine bookkeeping: just the currently active leaf handler.
/// Everything else is recomputed from the handler chain on demand, so this
/// type is tiny and `Copy`-free (a bare fn pointer).
pub struct Hsm<T> {
    state: Handler<T>,
}

impl<T> Hsm<T> {
    /// `initial` is the initial *pseudostate* handler: a function that,
    /// given the [`INIT_SIG`] init event, always returns `Outcome::Tran`
    /// to the real top-level state. It is never itself entered.
    pub const fn new(initial: Handler<T>) -> Self {
        Self { state: initial }
    }

    /// The currently active leaf state, once the machine has been
    /// initialized.
    pub fn current(&self) -> Handler<T> {
        self.state
    }
}

fn ancestor_chain<T: HasHsm>(
    ext: &mut T,
    start: Handler<T>,
) -> ([Handler<T>; MAX_NEST_DEPTH], usize) {
    let mut chain = [top::<T> as Handler<T>; MAX_NEST_DEPTH];
    let mut len = 0;
    let mut handler = start;
    let probe = Event::new_static(EMPTY_SIG);
    loop {
        aof_sync::require!(len < MAX_NEST_DEPTH, "HSM nesting exceeds MAX_NEST_DEPTH");
        chain[len] = handler;
        len += 1;
        match handler(ext, &probe) {
            Outcome::Super(parent) => handler = parent,
            _ => break,
        }
    }
    (chain, len)
}

/// Index of the first handler in `leaf_chain[skip..]` that also occurs in
/// `target_chain`, paired with its index there. `skip` is 1 for a
/// self-transition (target equals the state that issued it), forcing the
/// search past the state itself so it exits and re-enters rather than
/// being treated as its own ancestor.
fn least_common_ancestor<T: HasHsm>(
    leaf_chain: &[Handler<T>],
    leaf_len: usize,
    target_chain: &[Handler<T>],
    target_len: usize,
    skip: usize,
) -> (usize, usize)
where
    Handler<T>: PartialEq,
{
    for i in skip..leaf_len {
        for j in 0..target_len {
            if leaf_chain[i] == target_chain[j] {
                return (i, j);
            }
        }
    }
    (leaf_len, target_len)
}

fn enter_chain<T: HasHsm>(ext: &mut T, chain: &[Handler<T>], count: usize) {
    let entry = Event::new_static(ENTRY_SIG);
    for i in (0..count).rev() {
        let _ = chain[i](ext, &entry);
    }
}

fn exit_chain<T: HasHsm>(ext: &mut T, chain: &[Handler<T>], count: usize) {
    let exit = Event::new_static(EXIT_SIG);
    for handler in chain.iter().take(count) {
        let _ = handler(ext, &exit);
    }
}

/// Runs the nested-initial-transition loop starting at `entered`, which
/// has already had its own entry action executed. Descends through
/// successive `Outcome::Tran` results from `INIT_SIG`, entering each new
/// level, until a state's init handling reports `Handled` (a true leaf).
fn drill_init<T: HasHsm>(ext: &mut T, mut entered: Handler<T>) -> Handler<T> {
    let init = Event::new_static(INIT_SIG);
    loop {
        match entered(ext, &init) {
            Outcome::Tran(target) => {
                let (chain, len) = ancestor_chain(ext, target);
                // `entered` is chain[len-1]'s child in the composite we
                // just descended from; enter everything between it and
                // `target`, exclusive of `entered` itself (already active).
                let mut enter_count = len;
                for (idx, handler) in chain.iter().enumerate().take(len) {
                    if *handler == entered {
                        enter_count = idx;
                        break;
                    }
                }
                enter_chain(ext, &chain, enter_count);
                entered = target;
            }
            _ => break,
        }
    }
    entered
}

/// Runs the top-level initial transition. `ie` is the application's init
/// event (commonly carrying setup parameters); `Hsm::new`'s `initial`
/// handler must react to it with `Outcome::Tran`.
pub fn init<T: HasHsm>(ext: &mut T, ie: &Event) {
    let pseudostate = ext.hsm().state;
    match pseudostate(ext, ie) {
        Outcome::Tran(target) => {
            let (chain, len) = ancestor_chain(ext, target);
            enter_chain(ext, &chain, len);
            let leaf = drill_init(ext, target);
            ext.hsm_mut().state = leaf;
        }
        _ => aof_sync::require!(false, "initial pseudostate must transition"),
    }
}

/// Dispatches `e` to the currently active state, bubbling unhandled
/// events up the superstate chain and executing a full exit/LCA/entry
/// sequence on a transition.
///
/// A transition's LCA is computed against its *source* — the handler that
/// actually returned `Outcome::Tran`, which may be a superstate of the
/// current leaf if the leaf itself delegated via `Outcome::Super` — not
/// against the leaf directly. Exiting only applies `LCA(leaf, target)`
/// would skip the exit/entry of every state between the leaf and the
/// source whenever they happen to stay on the target's ancestor chain.
pub fn dispatch<T: HasHsm>(ext: &mut T, e: &Event) {
    let leaf = ext.hsm().state;
    let mut handler = leaf;
    let (outcome, source) = loop {
        match handler(ext, e) {
            Outcome::Super(parent) => handler = parent,
            other => break (other, handler),
        }
    };

    let target = match outcome {
        Outcome::Tran(target) => target,
        _ => return,
    };

    let (leaf_chain, leaf_len) = ancestor_chain(ext, leaf);
    let source_idx = leaf_chain[..leaf_len]
        .iter()
        .position(|h| *h == source)
        .expect("transition source must lie on the dispatched leaf's ancestor chain");

    // Exit from the leaf up to (but not including) the source: these
    // states bubbled the event via `Outcome::Super` without reacting to
    // it, so they play no part in the LCA walk below and always exit.
    exit_chain(ext, &leaf_chain, source_idx);

    let (target_chain, target_len) = ancestor_chain(ext, target);
    let self_transition = target == source;
    let skip = if self_transition { 1 } else { 0 };
    let source_chain = &leaf_chain[source_idx..leaf_len];
    let (exit_count, entry_count) = least_common_ancestor(
        source_chain,
        leaf_len - source_idx,
        &target_chain,
        target_len,
        skip,
    );

    exit_chain(ext, source_chain, exit_count);
    enter_chain(ext, &target_chain, entry_count);

    let leaf = drill_init(ext, target);
    ext.hsm_mut().state = leaf;
}
