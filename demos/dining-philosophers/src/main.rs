//! Dining philosophers over the active-object framework: five philosophers
//! and a table arbitrator, each its own active object, driven entirely by
//! posted events and the cooperative scheduler. Restores the structure of
//! the original QP/C++ `dpp` example (forks arbitrated by a dedicated
//! table AO rather than per-philosopher mutexes) in this workspace's idiom.
//!
//! State handlers only ever see `&mut Self`, but posting to another active
//! object and arming a timer both need to reach shared scheduler/wheel
//! state. Rather than threading a `Framework` reference through every
//! `Handler<T>` signature, this binary follows the module-level-global
//! option the design notes call out explicitly: a file-scope `static mut`
//! scheduler, time-event wheel and pool registry, reached through small
//! accessor functions (mirroring how `QF::active_` and `QF_timeEvtHead_`
//! are themselves file-scope statics in the original).
//!
//! Arming a philosopher's own timer from inside its `ENTRY` action is safe
//! because nothing else is touching the wheel at that moment. Posting to
//! *another* active object from inside a handler is a different story: the
//! driving loop below is itself in the middle of a scheduler call when a
//! handler runs, and re-entering the same scheduler from there would hand
//! out two overlapping `&mut` views of it. So cross-active-object posting
//! is *not* done from within a handler at all: handlers only record what
//! they want to happen (a pending-hungry flag, a pending-grant flag), and
//! the driving loop in `main`, between scheduler calls, turns those flags
//! into posts. Every post in this file is therefore issued from exactly
//! one place — the top-level loop — never from nested dispatch.
use aof_abi::event::Event;
use aof_abi::signal::{INIT_SIG, USER_SIG};
use aof_core::ao::{AoCore, HasAoCore};
use aof_core::equeue::Margin;
use aof_core::hsm::{self, HasHsm, Hsm, Outcome};
use aof_core::pool::{EpoolRegistry, EventPayload, EventPool};
use aof_core::sched::Scheduler;
use aof_core::timer::TimeEvt;

const NUM_PHILO: usize = 5;
const TABLE_PRIO: u8 = (NUM_PHILO + 1) as u8;
const TICK_RATE: u8 = 0;

const HUNGRY_SIG: u16 = USER_SIG;
const DONE_SIG: u16 = USER_SIG + 1;
const EAT_SIG: u16 = USER_SIG + 2;
const TIMEOUT_SIG: u16 = USER_SIG + 3;

/// Carries a philosopher's index on `HUNGRY_SIG`/`DONE_SIG` messages to the
/// table. `EAT_SIG` needs no payload: the table posts it directly to the
/// philosopher whose turn it grants.
#[repr(C)]
struct PhiloMsg {
    event: Event,
    philo: u8,
}

impl EventPayload for PhiloMsg {
    fn event(&self) -> &Event {
        &self.event
    }
    fn event_mut(&mut self) -> &mut Event {
        &mut self.event
    }
}

static MSG_POOL: EventPool<PhiloMsg, 16> = EventPool::new(1);

/// Tiny xorshift generator: deterministic stand-in for the BSP-supplied
/// random source the design notes call out as an out-of-scope collaborator.
/// Seeded per philosopher so each one's think/eat durations differ without
/// needing a true entropy source.
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    /// Ticks in `[lo, hi]`.
    fn ticks(&mut self, lo: u32, hi: u32) -> u16 {
        (lo + self.next() % (hi - lo + 1)) as u16
    }
}

struct Philo {
    hsm: Hsm<Philo>,
    core: AoCore<4>,
    timer: TimeEvt,
    rng: Lcg,
    eating_ticks: u32,
    /// Set by the `thinking` state's `TIMEOUT_SIG` handler; cleared by the
    /// driving loop once it has posted `HUNGRY_SIG` to the table on this
    /// philosopher's behalf.
    pending_hungry: bool,
    /// Set by the `eating` state's `TIMEOUT_SIG` handler; cleared by the
    /// driving loop once it has posted `DONE_SIG` to the table.
    pending_done: bool,
}

impl HasHsm for Philo {
    fn hsm(&self) -> &Hsm<Self> {
        &self.hsm
    }
    fn hsm_mut(&mut self) -> &mut Hsm<Self> {
        &mut self.hsm
    }
}

impl HasAoCore<4> for Philo {
    fn ao_core(&self) -> &AoCore<4> {
        &self.core
    }
    fn ao_core_mut(&mut self) -> &mut AoCore<4> {
        &mut self.core
    }
}

impl Philo {
    /// SAFETY: every `Philo` this binary constructs lives in `'static mut`
    /// storage (the `PHILOS` array below), so reborrowing its timer at
    /// `'static` reflects the value's real lifetime.
    fn timer_mut(&mut self) -> &'static mut TimeEvt {
        unsafe { &mut *(&mut self.timer as *mut TimeEvt) }
    }
}

fn philo_initial(_p: &mut Philo, _e: &Event) -> Outcome<Philo> {
    Outcome::Tran(philo_thinking)
}

fn philo_thinking(p: &mut Philo, e: &Event) -> Outcome<Philo> {
    match e.signal {
        aof_abi::signal::ENTRY_SIG => {
            let ticks = p.rng.ticks(4, 12);
            let timer = p.timer_mut();
            wheel().arm(timer, ticks, 0);
            Outcome::Handled
        }
        TIMEOUT_SIG => {
            p.pending_hungry = true;
            Outcome::Tran(philo_hungry)
        }
        _ => Outcome::Super(hsm::top),
    }
}

fn philo_hungry(_p: &mut Philo, e: &Event) -> Outcome<Philo> {
    match e.signal {
        EAT_SIG => Outcome::Tran(philo_eating),
        _ => Outcome::Super(hsm::top),
    }
}

fn philo_eating(p: &mut Philo, e: &Event) -> Outcome<Philo> {
    match e.signal {
        aof_abi::signal::ENTRY_SIG => {
            let ticks = p.rng.ticks(2, 6);
            p.eating_ticks += 1;
            let timer = p.timer_mut();
            wheel().arm(timer, ticks, 0);
            Outcome::Handled
        }
        TIMEOUT_SIG => {
            p.pending_done = true;
            Outcome::Tran(philo_thinking)
        }
        _ => Outcome::Super(hsm::top),
    }
}

struct Table {
    hsm: Hsm<Table>,
    core: AoCore<8>,
    forks_free: [bool; NUM_PHILO],
    waiting: [bool; NUM_PHILO],
    eating: [bool; NUM_PHILO],
    /// Set by `try_seat` when it seats philosopher `i`; cleared by the
    /// driving loop once it has posted `EAT_SIG` to that philosopher.
    pending_grant: [bool; NUM_PHILO],
}

impl HasHsm for Table {
    fn hsm(&self) -> &Hsm<Self> {
        &self.hsm
    }
    fn hsm_mut(&mut self) -> &mut Hsm<Self> {
        &mut self.hsm
    }
}

impl HasAoCore<8> for Table {
    fn ao_core(&self) -> &AoCore<8> {
        &self.core
    }
    fn ao_core_mut(&mut self) -> &mut AoCore<8> {
        &mut self.core
    }
}

fn left_fork(i: usize) -> usize {
    i
}

fn right_fork(i: usize) -> usize {
    (i + 1) % NUM_PHILO
}

impl Table {
    fn try_seat(&mut self, i: usize) {
        let (l, r) = (left_fork(i), right_fork(i));
        if self.forks_free[l] && self.forks_free[r] {
            self.forks_free[l] = false;
            self.forks_free[r] = false;
            self.waiting[i] = false;
            self.eating[i] = true;
            let left_neighbor = (i + NUM_PHILO - 1) % NUM_PHILO;
            let right_neighbor = (i + 1) % NUM_PHILO;
            aof_sync::require!(
                !self.eating[left_neighbor] && !self.eating[right_neighbor],
                "adjacent philosophers must never eat simultaneously"
            );
            self.pending_grant[i] = true;
        } else {
            self.waiting[i] = true;
        }
    }
}

static STATIC_EAT: Event = Event::new_static(EAT_SIG);

fn table_initial(_t: &mut Table, _e: &Event) -> Outcome<Table> {
    Outcome::Tran(table_arbitrating)
}

fn table_arbitrating(t: &mut Table, e: &Event) -> Outcome<Table> {
    match e.signal {
        HUNGRY_SIG => {
            // SAFETY: every event delivered here was allocated as a
            // `PhiloMsg` by the driving loop's hungry-post step.
            let msg = unsafe { &*(e as *const Event as *const PhiloMsg) };
            t.try_seat(msg.philo as usize);
            Outcome::Handled
        }
        DONE_SIG => {
            let msg = unsafe { &*(e as *const Event as *const PhiloMsg) };
            let i = msg.philo as usize;
            t.eating[i] = false;
            t.forks_free[left_fork(i)] = true;
            t.forks_free[right_fork(i)] = true;
            let left_neighbor = (i + NUM_PHILO - 1) % NUM_PHILO;
            let right_neighbor = (i + 1) % NUM_PHILO;
            if t.waiting[left_neighbor] {
                t.try_seat(left_neighbor);
            }
            if t.waiting[right_neighbor] {
                t.try_seat(right_neighbor);
            }
            Outcome::Handled
        }
        _ => Outcome::Super(hsm::top),
    }
}

static mut SCHED: Scheduler<'static> = Scheduler::new();
static mut WHEEL: aof_core::timer::TimeWheel<1> = aof_core::timer::TimeWheel::new();
static mut POOLS: EpoolRegistry<{ aof_abi::MAX_EPOOL }> = EpoolRegistry::new();

fn sched() -> &'static mut Scheduler<'static> {
    // SAFETY: single-threaded demo; every call site below is sequential,
    // never nested inside another live borrow of `SCHED`.
    unsafe { &mut *core::ptr::addr_of_mut!(SCHED) }
}

fn wheel() -> &'static mut aof_core::timer::TimeWheel<1> {
    // SAFETY: see `sched`.
    unsafe { &mut *core::ptr::addr_of_mut!(WHEEL) }
}

fn pools() -> &'static EpoolRegistry<{ aof_abi::MAX_EPOOL }> {
    // SAFETY: see `sched`.
    unsafe { &*core::ptr::addr_of!(POOLS) }
}

static mut PHILOS: [Option<Philo>; NUM_PHILO] = [None, None, None, None, None];
static mut TABLE: Option<Table> = None;

fn philo_at(i: usize) -> &'static mut Philo {
    // SAFETY: `main` is the only writer of `PHILOS`' `Option` slots, and
    // that writing happens once during setup before this is ever called.
    unsafe { PHILOS[i].as_mut().unwrap() }
}

fn table() -> &'static mut Table {
    // SAFETY: see `philo_at`.
    unsafe { TABLE.as_mut().unwrap() }
}

/// Turns every pending flag a handler set during the last `step()` pass
/// into an actual post, entirely from this top-level call site — never
/// from inside a dispatch. Returns whether anything was posted, so the
/// caller knows to drain the scheduler again.
fn flush_posts() -> bool {
    let mut posted_any = false;

    for i in 0..NUM_PHILO {
        let philo = philo_at(i);
        if core::mem::take(&mut philo.pending_hungry) {
            let msg = PhiloMsg {
                event: Event::new_static(HUNGRY_SIG),
                philo: i as u8,
            };
            let ptr = MSG_POOL.alloc(msg).expect("message pool exhausted");
            sched().post(TABLE_PRIO, ptr as *const Event, Margin::Bare, pools());
            posted_any = true;
        }
        if core::mem::take(&mut philo.pending_done) {
            let msg = PhiloMsg {
                event: Event::new_static(DONE_SIG),
                philo: i as u8,
            };
            let ptr = MSG_POOL.alloc(msg).expect("message pool exhausted");
            sched().post(TABLE_PRIO, ptr as *const Event, Margin::Bare, pools());
            posted_any = true;
        }
    }

    for i in 0..NUM_PHILO {
        if core::mem::take(&mut table().pending_grant[i]) {
            sched().post(i as u8 + 1, &STATIC_EAT as *const Event, Margin::Bare, pools());
            posted_any = true;
        }
    }

    posted_any
}

fn main() {
    // SAFETY: single-threaded setup before the scheduler ever runs.
    unsafe {
        (*core::ptr::addr_of_mut!(POOLS)).register(&MSG_POOL);
    }

    for i in 0..NUM_PHILO {
        let mut philo = Philo {
            hsm: Hsm::new(philo_initial),
            core: AoCore::new(i as u8 + 1),
            timer: TimeEvt::new(TIMEOUT_SIG, TICK_RATE, i as u8 + 1),
            rng: Lcg(0x9e3779b9u32.wrapping_mul(i as u32 + 1) | 1),
            eating_ticks: 0,
            pending_hungry: false,
            pending_done: false,
        };
        hsm::init(&mut philo, &Event::new_static(INIT_SIG));
        // SAFETY: `PHILOS` is only ever touched from `main`'s single thread
        // during setup, and the `'static mut` reference handed to the
        // scheduler below is the only alias that outlives this function.
        unsafe {
            PHILOS[i] = Some(philo);
            let slot = PHILOS[i].as_mut().unwrap();
            sched().start(i as u8 + 1, slot);
        }
    }

    let mut tbl = Table {
        hsm: Hsm::new(table_initial),
        core: AoCore::new(TABLE_PRIO),
        forks_free: [true; NUM_PHILO],
        waiting: [false; NUM_PHILO],
        eating: [false; NUM_PHILO],
        pending_grant: [false; NUM_PHILO],
    };
    hsm::init(&mut tbl, &Event::new_static(INIT_SIG));
    unsafe {
        TABLE = Some(tbl);
        sched().start(TABLE_PRIO, TABLE.as_mut().unwrap());
    }

    const TOTAL_TICKS: u32 = 2_000;
    for tick in 0..TOTAL_TICKS {
        {
            let (registry, ready) = sched().registry_and_ready_mut();
            wheel().tick_x(TICK_RATE, registry, ready);
        }
        loop {
            while sched().step(pools()) {}
            if !flush_posts() {
                break;
            }
        }
        if tick % 200 == 0 {
            aof_sync::trace_info!("tick {tick}");
        }
    }

    let total_meals: u32 = (0..NUM_PHILO).map(|i| philo_at(i).eating_ticks).sum();
    println!("simulation complete: {TOTAL_TICKS} ticks, {total_meals} total meals");
}
