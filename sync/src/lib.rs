#![cfg_attr(not(test), no_std)]

//! Cross-cutting primitives shared by `aof-core`: the critical-section
//! abstraction, the priority/ready-set bitset, a generic ring buffer, the
//! internal diagnostic log, contract-violation handling, and a lazy-init
//! cell for framework singleton state.

pub mod contract;
pub mod critical_section;
pub mod once_lock;
pub mod pset;
pub mod ring;
pub mod trace;

pub use critical_section::CriticalSection;
pub use once_lock::OnceLock;
pub use pset::PrioritySet64;
pub use ring::RingBuffer;
