//! # replikit
//!
//! State-based CRDTs and vector clocks for local-first applications.
//!
//! A CRDT (Conflict-free Replicated Data Type) can be replicated across
//! devices and mutated independently on each of them. When replicas merge
//! their states, they are guaranteed to converge to the same value without
//! coordination, regardless of the order in which states are exchanged.
//!
//! This crate is the algebraic core of the replikit stack: the data types
//! and the causality primitive. Storage lives in `replikit-store`, and the
//! replication engine that moves operations between replicas lives in
//! `replikit-sync`.
//!
//! ## `no_std` Support
//!
//! The crate supports `no_std` environments with the `alloc` crate. Disable
//! the default `std` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! replikit = { version = "0.1", default-features = false }
//! ```
//!
//! Stamped types take explicit `(timestamp, replica)` arguments — the
//! layer that owns the wall clock supplies them — so the algebra itself
//! never touches the system clock. The `std` feature only adds
//! `std::error::Error` impls for the error types.
//!
//! ## Quick Start
//!
//! ```
//! use replikit::prelude::*;
//!
//! let mut c1 = PNCounter::new();
//! c1.increment("device-1", 5);
//! c1.decrement("device-1", 2);
//!
//! let mut c2 = PNCounter::new();
//! c2.increment("device-2", 3);
//! c2.decrement("device-2", 1);
//!
//! c1.merge(&c2);
//! assert_eq!(c1.value(), 5);
//! ```
//!
//! ## Available CRDTs
//!
//! ### Counters
//! - [`GCounter`] - Grow-only counter (increment only)
//! - [`PNCounter`] - Positive-negative counter (increment and decrement)
//!
//! ### Registers
//! - [`LWWRegister`] - Last-writer-wins register (timestamp-based resolution)
//!
//! ### Sets
//! - [`GSet`] - Grow-only set (add only)
//! - [`TwoPSet`] - Two-phase set (remove is permanent)
//! - [`TombstoneSet`] - Keyed set whose tombstones can be superseded by
//!   later adds
//! - [`OrderedSet`] - Keyed set with permanent tombstones, iterated in
//!   timestamp order
//!
//! ### Maps and sequences
//! - [`ORMap`] - Observed-remove map with timestamp-based visibility
//! - [`Rga`] - Replicated growable array (ordered sequence)
//!
//! ## The `Crdt` Trait
//!
//! All types implement [`Crdt`], whose [`Crdt::merge`] is guaranteed to be
//! commutative, associative, and idempotent.
//!
//! ## Causality
//!
//! [`VectorClock`] tracks one counter per replica and induces the partial
//! order ([`ClockOrdering`]) the replication layer uses to decide whether a
//! remote operation is already covered by local state.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

mod crdt;
mod gcounter;
mod gset;
mod lww_register;
mod or_map;
mod ordered_set;
mod pn_counter;
mod rga;
mod tombstone_set;
mod twop_set;

pub mod clock;
pub mod prelude;

pub use crdt::Crdt;
pub use clock::{ClockOrdering, VectorClock};
pub use gcounter::GCounter;
pub use gset::GSet;
pub use lww_register::LWWRegister;
pub use or_map::ORMap;
pub use ordered_set::OrderedSet;
pub use pn_counter::PNCounter;
pub use rga::{IndexError, ParsePositionError, Position, Rga};
pub use tombstone_set::TombstoneSet;
pub use twop_set::TwoPSet;
