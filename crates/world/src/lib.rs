//! # MUSH World
//!
//! An in-memory object database implementing [`mush_core::World`].
//!
//! ## Features
//! - Rooms, players and things with owners, locations and parents
//! - Attributes with inheritance and per-attribute flags
//! - Money, wizard privileges and the halt/trace/going flags
//! - Buffered notifications for consoles and tests

pub mod memory;
pub mod object;

pub use memory::{MemoryWorld, LIMBO};
pub use object::{Object, ObjectFlags, START_MONEY};
