#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod builder;
mod error;

/// The Robin Hood hash table.
///
/// This module provides [`HashTable`], which stores fixed-size byte items
/// under short byte-string keys, along with its iterator and capacity bounds.
pub mod hash_table;

pub mod hasher;

pub mod meta;

mod slots;

/// Occupancy and probe-length statistics.
#[cfg(any(test, feature = "stats"))]
pub mod stats;

pub use builder::Builder;
pub use error::Error;
pub use hash_table::HashTable;
pub use hash_table::Iter;
#[cfg(any(test, feature = "stats"))]
pub use stats::Stats;
