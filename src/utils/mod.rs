//! Shared utility types used across the analysis engine.

mod bitset;

pub use bitset::{BitSet, BitSetIter};
