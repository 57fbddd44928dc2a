//! The single-pass operand-stack simulator.
//!
//! A cheaper, less precise companion to the dataflow engine: one linear
//! forward pass per method, tracking constants, signatures and provenance
//! per slot as [`Item`]s, scrubbing whatever a control-flow merge would make
//! unreliable. See [`OpcodeStack`].

mod item;
mod simulator;

pub use item::{Item, ItemFlags};
pub use simulator::{OpcodeStack, StackScan};
