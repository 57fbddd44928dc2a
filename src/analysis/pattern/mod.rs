//! Declarative bytecode pattern matching over the CFG.
//!
//! Patterns describe multi-instruction idioms as ordered opcode-class
//! steps with bounded wildcards, named bindings and dominance constraints;
//! see [`Pattern`] and [`PatternMatcher`]. A mandatory [`Prescreen`] keeps
//! the cost of non-matching methods to one linear scan.

mod element;
mod matcher;

pub use element::{bound_value, BoundValue, OpClass, PatternElement, Step};
pub use matcher::{Match, Pattern, PatternMatcher, Prescreen};
