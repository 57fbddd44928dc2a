#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

//! # jvmscope
//!
//! A static-analysis engine for JVM bytecode: control flow graphs with
//! exception semantics, dominance, a generic fixpoint dataflow solver with
//! a family of concrete analyses, a single-pass operand-stack simulator,
//! and a declarative bytecode pattern matcher.
//!
//! The crate consumes an already-decoded instruction stream (see
//! [`bytecode::MethodBody`]); class-file parsing is an external concern.
//! On top of that stream it offers the shared infrastructure a bug-pattern
//! scanner's detectors need:
//!
//! - **CFG** ([`analysis::cfg`]) - typed edges including handled/unhandled
//!   exception paths, liveness of blocks, program-order location iteration.
//! - **Dominance** ([`analysis::cfg::DominatorInfo`]) - dominators and
//!   post-dominators over the non-exception subgraph.
//! - **Dataflow** ([`analysis::dataflow`]) - a worklist solver over
//!   meet-semilattice facts, instantiated by lock-set, nullness, value
//!   numbering, live-store, call-list and type-tracking analyses.
//! - **Stack simulation** ([`analysis::stack`]) - a cheap O(n) pass
//!   tracking constants and provenance per slot.
//! - **Pattern matching** ([`analysis::pattern`]) - multi-instruction
//!   idiom recognition with bindings and dominance constraints.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jvmscope::analysis::MethodAnalysis;
//!
//! let analysis = MethodAnalysis::new(method);
//! let nullness = analysis.nullness()?;
//! if let Some(fact) = nullness.fact_before(location) {
//!     // facts at unreachable locations are None, never defaults
//! }
//! # Ok::<(), jvmscope::Error>(())
//! ```
//!
//! ## Error Model
//!
//! All failures are per-method and non-fatal to a scan: a structurally
//! broken method yields [`Error::Structural`], an oversized one
//! [`Error::Unprofitable`], and both are memoized by
//! [`analysis::MethodAnalysis`] so repeated queries do not recompute.
//! Querying a fact at an unreachable location is not an error at all; it
//! returns `None`.

mod error;

/// Shared fixtures for unit tests.
#[cfg(test)]
pub(crate) mod test;

pub mod analysis;
pub mod bytecode;
pub mod prelude;
pub mod utils;

pub use error::Error;

/// A type alias for `Result<T, jvmscope::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
