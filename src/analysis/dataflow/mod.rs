//! The dataflow engine and the concrete analyses built on it.
//!
//! The engine is split the classic way: [`MeetSemiLattice`] describes fact
//! values, [`DataflowAnalysis`] describes one analysis (direction, boundary,
//! transfer), [`DataflowSolver`] iterates it to a fixpoint over a
//! [`Cfg`](crate::analysis::cfg::Cfg), and [`Dataflow`] answers fact queries
//! at block boundaries or individual
//! [`Location`](crate::analysis::cfg::Location)s.
//!
//! The concrete analyses all ride the same solver:
//!
//! - [`LockSetAnalysis`] - which monitors are held, and on what
//! - [`NullnessAnalysis`] - may/must nullness with branch narrowing
//! - [`ValueNumberAnalysis`] - value-equivalence ids per slot
//! - [`LiveStoreAnalysis`] - dead-store detection (backward)
//! - [`CallListAnalysis`] - the common call sequence reaching a point
//! - [`TypeFlowAnalysis`] - coarse per-slot type tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use jvmscope::analysis::dataflow::{DataflowSolver, NullnessAnalysis};
//!
//! let flow = DataflowSolver::new(NullnessAnalysis::new()).solve(cfg);
//! let fact = flow.fact_before(location);
//! ```

mod calls;
mod frame;
mod framework;
mod lattice;
mod livestores;
mod locks;
mod nullness;
mod solver;
mod types;
mod values;

pub use calls::{CallList, CallListAnalysis, CallSite, Origin};
pub use frame::Frame;
pub use framework::{BlockFact, Dataflow, DataflowAnalysis, Direction};
pub use lattice::MeetSemiLattice;
pub use livestores::{LiveSlots, LiveStoreAnalysis};
pub use locks::{LockName, LockSet, LockSetAnalysis, LockValue};
pub use nullness::{Nullness, NullnessAnalysis, NullnessFrame, NullnessValue};
pub use solver::DataflowSolver;
pub use types::{TypeFlowAnalysis, TypeFrame, TypeValue};
pub use values::{ValueFrame, ValueId, ValueNumberAnalysis};
