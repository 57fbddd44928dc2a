//! # jvmscope Prelude
//!
//! A convenient prelude re-exporting the most commonly used types from the
//! analysis engine. Import this module for quick access when writing
//! detectors.
//!
//! # Example
//!
//! ```rust,ignore
//! use jvmscope::prelude::*;
//!
//! let analysis = MethodAnalysis::new(method);
//! let cfg = analysis.cfg()?;
//! # Ok::<(), jvmscope::Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all jvmscope operations
pub use crate::Error;

/// The result type used throughout jvmscope
pub use crate::Result;

// ================================================================================================
// Main Entry Point
// ================================================================================================

/// The memoized per-method analysis context
pub use crate::analysis::MethodAnalysis;

// ================================================================================================
// Instruction Stream
// ================================================================================================

/// The decoded instruction model
pub use crate::bytecode::{
    ClassRef, Cond, Const, FieldRef, Instruction, InvokeKind, MethodBody, MethodRef, Op, ValueKind,
};

// ================================================================================================
// Control Flow
// ================================================================================================

/// CFG construction and traversal
pub use crate::analysis::cfg::{
    build_cfg, BasicBlock, BlockId, Cfg, CfgEdge, DominatorInfo, EdgeKind, Location,
};

// ================================================================================================
// Dataflow
// ================================================================================================

/// The dataflow engine and its concrete analyses
pub use crate::analysis::dataflow::{
    CallList, CallListAnalysis, Dataflow, DataflowAnalysis, DataflowSolver, Direction, Frame,
    LiveStoreAnalysis, LockName, LockSet, LockSetAnalysis, MeetSemiLattice, Nullness,
    NullnessAnalysis, TypeFlowAnalysis, TypeValue, ValueId, ValueNumberAnalysis,
};

// ================================================================================================
// Stack Simulation and Pattern Matching
// ================================================================================================

/// The single-pass operand-stack simulator
pub use crate::analysis::stack::{Item, ItemFlags, OpcodeStack, StackScan};

/// Declarative bytecode pattern matching
pub use crate::analysis::pattern::{BoundValue, Match, OpClass, Pattern, PatternMatcher};
