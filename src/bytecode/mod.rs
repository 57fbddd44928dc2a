//! The decoded instruction-stream model the engine consumes.
//!
//! Class-file and constant-pool decoding are out of scope for this crate;
//! an external decoder produces [`MethodBody`] values whose instructions
//! carry already-resolved [`FieldRef`]/[`MethodRef`]/[`ClassRef`] identities.
//! Everything under [`crate::analysis`] operates on this representation.

mod instruction;
mod method;
mod refs;

pub use instruction::{
    ArithOp, CmpOp, Cond, Const, Instruction, InvokeKind, Op, StackOp, ValueKind,
};
pub use method::{ExceptionHandler, MethodBody};
pub use refs::{descriptor_slot_width, parse_arg_descriptors, ClassRef, FieldRef, MethodRef};
