//! Method bodies: the unit of analysis.
//!
//! A [`MethodBody`] is the decoded form of one method's `Code` attribute:
//! the ordered instruction stream, the exception table, and the local/
//! argument layout. It is immutable once constructed; every analysis in the
//! crate borrows from it.

use crate::{
    bytecode::instruction::Instruction,
    bytecode::refs::ClassRef,
    Error, Result,
};

/// One entry of a method's exception table.
///
/// Covers the half-open pc range `[start_pc, end_pc)`: an exception raised by
/// an instruction in that range and assignable to `catch_type` transfers
/// control to `handler_pc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of the protected range (inclusive).
    pub start_pc: u32,
    /// End of the protected range (exclusive).
    pub end_pc: u32,
    /// Entry pc of the handler.
    pub handler_pc: u32,
    /// The caught exception class, or `None` for a catch-all (`finally`).
    pub catch_type: Option<ClassRef>,
}

impl ExceptionHandler {
    /// Returns `true` if an instruction at `pc` is protected by this entry.
    #[must_use]
    pub const fn covers(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}

/// A decoded method body: instructions, exception table and frame layout.
///
/// # Construction
///
/// [`MethodBody::new`] validates that instruction byte offsets are strictly
/// increasing and that exception-table entries are internally ordered; it
/// does not validate branch targets, which is the CFG builder's job (a
/// malformed target is a structural build failure at that stage, see
/// [`Error::Structural`]).
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    instructions: Vec<Instruction>,
    exception_table: Vec<ExceptionHandler>,
    max_locals: u16,
    is_static: bool,
    arg_types: Vec<String>,
}

impl MethodBody {
    /// Creates a method body from decoded parts.
    ///
    /// # Arguments
    ///
    /// * `instructions` - the instruction stream, ordered by pc
    /// * `exception_table` - the decoded exception table
    /// * `max_locals` - the declared local-variable array size
    /// * `is_static` - whether the method has no `this` receiver in slot 0
    /// * `arg_types` - descriptors of the declared parameters, in order
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if the body is empty, instruction pcs
    /// are not strictly increasing, or an exception-table range is inverted.
    pub fn new(
        instructions: Vec<Instruction>,
        exception_table: Vec<ExceptionHandler>,
        max_locals: u16,
        is_static: bool,
        arg_types: Vec<String>,
    ) -> Result<Self> {
        if instructions.is_empty() {
            return Err(Error::structural("method body has no instructions"));
        }
        for pair in instructions.windows(2) {
            if pair[1].pc <= pair[0].pc {
                return Err(Error::structural_at(
                    "instruction byte offsets are not strictly increasing",
                    pair[1].pc,
                ));
            }
        }
        for handler in &exception_table {
            if handler.end_pc <= handler.start_pc {
                return Err(Error::structural(format!(
                    "exception table range [{}, {}) is empty or inverted",
                    handler.start_pc, handler.end_pc
                )));
            }
        }
        Ok(Self {
            instructions,
            exception_table,
            max_locals,
            is_static,
            arg_types,
        })
    }

    /// Returns the instruction stream, ordered by pc.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body has no instructions (never true for a
    /// successfully constructed body).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the exception table.
    #[must_use]
    pub fn exception_table(&self) -> &[ExceptionHandler] {
        &self.exception_table
    }

    /// Returns the declared local-variable array size.
    #[must_use]
    pub const fn max_locals(&self) -> u16 {
        self.max_locals
    }

    /// Returns `true` if the method is static (no receiver in slot 0).
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.is_static
    }

    /// Returns the declared parameter descriptors.
    #[must_use]
    pub fn arg_types(&self) -> &[String] {
        &self.arg_types
    }

    /// Returns the index of the instruction at byte offset `pc`, or `None`
    /// if `pc` is not an instruction boundary.
    #[must_use]
    pub fn index_of_pc(&self, pc: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&pc, |insn| insn.pc)
            .ok()
    }

    /// Returns the instruction at byte offset `pc`, if it is a boundary.
    #[must_use]
    pub fn instruction_at_pc(&self, pc: u32) -> Option<&Instruction> {
        self.index_of_pc(pc).map(|idx| &self.instructions[idx])
    }
}
