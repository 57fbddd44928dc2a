//! The decoded JVM instruction model.
//!
//! Instructions are represented as a closed [`Op`] enum grouped by semantic
//! shape rather than one variant per raw opcode: the 20 `iload`/`iload_0`/…
//! encodings all decode to `Op::Load { kind: Int, slot }`, the two switch
//! encodings both decode to `Op::Switch`, and so on. Transfer functions
//! dispatch over this enum with exhaustive matches, which is how every
//! analysis in this crate interprets bytecode.
//!
//! Each [`Instruction`] pairs an [`Op`] with the byte offset (`pc`) it was
//! decoded from; byte offsets are the unit branch targets and exception-table
//! ranges are expressed in.

use strum::Display;

use crate::bytecode::refs::{descriptor_slot_width, ClassRef, FieldRef, MethodRef};

/// The computational kind of a value on the operand stack or in a local slot.
///
/// `Byte`, `Char` and `Short` appear only as array element kinds; on the
/// operand stack they widen to `Int`, matching JVM computational types.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 32-bit integer (also the computational type of boolean/byte/char/short).
    Int,
    /// 64-bit integer (category-2).
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float (category-2).
    Double,
    /// Object or array reference.
    Ref,
    /// Byte or boolean array element.
    Byte,
    /// Char array element.
    Char,
    /// Short array element.
    Short,
}

impl ValueKind {
    /// Returns `true` for category-2 kinds (long, double), which occupy two
    /// local-variable slots.
    #[must_use]
    pub const fn is_wide(self) -> bool {
        matches!(self, ValueKind::Long | ValueKind::Double)
    }

    /// Returns the number of operand-stack slots a value of this kind
    /// occupies (2 for category-2 kinds, 1 otherwise).
    #[must_use]
    pub const fn slot_width(self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    /// Returns the default field-descriptor string for this kind.
    #[must_use]
    pub const fn descriptor(self) -> &'static str {
        match self {
            ValueKind::Int => "I",
            ValueKind::Long => "J",
            ValueKind::Float => "F",
            ValueKind::Double => "D",
            ValueKind::Ref => "Ljava/lang/Object;",
            ValueKind::Byte => "B",
            ValueKind::Char => "C",
            ValueKind::Short => "S",
        }
    }
}

/// A constant pushed by `ldc`, `bipush`, `aconst_null` and friends.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    /// The null reference.
    Null,
    /// An int constant.
    Int(i32),
    /// A long constant.
    Long(i64),
    /// A float constant.
    Float(f32),
    /// A double constant.
    Double(f64),
    /// A string literal from the constant pool.
    String(String),
    /// A class literal (`Foo.class`).
    Class(ClassRef),
}

impl Const {
    /// Returns the computational kind of this constant.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Const::Int(_) => ValueKind::Int,
            Const::Long(_) => ValueKind::Long,
            Const::Float(_) => ValueKind::Float,
            Const::Double(_) => ValueKind::Double,
            Const::Null | Const::String(_) | Const::Class(_) => ValueKind::Ref,
        }
    }
}

/// Pure stack-manipulation opcodes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackOp {
    /// `pop` - discard the top category-1 value.
    Pop,
    /// `pop2` - discard one category-2 or two category-1 values.
    Pop2,
    /// `dup` - duplicate the top value.
    Dup,
    /// `dup_x1` - duplicate the top value two down.
    DupX1,
    /// `dup_x2` - duplicate the top value three down.
    DupX2,
    /// `dup2` - duplicate the top one/two values.
    Dup2,
    /// `dup2_x1` - dup2 inserted one further down.
    Dup2X1,
    /// `dup2_x2` - dup2 inserted two further down.
    Dup2X2,
    /// `swap` - exchange the top two category-1 values.
    Swap,
}

/// Arithmetic and logic operators.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division (may throw `ArithmeticException` for int/long).
    Div,
    /// Remainder (may throw `ArithmeticException` for int/long).
    Rem,
    /// Unary negation.
    Neg,
    /// Shift left.
    Shl,
    /// Arithmetic shift right.
    Shr,
    /// Logical shift right.
    Ushr,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
}

impl ArithOp {
    /// Returns `true` for unary operators (only `neg`).
    #[must_use]
    pub const fn is_unary(self) -> bool {
        matches!(self, ArithOp::Neg)
    }
}

/// The comparison performed by a conditional branch.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    /// `ifeq` - int == 0.
    Eq,
    /// `ifne` - int != 0.
    Ne,
    /// `iflt` - int < 0.
    Lt,
    /// `ifge` - int >= 0.
    Ge,
    /// `ifgt` - int > 0.
    Gt,
    /// `ifle` - int <= 0.
    Le,
    /// `if_icmpeq` - two ints equal.
    ICmpEq,
    /// `if_icmpne` - two ints not equal.
    ICmpNe,
    /// `if_icmplt` - first int less than second.
    ICmpLt,
    /// `if_icmpge` - first int greater or equal.
    ICmpGe,
    /// `if_icmpgt` - first int greater than second.
    ICmpGt,
    /// `if_icmple` - first int less or equal.
    ICmpLe,
    /// `if_acmpeq` - two references identical.
    ACmpEq,
    /// `if_acmpne` - two references distinct.
    ACmpNe,
    /// `ifnull` - reference is null.
    IsNull,
    /// `ifnonnull` - reference is not null.
    NonNull,
}

impl Cond {
    /// Returns how many operand-stack values the comparison consumes.
    #[must_use]
    pub const fn operand_count(self) -> usize {
        match self {
            Cond::ICmpEq
            | Cond::ICmpNe
            | Cond::ICmpLt
            | Cond::ICmpGe
            | Cond::ICmpGt
            | Cond::ICmpLe
            | Cond::ACmpEq
            | Cond::ACmpNe => 2,
            _ => 1,
        }
    }

    /// Returns `true` for `ifnull`/`ifnonnull`, the nullness-narrowing branches.
    #[must_use]
    pub const fn is_null_test(self) -> bool {
        matches!(self, Cond::IsNull | Cond::NonNull)
    }
}

/// The long/float/double comparison opcodes that push -1/0/1.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `lcmp`.
    LCmp,
    /// `fcmpl` (NaN compares as less).
    FCmpL,
    /// `fcmpg` (NaN compares as greater).
    FCmpG,
    /// `dcmpl`.
    DCmpL,
    /// `dcmpg`.
    DCmpG,
}

/// The invocation dispatch kind.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// `invokevirtual`.
    Virtual,
    /// `invokespecial` (constructors, private and super calls).
    Special,
    /// `invokestatic` (no receiver).
    Static,
    /// `invokeinterface`.
    Interface,
    /// `invokedynamic` (no receiver; call-site descriptor only).
    Dynamic,
}

impl InvokeKind {
    /// Returns `true` if the invocation consumes a receiver from the stack.
    #[must_use]
    pub const fn has_receiver(self) -> bool {
        !matches!(self, InvokeKind::Static | InvokeKind::Dynamic)
    }
}

/// A decoded JVM instruction, grouped by semantic shape.
///
/// Raw opcode variants that differ only in operand encoding (`iload_0` vs
/// `iload 0`, `goto` vs `goto_w`) decode to the same variant here. The enum
/// is closed: every transfer function in the crate matches it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// `nop`.
    Nop,
    /// Push a constant.
    Const(Const),
    /// Load a local-variable slot onto the stack.
    Load {
        /// The computational kind loaded.
        kind: ValueKind,
        /// The local slot index.
        slot: u16,
    },
    /// Store the top of stack into a local-variable slot.
    Store {
        /// The computational kind stored.
        kind: ValueKind,
        /// The local slot index.
        slot: u16,
    },
    /// Load an array element (`iaload`, `aaload`, `baload`, …).
    ArrayLoad(ValueKind),
    /// Store an array element (`iastore`, `aastore`, …).
    ArrayStore(ValueKind),
    /// Pure stack manipulation (`dup`, `pop`, `swap`, …).
    Stack(StackOp),
    /// Binary or unary arithmetic/logic.
    Arith {
        /// The operand kind.
        kind: ValueKind,
        /// The operator.
        op: ArithOp,
    },
    /// `iinc` - increment a local int slot in place.
    Iinc {
        /// The local slot index.
        slot: u16,
        /// The signed increment.
        delta: i16,
    },
    /// A primitive conversion (`i2l`, `d2f`, `i2b`, …).
    Convert {
        /// The source kind.
        from: ValueKind,
        /// The destination kind.
        to: ValueKind,
    },
    /// `lcmp`/`fcmpl`/`fcmpg`/`dcmpl`/`dcmpg` - push -1/0/1.
    Cmp(CmpOp),
    /// A conditional branch.
    Branch {
        /// The comparison.
        cond: Cond,
        /// Taken-branch target pc.
        target: u32,
    },
    /// `goto`/`goto_w` - unconditional jump.
    Goto {
        /// Target pc.
        target: u32,
    },
    /// `jsr`/`jsr_w` - jump to subroutine, pushing a return address.
    Jsr {
        /// Subroutine entry pc.
        target: u32,
    },
    /// `ret` - return from subroutine via a return address in a local slot.
    Ret {
        /// The local slot holding the return address.
        slot: u16,
    },
    /// `tableswitch`/`lookupswitch`.
    Switch {
        /// The default target pc.
        default: u32,
        /// (case value, target pc) pairs.
        cases: Vec<(i32, u32)>,
    },
    /// `return`/`ireturn`/`areturn`/… - return from the method.
    Return {
        /// The kind of the returned value, or `None` for `void`.
        kind: Option<ValueKind>,
    },
    /// `getstatic`.
    GetStatic(FieldRef),
    /// `putstatic`.
    PutStatic(FieldRef),
    /// `getfield`.
    GetField(FieldRef),
    /// `putfield`.
    PutField(FieldRef),
    /// Any `invoke*` instruction.
    Invoke {
        /// The dispatch kind.
        kind: InvokeKind,
        /// The resolved callee.
        method: MethodRef,
    },
    /// `new` - allocate an uninitialized instance.
    New(ClassRef),
    /// `newarray`/`anewarray`/`multianewarray`.
    NewArray {
        /// The element descriptor.
        element: String,
        /// Number of dimension counts consumed from the stack.
        dims: u8,
    },
    /// `arraylength`.
    ArrayLength,
    /// `athrow`.
    Throw,
    /// `checkcast`.
    CheckCast(ClassRef),
    /// `instanceof`.
    InstanceOf(ClassRef),
    /// `monitorenter`.
    MonitorEnter,
    /// `monitorexit`.
    MonitorExit,
}

impl Op {
    /// Returns how many operand-stack slots this operation consumes.
    ///
    /// Slot counts follow the JVM slot model: category-2 values (long,
    /// double) occupy two slots. Frame-based transfer functions that model
    /// the stack slot-by-slot use these counts for every opcode they do not
    /// special-case.
    #[must_use]
    pub fn stack_slots_consumed(&self) -> usize {
        match self {
            Op::Nop
            | Op::Const(_)
            | Op::Load { .. }
            | Op::Iinc { .. }
            | Op::Goto { .. }
            | Op::Jsr { .. }
            | Op::Ret { .. }
            | Op::GetStatic(_)
            | Op::New(_) => 0,
            Op::Store { kind, .. } => kind.slot_width(),
            Op::ArrayLoad(_) => 2,
            Op::ArrayStore(kind) => 2 + element_slot_width(*kind),
            Op::Stack(op) => match op {
                StackOp::Pop | StackOp::Dup => 1,
                StackOp::Pop2 | StackOp::DupX1 | StackOp::Dup2 | StackOp::Swap => 2,
                StackOp::DupX2 | StackOp::Dup2X1 => 3,
                StackOp::Dup2X2 => 4,
            },
            Op::Arith { kind, op } => {
                if op.is_unary() {
                    kind.slot_width()
                } else if matches!(op, ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr) {
                    // Shift amount is always an int.
                    kind.slot_width() + 1
                } else {
                    kind.slot_width() * 2
                }
            }
            Op::Convert { from, .. } => from.slot_width(),
            Op::Cmp(op) => match op {
                CmpOp::LCmp | CmpOp::DCmpL | CmpOp::DCmpG => 4,
                CmpOp::FCmpL | CmpOp::FCmpG => 2,
            },
            Op::Branch { cond, .. } => cond.operand_count(),
            Op::Switch { .. }
            | Op::Throw
            | Op::MonitorEnter
            | Op::MonitorExit
            | Op::ArrayLength
            | Op::CheckCast(_)
            | Op::InstanceOf(_) => 1,
            Op::Return { kind } => kind.map_or(0, ValueKind::slot_width),
            Op::PutStatic(field) => descriptor_slot_width(&field.descriptor),
            Op::GetField(_) => 1,
            Op::PutField(field) => {
                1 + descriptor_slot_width(&field.descriptor)
            }
            Op::Invoke { kind, method } => {
                method.arg_slot_width() + usize::from(kind.has_receiver())
            }
            Op::NewArray { dims, .. } => usize::from(*dims),
        }
    }

    /// Returns how many operand-stack slots this operation produces.
    #[must_use]
    pub fn stack_slots_produced(&self) -> usize {
        match self {
            Op::Nop
            | Op::Store { .. }
            | Op::ArrayStore(_)
            | Op::Iinc { .. }
            | Op::Goto { .. }
            | Op::Ret { .. }
            | Op::Branch { .. }
            | Op::Switch { .. }
            | Op::Return { .. }
            | Op::PutStatic(_)
            | Op::PutField(_)
            | Op::Throw
            | Op::MonitorEnter
            | Op::MonitorExit => 0,
            Op::Const(c) => c.kind().slot_width(),
            Op::Load { kind, .. } => kind.slot_width(),
            Op::ArrayLoad(kind) => element_slot_width(*kind),
            Op::Stack(op) => match op {
                StackOp::Pop | StackOp::Pop2 => 0,
                StackOp::Dup | StackOp::Swap => 2,
                StackOp::DupX1 => 3,
                StackOp::DupX2 | StackOp::Dup2 => 4,
                StackOp::Dup2X1 => 5,
                StackOp::Dup2X2 => 6,
            },
            Op::Arith { kind, .. } => kind.slot_width(),
            Op::Convert { to, .. } => to.slot_width(),
            Op::Cmp(_) | Op::InstanceOf(_) | Op::ArrayLength => 1,
            Op::Jsr { .. } | Op::New(_) | Op::NewArray { .. } => 1,
            Op::GetStatic(field) | Op::GetField(field) => {
                descriptor_slot_width(&field.descriptor)
            }
            Op::Invoke { method, .. } => {
                descriptor_slot_width(method.return_descriptor())
            }
            Op::CheckCast(_) => 1,
        }
    }
}

/// Slot width of an array element kind once on the operand stack (byte/char/
/// short widen to int).
const fn element_slot_width(kind: ValueKind) -> usize {
    match kind {
        ValueKind::Long | ValueKind::Double => 2,
        _ => 1,
    }
}

/// An instruction at a byte offset within a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The byte offset of this instruction within the method's code array.
    pub pc: u32,
    /// The decoded operation.
    pub op: Op,
}

impl Instruction {
    /// Creates an instruction at the given byte offset.
    #[must_use]
    pub const fn new(pc: u32, op: Op) -> Self {
        Self { pc, op }
    }

    /// Returns `true` if this instruction ends a basic block (any control
    /// transfer, conditional or not).
    #[must_use]
    pub fn ends_block(&self) -> bool {
        matches!(
            self.op,
            Op::Branch { .. }
                | Op::Goto { .. }
                | Op::Jsr { .. }
                | Op::Ret { .. }
                | Op::Switch { .. }
                | Op::Return { .. }
                | Op::Throw
        )
    }

    /// Returns `true` if control never falls through to the next instruction.
    ///
    /// Conditional branches fall through on the untaken path; `jsr` resumes
    /// at the following instruction only via a matching `ret`, so it does not
    /// fall through directly.
    #[must_use]
    pub fn is_unconditional_transfer(&self) -> bool {
        matches!(
            self.op,
            Op::Goto { .. }
                | Op::Jsr { .. }
                | Op::Ret { .. }
                | Op::Switch { .. }
                | Op::Return { .. }
                | Op::Throw
        )
    }

    /// Returns `true` if executing this instruction may raise an exception
    /// routed through the method's exception table.
    ///
    /// This is the approximation the CFG builder uses to attach handler
    /// edges; linkage errors possible on almost any instruction are ignored.
    #[must_use]
    pub fn can_throw(&self) -> bool {
        match &self.op {
            Op::Throw
            | Op::Invoke { .. }
            | Op::GetField(_)
            | Op::PutField(_)
            | Op::GetStatic(_)
            | Op::PutStatic(_)
            | Op::ArrayLoad(_)
            | Op::ArrayStore(_)
            | Op::ArrayLength
            | Op::New(_)
            | Op::NewArray { .. }
            | Op::CheckCast(_)
            | Op::MonitorEnter
            | Op::MonitorExit => true,
            Op::Arith { kind, op } => {
                matches!(op, ArithOp::Div | ArithOp::Rem)
                    && matches!(kind, ValueKind::Int | ValueKind::Long)
            }
            _ => false,
        }
    }

    /// Collects every explicit branch target of this instruction.
    pub fn branch_targets(&self, out: &mut Vec<u32>) {
        match &self.op {
            Op::Branch { target, .. } | Op::Goto { target } | Op::Jsr { target } => {
                out.push(*target);
            }
            Op::Switch { default, cases } => {
                out.push(*default);
                out.extend(cases.iter().map(|&(_, t)| t));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ending_classification() {
        let branch = Instruction::new(0, Op::Branch { cond: Cond::Eq, target: 10 });
        assert!(branch.ends_block());
        assert!(!branch.is_unconditional_transfer());

        let goto = Instruction::new(0, Op::Goto { target: 10 });
        assert!(goto.ends_block());
        assert!(goto.is_unconditional_transfer());

        let load = Instruction::new(0, Op::Load { kind: ValueKind::Int, slot: 0 });
        assert!(!load.ends_block());
    }

    #[test]
    fn throw_classification() {
        let div = Instruction::new(0, Op::Arith { kind: ValueKind::Int, op: ArithOp::Div });
        assert!(div.can_throw());

        let fadd = Instruction::new(0, Op::Arith { kind: ValueKind::Float, op: ArithOp::Add });
        assert!(!fadd.can_throw());

        let getfield = Instruction::new(0, Op::GetField(FieldRef::new("C", "f", "I")));
        assert!(getfield.can_throw());
    }

    #[test]
    fn switch_targets_collected() {
        let sw = Instruction::new(
            0,
            Op::Switch {
                default: 40,
                cases: vec![(0, 10), (1, 20)],
            },
        );
        let mut targets = Vec::new();
        sw.branch_targets(&mut targets);
        assert_eq!(targets, vec![40, 10, 20]);
    }

    #[test]
    fn stack_slot_effects() {
        let ladd = Op::Arith { kind: ValueKind::Long, op: ArithOp::Add };
        assert_eq!(ladd.stack_slots_consumed(), 4);
        assert_eq!(ladd.stack_slots_produced(), 2);

        let lshl = Op::Arith { kind: ValueKind::Long, op: ArithOp::Shl };
        assert_eq!(lshl.stack_slots_consumed(), 3);

        let invoke = Op::Invoke {
            kind: InvokeKind::Virtual,
            method: MethodRef::new("C", "m", "(JI)D"),
        };
        assert_eq!(invoke.stack_slots_consumed(), 4); // receiver + J + I
        assert_eq!(invoke.stack_slots_produced(), 2);

        let dup2 = Op::Stack(StackOp::Dup2);
        assert_eq!(dup2.stack_slots_consumed(), 2);
        assert_eq!(dup2.stack_slots_produced(), 4);

        assert_eq!(Op::Const(Const::Null).stack_slots_produced(), 1);
        assert_eq!(Op::Throw.stack_slots_consumed(), 1);
    }

    #[test]
    fn cond_operand_counts() {
        assert_eq!(Cond::IsNull.operand_count(), 1);
        assert_eq!(Cond::ICmpLt.operand_count(), 2);
        assert!(Cond::NonNull.is_null_test());
        assert!(!Cond::ACmpEq.is_null_test());
    }
}
