//! Pattern elements: what a single step of a pattern may match and bind.

use crate::bytecode::{ClassRef, Cond, FieldRef, MethodRef, Op};

/// A coarse opcode class, the unit of matching and of the prescreen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    /// Any constant push.
    Const,
    /// Any local load.
    Load,
    /// Any local store.
    Store,
    /// `getstatic`.
    GetStatic,
    /// `putstatic`.
    PutStatic,
    /// `getfield`.
    GetField,
    /// `putfield`.
    PutField,
    /// Any `invoke*`.
    Invoke,
    /// Any conditional branch.
    Branch,
    /// `ifnull`/`ifnonnull` specifically.
    NullTest,
    /// `monitorenter`.
    MonitorEnter,
    /// `monitorexit`.
    MonitorExit,
    /// `new`.
    New,
    /// Any `*return`.
    Return,
    /// `athrow`.
    Throw,
}

impl OpClass {
    /// Returns `true` if the operation belongs to this class.
    #[must_use]
    pub fn matches(self, op: &Op) -> bool {
        match self {
            OpClass::Const => matches!(op, Op::Const(_)),
            OpClass::Load => matches!(op, Op::Load { .. }),
            OpClass::Store => matches!(op, Op::Store { .. }),
            OpClass::GetStatic => matches!(op, Op::GetStatic(_)),
            OpClass::PutStatic => matches!(op, Op::PutStatic(_)),
            OpClass::GetField => matches!(op, Op::GetField(_)),
            OpClass::PutField => matches!(op, Op::PutField(_)),
            OpClass::Invoke => matches!(op, Op::Invoke { .. }),
            OpClass::Branch => matches!(op, Op::Branch { .. }),
            OpClass::NullTest => {
                matches!(op, Op::Branch { cond, .. } if matches!(cond, Cond::IsNull | Cond::NonNull))
            }
            OpClass::MonitorEnter => matches!(op, Op::MonitorEnter),
            OpClass::MonitorExit => matches!(op, Op::MonitorExit),
            OpClass::New => matches!(op, Op::New(_)),
            OpClass::Return => matches!(op, Op::Return { .. }),
            OpClass::Throw => matches!(op, Op::Throw),
        }
    }
}

/// The value a matched instruction binds to a pattern variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundValue {
    /// The field of a `get*`/`put*`.
    Field(FieldRef),
    /// The callee of an `invoke*`.
    Method(MethodRef),
    /// The local slot of a load or store.
    Register(u16),
    /// The class of a `new`.
    Class(ClassRef),
}

/// Extracts the bindable identity of an operation, if it has one.
#[must_use]
pub fn bound_value(op: &Op) -> Option<BoundValue> {
    match op {
        Op::GetStatic(f) | Op::PutStatic(f) | Op::GetField(f) | Op::PutField(f) => {
            Some(BoundValue::Field(f.clone()))
        }
        Op::Invoke { method, .. } => Some(BoundValue::Method(method.clone())),
        Op::Load { slot, .. } | Op::Store { slot, .. } => Some(BoundValue::Register(*slot)),
        Op::New(class) => Some(BoundValue::Class(class.clone())),
        _ => None,
    }
}

/// One concrete element of a pattern: an opcode class plus optional
/// binding, label and dominance constraint.
#[derive(Debug, Clone)]
pub struct PatternElement {
    /// The opcode class this element matches.
    pub op_class: OpClass,
    /// Variable name the matched instruction's identity binds to.
    pub bind: Option<String>,
    /// Label other elements may reference in dominance constraints.
    pub label: Option<String>,
    /// Label of an earlier element whose block must dominate this one's.
    pub dominated_by: Option<String>,
}

impl PatternElement {
    /// Creates an element matching `op_class` with no constraints.
    #[must_use]
    pub fn new(op_class: OpClass) -> Self {
        Self {
            op_class,
            bind: None,
            label: None,
            dominated_by: None,
        }
    }
}

/// One step of a pattern: a concrete element or a bounded wildcard run.
#[derive(Debug, Clone)]
pub enum Step {
    /// Match one instruction of the element's class.
    Op(PatternElement),
    /// Consume between `min` and `max` instructions of any kind.
    Wild {
        /// Fewest instructions the wildcard may consume.
        min: usize,
        /// Most instructions the wildcard may consume.
        max: usize,
    },
}
