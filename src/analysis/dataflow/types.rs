//! Coarse type tracking for stack and local slots.
//!
//! Tracks, per slot, the value's type as a field descriptor or primitive
//! kind. Precision is deliberately modest: there is no class-hierarchy
//! resolution, so two different reference types merge to `java/lang/Object`
//! rather than their actual least upper bound. That is enough for the
//! detector-style questions this analysis answers ("is this slot a
//! `String`", "is this an array").

use crate::{
    analysis::{
        cfg::{Cfg, CfgEdge, Location},
        dataflow::{
            frame::Frame,
            framework::{DataflowAnalysis, Direction},
            lattice::MeetSemiLattice,
        },
    },
    bytecode::{descriptor_slot_width, Const, Instruction, Op, ValueKind},
};

/// The root reference type every mismatched reference merge widens to.
const OBJECT: &str = "Ljava/lang/Object;";

/// The abstract type of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeValue {
    /// No information (top).
    Top,
    /// The null reference, assignable to any reference type.
    Null,
    /// A reference type, by field descriptor (`Ljava/lang/String;`, `[I`).
    Reference(String),
    /// A primitive computational type.
    Prim(ValueKind),
    /// The upper half of a category-2 value occupying the slot below.
    Half,
    /// Incompatible types met (bottom).
    Conflict,
}

impl TypeValue {
    /// Builds the abstract type for a field descriptor.
    #[must_use]
    pub fn from_descriptor(descriptor: &str) -> Self {
        match descriptor.as_bytes().first() {
            Some(b'L' | b'[') => TypeValue::Reference(descriptor.to_string()),
            Some(b'I' | b'Z' | b'B' | b'C' | b'S') => TypeValue::Prim(ValueKind::Int),
            Some(b'J') => TypeValue::Prim(ValueKind::Long),
            Some(b'F') => TypeValue::Prim(ValueKind::Float),
            Some(b'D') => TypeValue::Prim(ValueKind::Double),
            _ => TypeValue::Top,
        }
    }

    /// Returns `true` for reference types and null.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeValue::Reference(_) | TypeValue::Null)
    }

    /// Returns the descriptor if this is a known reference type.
    #[must_use]
    pub fn descriptor(&self) -> Option<&str> {
        match self {
            TypeValue::Reference(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// Returns `true` if this is an array type.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, TypeValue::Reference(d) if d.starts_with('['))
    }
}

impl MeetSemiLattice for TypeValue {
    fn meet(&self, other: &Self) -> Self {
        use TypeValue::{Conflict, Null, Prim, Reference, Top};
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (Top, x) | (x, Top) => x.clone(),
            (Null, r @ Reference(_)) | (r @ Reference(_), Null) => r.clone(),
            // No hierarchy resolution: widen to Object.
            (Reference(_), Reference(_)) => Reference(OBJECT.to_string()),
            (Prim(_), Prim(_)) => Conflict,
            _ => Conflict,
        }
    }
}

/// The type-tracking fact: one [`TypeValue`] per slot.
pub type TypeFrame = Frame<TypeValue>;

/// Forward analysis computing [`TypeFrame`] facts.
#[derive(Debug, Default)]
pub struct TypeFlowAnalysis;

impl TypeFlowAnalysis {
    /// Creates the analysis.
    #[must_use]
    pub fn new() -> Self {
        TypeFlowAnalysis
    }

    fn push_descriptor(frame: &mut TypeFrame, descriptor: &str) {
        match descriptor_slot_width(descriptor) {
            0 => {}
            1 => frame.push(TypeValue::from_descriptor(descriptor)),
            _ => {
                frame.push(TypeValue::from_descriptor(descriptor));
                frame.push(TypeValue::Half);
            }
        }
    }

    fn push_kind(frame: &mut TypeFrame, kind: ValueKind) {
        frame.push(TypeValue::Prim(kind));
        if kind.is_wide() {
            frame.push(TypeValue::Half);
        }
    }
}

impl DataflowAnalysis for TypeFlowAnalysis {
    type Fact = TypeFrame;
    const DIRECTION: Direction = Direction::Forward;

    fn boundary(&self, cfg: &Cfg) -> TypeFrame {
        let method = cfg.method();
        let mut frame = Frame::new(method.max_locals(), TypeValue::Top);
        let mut slot: u16 = 0;
        if !method.is_static() {
            frame.set_local(slot, TypeValue::Reference(OBJECT.to_string()));
            slot += 1;
        }
        for descriptor in method.arg_types() {
            frame.set_local(slot, TypeValue::from_descriptor(descriptor));
            slot += 1;
            if descriptor_slot_width(descriptor) == 2 {
                frame.set_local(slot, TypeValue::Half);
                slot += 1;
            }
        }
        frame
    }

    fn transfer(&self, fact: &mut TypeFrame, insn: &Instruction, _loc: Location, _cfg: &Cfg) {
        match &insn.op {
            Op::Const(c) => match c {
                Const::Null => fact.push(TypeValue::Null),
                Const::String(_) => fact.push(TypeValue::Reference("Ljava/lang/String;".into())),
                Const::Class(_) => fact.push(TypeValue::Reference("Ljava/lang/Class;".into())),
                other => Self::push_kind(fact, other.kind()),
            },
            Op::Load { kind, slot } => {
                let value = fact.local(*slot).cloned().unwrap_or(TypeValue::Top);
                fact.push(value);
                if kind.is_wide() {
                    fact.push(TypeValue::Half);
                }
            }
            Op::Store { kind, slot } => {
                if kind.is_wide() {
                    fact.pop_n(1); // the Half marker
                    let value = fact.pop().unwrap_or(TypeValue::Top);
                    fact.set_local(*slot, value);
                    fact.set_local(slot + 1, TypeValue::Half);
                } else {
                    let value = fact.pop().unwrap_or(TypeValue::Top);
                    fact.set_local(*slot, value);
                }
            }
            Op::Stack(op) => fact.apply_stack_op(*op),
            Op::Arith { kind, op: _ } => {
                fact.pop_n(insn.op.stack_slots_consumed());
                Self::push_kind(fact, *kind);
            }
            Op::Convert { from, to } => {
                fact.pop_n(from.slot_width());
                Self::push_kind(fact, *to);
            }
            Op::Cmp(_) | Op::InstanceOf(_) | Op::ArrayLength => {
                fact.pop_n(insn.op.stack_slots_consumed());
                fact.push(TypeValue::Prim(ValueKind::Int));
            }
            Op::GetStatic(field) => {
                Self::push_descriptor(fact, &field.descriptor);
            }
            Op::GetField(field) => {
                fact.pop_n(1);
                Self::push_descriptor(fact, &field.descriptor);
            }
            Op::Invoke { method, .. } => {
                fact.pop_n(insn.op.stack_slots_consumed());
                Self::push_descriptor(fact, method.return_descriptor());
            }
            Op::New(class) => {
                fact.push(TypeValue::Reference(format!("L{class};")));
            }
            Op::NewArray { element, dims } => {
                fact.pop_n(usize::from(*dims));
                let mut descriptor = "[".repeat(usize::from(*dims));
                descriptor.push_str(element);
                fact.push(TypeValue::Reference(descriptor));
            }
            Op::ArrayLoad(kind) => {
                fact.pop_n(2);
                match kind {
                    ValueKind::Ref => fact.push(TypeValue::Reference(OBJECT.to_string())),
                    wide if wide.is_wide() => Self::push_kind(fact, *wide),
                    // byte/char/short widen to int on the stack
                    _ => fact.push(TypeValue::Prim(ValueKind::Int)),
                }
            }
            Op::CheckCast(class) => {
                fact.set_top(TypeValue::Reference(format!("L{class};")));
            }
            op => {
                fact.apply_generic(
                    op.stack_slots_consumed(),
                    op.stack_slots_produced(),
                    TypeValue::Top,
                );
            }
        }
    }

    fn edge_transfer(&self, fact: &TypeFrame, edge: &CfgEdge, _cfg: &Cfg) -> TypeFrame {
        use crate::analysis::cfg::EdgeKind;

        match edge.kind() {
            EdgeKind::HandledException { catch_type } => {
                let mut out = fact.clone();
                out.clear_stack();
                let descriptor = catch_type
                    .as_ref()
                    .map_or_else(|| "Ljava/lang/Throwable;".to_string(), |c| format!("L{c};"));
                out.push(TypeValue::Reference(descriptor));
                out
            }
            EdgeKind::UnhandledException => {
                let mut out = fact.clone();
                out.clear_stack();
                out.push(TypeValue::Reference("Ljava/lang/Throwable;".to_string()));
                out
            }
            _ => fact.clone(),
        }
    }
}
