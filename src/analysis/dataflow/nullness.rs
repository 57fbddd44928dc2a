//! Nullness analysis with branch narrowing.
//!
//! The lattice is the five-point order from the data model: `Unknown` (top),
//! `Null`, `NonNull`, `CheckedNonNull` (proven by an explicit test), and
//! `Nullable` (bottom: null on some path, not on another). The meet only
//! loses precision: `Null` met with any non-null state is `Nullable`.
//!
//! Narrowing is edge-sensitive. When a block ends in `ifnull`/`ifnonnull`
//! over a value loaded from a local slot, the transfer records which slot was
//! tested and the edge transfer rewrites that slot's fact differently on the
//! taken and fall-through edges. A dereference (`getfield`, `invokevirtual`
//! receiver) also refines its source slot to `NonNull` on the continuing
//! path, since execution only continues if no `NullPointerException` was
//! raised.

use crate::{
    analysis::{
        cfg::{Cfg, CfgEdge, EdgeKind, Location},
        dataflow::{
            frame::Frame,
            framework::{DataflowAnalysis, Direction},
            lattice::MeetSemiLattice,
        },
    },
    bytecode::{Cond, Const, Instruction, Op, ValueKind},
};

/// Abstract nullness of one reference slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullness {
    /// No information (top). Also used for non-reference slots.
    Unknown,
    /// Definitely null on every path.
    Null,
    /// Definitely not null on every path.
    NonNull,
    /// Not null, proven by an explicit `ifnull`/`ifnonnull` test.
    CheckedNonNull,
    /// Null on at least one path and non-null on another (bottom).
    Nullable,
}

impl Nullness {
    /// Returns `true` for the two definitely-non-null states.
    #[must_use]
    pub const fn is_definitely_non_null(self) -> bool {
        matches!(self, Nullness::NonNull | Nullness::CheckedNonNull)
    }

    /// Returns `true` if the value may be null (`Null`, `Nullable`, or no
    /// information at all).
    #[must_use]
    pub const fn may_be_null(self) -> bool {
        !self.is_definitely_non_null()
    }
}

impl MeetSemiLattice for Nullness {
    fn meet(&self, other: &Self) -> Self {
        use Nullness::{CheckedNonNull, NonNull, Null, Nullable, Unknown};
        match (*self, *other) {
            (a, b) if a == b => a,
            (Unknown, x) | (x, Unknown) => x,
            (CheckedNonNull, NonNull) | (NonNull, CheckedNonNull) => NonNull,
            // Null vs any non-null state, or anything vs Nullable.
            _ => Nullable,
        }
    }
}

/// One slot of the nullness frame: the state plus the local slot the value
/// was loaded from, when still known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NullnessValue {
    /// The abstract nullness.
    pub state: Nullness,
    /// The local slot this value is a copy of, if any; narrowing writes
    /// through it.
    pub source_slot: Option<u16>,
}

impl NullnessValue {
    const fn unknown() -> Self {
        NullnessValue {
            state: Nullness::Unknown,
            source_slot: None,
        }
    }

    const fn of(state: Nullness) -> Self {
        NullnessValue {
            state,
            source_slot: None,
        }
    }
}

impl MeetSemiLattice for NullnessValue {
    fn meet(&self, other: &Self) -> Self {
        NullnessValue {
            state: self.state.meet(&other.state),
            source_slot: if self.source_slot == other.source_slot {
                self.source_slot
            } else {
                None
            },
        }
    }
}

/// The nullness fact: a frame of [`NullnessValue`]s plus the pending
/// null-test, if the block ended in one.
#[derive(Debug, Clone, PartialEq)]
pub struct NullnessFrame {
    frame: Frame<NullnessValue>,
    /// Set when the last transferred instruction was `ifnull`/`ifnonnull`
    /// over a value with a known source slot; consumed by the edge transfer.
    tested: Option<(u16, Cond)>,
}

impl NullnessFrame {
    /// Returns the nullness of a local slot.
    #[must_use]
    pub fn local(&self, slot: u16) -> Nullness {
        self.frame
            .local(slot)
            .map_or(Nullness::Unknown, |v| v.state)
    }

    /// Returns the nullness of the top-of-stack slot.
    #[must_use]
    pub fn top(&self) -> Nullness {
        self.frame.top().map_or(Nullness::Unknown, |v| v.state)
    }

    /// Returns the underlying frame.
    #[must_use]
    pub fn frame(&self) -> &Frame<NullnessValue> {
        &self.frame
    }

    fn refine_local(&mut self, slot: u16, state: Nullness) {
        self.frame.set_local(
            slot,
            NullnessValue {
                state,
                source_slot: Some(slot),
            },
        );
    }
}

impl MeetSemiLattice for NullnessFrame {
    fn meet(&self, other: &Self) -> Self {
        NullnessFrame {
            frame: self.frame.meet(&other.frame),
            tested: if self.tested == other.tested {
                self.tested
            } else {
                None
            },
        }
    }
}

/// Forward analysis computing [`NullnessFrame`] facts.
#[derive(Debug, Default)]
pub struct NullnessAnalysis;

impl NullnessAnalysis {
    /// Creates the analysis.
    #[must_use]
    pub fn new() -> Self {
        NullnessAnalysis
    }
}

impl DataflowAnalysis for NullnessAnalysis {
    type Fact = NullnessFrame;
    const DIRECTION: Direction = Direction::Forward;

    fn boundary(&self, cfg: &Cfg) -> NullnessFrame {
        let method = cfg.method();
        let mut frame = Frame::new(method.max_locals(), NullnessValue::unknown());
        if !method.is_static() {
            // `this` is never null.
            frame.set_local(
                0,
                NullnessValue {
                    state: Nullness::NonNull,
                    source_slot: Some(0),
                },
            );
        }
        NullnessFrame {
            frame,
            tested: None,
        }
    }

    #[allow(clippy::too_many_lines)]
    fn transfer(&self, fact: &mut NullnessFrame, insn: &Instruction, _loc: Location, _cfg: &Cfg) {
        fact.tested = None;
        match &insn.op {
            Op::Const(Const::Null) => {
                fact.frame.push(NullnessValue::of(Nullness::Null));
            }
            Op::Const(Const::String(_) | Const::Class(_)) => {
                fact.frame.push(NullnessValue::of(Nullness::NonNull));
            }
            Op::Load { kind: ValueKind::Ref, slot } => {
                let mut value = fact
                    .frame
                    .local(*slot)
                    .copied()
                    .unwrap_or_else(NullnessValue::unknown);
                value.source_slot = Some(*slot);
                fact.frame.push(value);
            }
            Op::Store { kind: ValueKind::Ref, slot } => {
                let mut value = fact
                    .frame
                    .pop()
                    .unwrap_or_else(NullnessValue::unknown);
                value.source_slot = Some(*slot);
                fact.frame.set_local(*slot, value);
            }
            Op::Store { kind, slot } => {
                fact.frame.pop_n(kind.slot_width());
                fact.frame.set_local(*slot, NullnessValue::unknown());
                if kind.is_wide() {
                    fact.frame.set_local(slot + 1, NullnessValue::unknown());
                }
            }
            Op::New(_) | Op::NewArray { .. } => {
                fact.frame.pop_n(insn.op.stack_slots_consumed());
                fact.frame.push(NullnessValue::of(Nullness::NonNull));
            }
            Op::Stack(op) => {
                fact.frame.apply_stack_op(*op);
            }
            Op::CheckCast(_) => {
                // checkcast preserves the reference (and its nullness).
            }
            Op::GetField(_) | Op::PutField(_) => {
                let receiver_depth = insn.op.stack_slots_consumed() - 1;
                self.refine_dereferenced(fact, receiver_depth);
                fact.frame.apply_generic(
                    insn.op.stack_slots_consumed(),
                    insn.op.stack_slots_produced(),
                    NullnessValue::unknown(),
                );
            }
            Op::Invoke { kind, method } if kind.has_receiver() => {
                let receiver_depth = method.arg_slot_width();
                self.refine_dereferenced(fact, receiver_depth);
                fact.frame.apply_generic(
                    insn.op.stack_slots_consumed(),
                    insn.op.stack_slots_produced(),
                    NullnessValue::unknown(),
                );
            }
            Op::ArrayLoad(_) | Op::ArrayStore(_) | Op::ArrayLength | Op::MonitorEnter => {
                let receiver_depth = insn.op.stack_slots_consumed() - 1;
                self.refine_dereferenced(fact, receiver_depth);
                fact.frame.apply_generic(
                    insn.op.stack_slots_consumed(),
                    insn.op.stack_slots_produced(),
                    NullnessValue::unknown(),
                );
            }
            Op::Branch { cond, .. } if cond.is_null_test() => {
                let operand = fact.frame.pop().unwrap_or_else(NullnessValue::unknown);
                fact.tested = operand.source_slot.map(|slot| (slot, *cond));
            }
            op => {
                fact.frame.apply_generic(
                    op.stack_slots_consumed(),
                    op.stack_slots_produced(),
                    NullnessValue::unknown(),
                );
            }
        }
    }

    fn edge_transfer(&self, fact: &NullnessFrame, edge: &CfgEdge, _cfg: &Cfg) -> NullnessFrame {
        let mut out = fact.clone();
        let tested = out.tested.take();
        match edge.kind() {
            EdgeKind::HandledException { .. } | EdgeKind::UnhandledException => {
                out.frame.clear_stack();
                // The thrown reference being dispatched is never null.
                out.frame.push(NullnessValue::of(Nullness::NonNull));
            }
            EdgeKind::BranchTaken | EdgeKind::FallThrough => {
                if let Some((slot, cond)) = tested {
                    let taken = matches!(edge.kind(), EdgeKind::BranchTaken);
                    let is_null_here = match cond {
                        Cond::IsNull => taken,
                        Cond::NonNull => !taken,
                        // tested is only set for the two null-test conditions
                        _ => return out,
                    };
                    if is_null_here {
                        out.refine_local(slot, Nullness::Null);
                    } else {
                        out.refine_local(slot, Nullness::CheckedNonNull);
                    }
                }
            }
            _ => {}
        }
        out
    }
}

impl NullnessAnalysis {
    /// A dereference that did not throw proves the receiver non-null on the
    /// continuing path; write that back through its source slot.
    fn refine_dereferenced(&self, fact: &mut NullnessFrame, receiver_depth: usize) {
        let Some(receiver) = fact.frame.peek(receiver_depth) else {
            return;
        };
        if let Some(slot) = receiver.source_slot {
            if !fact.local(slot).is_definitely_non_null() {
                fact.refine_local(slot, Nullness::NonNull);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::{
            cfg::{build_cfg, BlockId},
            dataflow::{lattice::laws::assert_meet_laws, Dataflow, DataflowSolver},
        },
        bytecode::MethodBody,
        test::asm::MethodBuilder,
    };

    fn solve(method: MethodBody) -> Dataflow<NullnessAnalysis> {
        let cfg = Arc::new(build_cfg(Arc::new(method)).expect("CFG"));
        DataflowSolver::new(NullnessAnalysis::new()).solve(cfg)
    }

    #[test]
    fn meet_laws_hold() {
        use Nullness::{CheckedNonNull, NonNull, Null, Nullable, Unknown};
        assert_meet_laws(&[Unknown, Null, NonNull, CheckedNonNull, Nullable]);
    }

    #[test]
    fn null_meets_non_null_as_nullable() {
        assert_eq!(
            Nullness::Null.meet(&Nullness::NonNull),
            Nullness::Nullable
        );
        assert_eq!(
            Nullness::CheckedNonNull.meet(&Nullness::NonNull),
            Nullness::NonNull
        );
        assert_eq!(Nullness::Unknown.meet(&Nullness::Null), Nullness::Null);
    }

    #[test]
    fn ifnonnull_narrows_fall_through_and_taken() {
        // o = unknown; if (o != null) { use(o); } else { ... }
        //
        //   aload 1
        //   ifnull "else"        <- taken means o == null
        //   aload 1              <- fall-through: o proven non-null
        //   invokevirtual use
        //   return
        // else:
        //   return
        let method = MethodBuilder::new_static(2)
            .aload(1)
            .ifnull("else")
            .aload(1)
            .invokevirtual("com/example/O", "use", "()V")
            .return_()
            .label("else")
            .return_()
            .finish();
        let flow = solve(method);

        // Fall-through block: slot 1 checked non-null.
        let body = BlockId::new(1);
        let at_entry = flow.fact_at_block_start(body).expect("visited");
        assert_eq!(at_entry.local(1), Nullness::CheckedNonNull);
        assert!(at_entry.local(1).is_definitely_non_null());

        // Taken block: slot 1 known null.
        let else_block = BlockId::new(2);
        let at_else = flow.fact_at_block_start(else_block).expect("visited");
        assert_eq!(at_else.local(1), Nullness::Null);
    }

    #[test]
    fn null_and_non_null_paths_merge_to_nullable() {
        //   iload 0
        //   ifeq "else"
        //   aconst_null; astore 1; goto "join"
        // else:
        //   new O; astore 1
        // join:
        //   return
        let method = MethodBuilder::new_static(2)
            .iload(0)
            .ifeq("else")
            .aconst_null()
            .astore(1)
            .goto_("join")
            .label("else")
            .new_object("com/example/O")
            .astore(1)
            .label("join")
            .return_()
            .finish();
        let flow = solve(method);

        let join = BlockId::new(3);
        let fact = flow.fact_at_block_start(join).expect("visited");
        assert_eq!(fact.local(1), Nullness::Nullable);
        assert!(fact.local(1).may_be_null());
    }

    #[test]
    fn aconst_null_flows_to_store() {
        let method = MethodBuilder::new_static(2)
            .aconst_null()
            .astore(1)
            .aload(1)
            .return_()
            .finish();
        let flow = solve(method);

        let last = Location::new(BlockId::new(0), 3);
        let fact = flow.fact_before(last).expect("visited");
        assert_eq!(fact.local(1), Nullness::Null);
        assert_eq!(fact.top(), Nullness::Null);
    }

    #[test]
    fn dereference_refines_source_slot() {
        //   aload 1
        //   invokevirtual foo   <- if this returns, slot 1 was non-null
        //   return
        let method = MethodBuilder::new_static(2)
            .aload(1)
            .invokevirtual("com/example/O", "foo", "()V")
            .return_()
            .finish();
        let flow = solve(method);

        let after = Location::new(BlockId::new(0), 1);
        let fact = flow.fact_after(after).expect("visited");
        assert_eq!(fact.local(1), Nullness::NonNull);
    }

    #[test]
    fn receiver_slot_zero_is_non_null() {
        let method = MethodBuilder::new_instance(1)
            .aload(0)
            .return_()
            .finish();
        let flow = solve(method);

        let start = Location::new(BlockId::new(0), 0);
        let fact = flow.fact_before(start).expect("visited");
        assert_eq!(fact.local(0), Nullness::NonNull);
    }
}
