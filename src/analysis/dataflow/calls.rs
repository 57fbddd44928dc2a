//! Call-list analysis: the sequence of calls reaching a point.
//!
//! The fact is the ordered list of invocations every path to a point has
//! performed, capped at a small length so the lattice stays finite, plus a
//! provenance frame that names where each call's receiver came from. The
//! meet is the longest common prefix: a call remains in the list only if it
//! was made, in the same position, with the same receiver, on every incoming
//! path. Detectors use this to recognise multi-call idioms (`iterator()`
//! followed by `next()` with no `hasNext()`, and similar), and the receiver
//! origin lets them tell two calls on the same object apart from two calls
//! on unrelated ones.

use crate::{
    analysis::{
        cfg::{Cfg, CfgEdge, Location},
        dataflow::{
            frame::Frame,
            framework::{DataflowAnalysis, Direction},
            lattice::MeetSemiLattice,
        },
    },
    bytecode::{FieldRef, Instruction, MethodRef, Op, ValueKind},
};

/// Provenance of one call operand, tracked only far enough to name the
/// receiver of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// No receiver (`invokestatic`, `invokedynamic`).
    None,
    /// The method receiver.
    This,
    /// The reference held by a local slot.
    Local(u16),
    /// The value of a static or instance field.
    Field(FieldRef),
    /// The result of the earlier call at the given pc (chained calls).
    Result(u32),
    /// Untracked.
    Unknown,
}

impl MeetSemiLattice for Origin {
    fn meet(&self, other: &Self) -> Self {
        if self == other {
            self.clone()
        } else {
            Origin::Unknown
        }
    }
}

/// One observed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// The byte offset of the `invoke` instruction.
    pub pc: u32,
    /// The callee.
    pub method: MethodRef,
    /// Where the receiver came from ([`Origin::None`] for receiverless
    /// dispatch kinds).
    pub receiver: Origin,
}

/// The ordered list of calls every path to this point has made, plus the
/// operand provenance frame the receivers are read from.
#[derive(Debug, Clone, PartialEq)]
pub struct CallList {
    frame: Frame<Origin>,
    calls: Vec<CallSite>,
}

impl CallList {
    /// The maximum tracked sequence length; later calls are dropped.
    pub const MAX_CALLS: usize = 16;

    /// Returns the tracked calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> &[CallSite] {
        &self.calls
    }

    /// Returns the most recent tracked call.
    #[must_use]
    pub fn last(&self) -> Option<&CallSite> {
        self.calls.last()
    }

    /// Returns `true` if some tracked call targets the given method name.
    #[must_use]
    pub fn contains_call_to(&self, name: &str) -> bool {
        self.calls.iter().any(|site| site.method.name == name)
    }

    fn record(&mut self, site: CallSite) {
        if self.calls.len() < Self::MAX_CALLS {
            self.calls.push(site);
        }
    }
}

impl MeetSemiLattice for CallList {
    fn meet(&self, other: &Self) -> Self {
        let common = self
            .calls
            .iter()
            .zip(&other.calls)
            .take_while(|(a, b)| a == b)
            .count();
        CallList {
            frame: self.frame.meet(&other.frame),
            calls: self.calls[..common].to_vec(),
        }
    }
}

/// Forward analysis computing [`CallList`] facts.
#[derive(Debug, Default)]
pub struct CallListAnalysis;

impl CallListAnalysis {
    /// Creates the analysis.
    #[must_use]
    pub fn new() -> Self {
        CallListAnalysis
    }
}

impl DataflowAnalysis for CallListAnalysis {
    type Fact = CallList;
    const DIRECTION: Direction = Direction::Forward;

    fn boundary(&self, cfg: &Cfg) -> CallList {
        let method = cfg.method();
        let mut frame = Frame::new(method.max_locals(), Origin::Unknown);
        for slot in 0..method.max_locals() {
            frame.set_local(slot, Origin::Local(slot));
        }
        if !method.is_static() {
            frame.set_local(0, Origin::This);
        }
        CallList {
            frame,
            calls: Vec::new(),
        }
    }

    fn transfer(&self, fact: &mut CallList, insn: &Instruction, _loc: Location, _cfg: &Cfg) {
        match &insn.op {
            Op::Load { kind: ValueKind::Ref, slot } => {
                let value = fact
                    .frame
                    .local(*slot)
                    .cloned()
                    .unwrap_or(Origin::Unknown);
                fact.frame.push(value);
            }
            Op::Store { kind: ValueKind::Ref, slot } => {
                let value = match fact.frame.pop() {
                    // The slot becomes the canonical identity for untracked
                    // references stored into it.
                    Some(Origin::Unknown) | None => Origin::Local(*slot),
                    Some(tracked) => tracked,
                };
                fact.frame.set_local(*slot, value);
            }
            Op::Store { kind, slot } => {
                fact.frame.pop_n(kind.slot_width());
                fact.frame.set_local(*slot, Origin::Unknown);
                if kind.is_wide() {
                    fact.frame.set_local(slot + 1, Origin::Unknown);
                }
            }
            Op::GetStatic(field) if field.is_reference() => {
                fact.frame.push(Origin::Field(field.clone()));
            }
            Op::GetField(field) if field.is_reference() => {
                fact.frame.pop_n(1);
                fact.frame.push(Origin::Field(field.clone()));
            }
            Op::Stack(op) => {
                fact.frame.apply_stack_op(*op);
            }
            Op::Invoke { kind, method } => {
                // The receiver sits below the declared argument slots.
                let receiver = if kind.has_receiver() {
                    fact.frame
                        .peek(method.arg_slot_width())
                        .cloned()
                        .unwrap_or(Origin::Unknown)
                } else {
                    Origin::None
                };
                fact.record(CallSite {
                    pc: insn.pc,
                    method: method.clone(),
                    receiver,
                });

                let produced = insn.op.stack_slots_produced();
                fact.frame.pop_n(insn.op.stack_slots_consumed());
                let returns_reference = matches!(
                    method.return_descriptor().as_bytes().first(),
                    Some(b'L' | b'[')
                );
                if produced == 1 && returns_reference {
                    fact.frame.push(Origin::Result(insn.pc));
                } else {
                    for _ in 0..produced {
                        fact.frame.push(Origin::Unknown);
                    }
                }
            }
            op => {
                fact.frame.apply_generic(
                    op.stack_slots_consumed(),
                    op.stack_slots_produced(),
                    Origin::Unknown,
                );
            }
        }
    }

    fn edge_transfer(&self, fact: &CallList, edge: &CfgEdge, _cfg: &Cfg) -> CallList {
        if !edge.kind().is_exception() {
            return fact.clone();
        }
        // Handler entry: the JVM discards the operand stack and pushes the
        // thrown reference.
        let mut out = fact.clone();
        out.frame.clear_stack();
        out.frame.push(Origin::Unknown);
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::{
            cfg::{build_cfg, BlockId},
            dataflow::{Dataflow, DataflowSolver},
        },
        bytecode::MethodBody,
        test::asm::MethodBuilder,
    };

    fn solve(method: MethodBody) -> Dataflow<CallListAnalysis> {
        let cfg = Arc::new(build_cfg(Arc::new(method)).expect("CFG"));
        DataflowSolver::new(CallListAnalysis::new()).solve(cfg)
    }

    #[test]
    fn calls_accumulate_in_order() {
        let method = MethodBuilder::new_static(1)
            .invokestatic("com/example/A", "first", "()V")
            .invokestatic("com/example/A", "second", "()V")
            .return_()
            .finish();
        let flow = solve(method);

        let fact = flow
            .fact_at_block_end(BlockId::new(0))
            .expect("visited");
        let names: Vec<&str> = fact
            .calls()
            .iter()
            .map(|site| site.method.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(fact.contains_call_to("second"));
    }

    #[test]
    fn meet_keeps_the_common_prefix() {
        //   invokestatic shared
        //   iload 0; ifeq "else"
        //   invokestatic left; goto "join"
        // else:
        //   invokestatic right
        // join:
        //   return
        let method = MethodBuilder::new_static(1)
            .invokestatic("com/example/A", "shared", "()V")
            .iload(0)
            .ifeq("else")
            .invokestatic("com/example/A", "left", "()V")
            .goto_("join")
            .label("else")
            .invokestatic("com/example/A", "right", "()V")
            .label("join")
            .return_()
            .finish();
        let flow = solve(method);

        let join = BlockId::new(3);
        let fact = flow.fact_at_block_start(join).expect("visited");
        assert_eq!(fact.calls().len(), 1);
        assert_eq!(fact.last().map(|s| s.method.name.as_str()), Some("shared"));
    }

    #[test]
    fn list_is_capped() {
        let mut builder = MethodBuilder::new_static(0);
        for _ in 0..(CallList::MAX_CALLS + 4) {
            builder = builder.invokestatic("com/example/A", "poke", "()V");
        }
        let flow = solve(builder.return_().finish());

        let fact = flow
            .fact_at_block_end(BlockId::new(0))
            .expect("visited");
        assert_eq!(fact.calls().len(), CallList::MAX_CALLS);
    }

    #[test]
    fn receiver_origin_distinguishes_call_sites() {
        // Same callee on two different locals: the sites must not compare
        // equal by callee alone.
        let method = MethodBuilder::new_static(3)
            .aload(1)
            .invokevirtual("com/example/C", "poke", "()V")
            .aload(2)
            .invokevirtual("com/example/C", "poke", "()V")
            .return_()
            .finish();
        let flow = solve(method);

        let fact = flow
            .fact_at_block_end(BlockId::new(0))
            .expect("visited");
        let calls = fact.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].receiver, Origin::Local(1));
        assert_eq!(calls[1].receiver, Origin::Local(2));
        assert_ne!(calls[0].receiver, calls[1].receiver);

        // Same local twice gives the same receiver origin.
        let method = MethodBuilder::new_static(2)
            .aload(1)
            .invokevirtual("com/example/C", "poke", "()V")
            .aload(1)
            .invokevirtual("com/example/C", "poke", "()V")
            .return_()
            .finish();
        let flow = solve(method);
        let fact = flow
            .fact_at_block_end(BlockId::new(0))
            .expect("visited");
        assert_eq!(fact.calls()[0].receiver, fact.calls()[1].receiver);
    }

    #[test]
    fn chained_call_receiver_is_the_producing_site() {
        // toString() on the value maybeNull() returned.
        let method = MethodBuilder::new_static(1)
            .invokestatic("com/example/C", "maybeNull", "()Ljava/lang/Object;")
            .invokevirtual("java/lang/Object", "toString", "()Ljava/lang/String;")
            .astore(0)
            .return_()
            .finish();
        let flow = solve(method);

        let fact = flow
            .fact_at_block_end(BlockId::new(0))
            .expect("visited");
        let calls = fact.calls();
        assert_eq!(calls[0].receiver, Origin::None);
        assert_eq!(calls[1].receiver, Origin::Result(0));
    }

    #[test]
    fn receiver_on_this_and_on_a_field() {
        let method = MethodBuilder::new_instance(1)
            .aload(0)
            .invokevirtual("com/example/C", "poke", "()V")
            .getstatic("com/example/C", "out", "Ljava/io/PrintStream;")
            .invokevirtual("java/io/PrintStream", "flush", "()V")
            .return_()
            .finish();
        let flow = solve(method);

        let fact = flow
            .fact_at_block_end(BlockId::new(0))
            .expect("visited");
        let calls = fact.calls();
        assert_eq!(calls[0].receiver, Origin::This);
        assert_eq!(
            calls[1].receiver,
            Origin::Field(FieldRef::new("com/example/C", "out", "Ljava/io/PrintStream;"))
        );
    }
}
