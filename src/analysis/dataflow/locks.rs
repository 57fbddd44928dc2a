//! Lock-set analysis: which monitors are provably held at each point.
//!
//! The fact is a multiset of symbolically-identified locks plus a small
//! provenance frame that tracks, per slot, where a reference came from, just
//! enough to name the operand of a `monitorenter`. Locks are identified by
//! local slot, by field, or by the receiver; anything else collapses to a
//! single synthetic unknown id.
//!
//! The meet intersects held counts (a lock counts as held only if held on
//! every incoming path), so the analysis answers "is this location inside a
//! synchronized region on `x`" soundly for the usual javac `synchronized`
//! shape (`astore tmp; monitorenter; … aload tmp; monitorexit`).

use std::collections::BTreeMap;

use crate::{
    analysis::{
        cfg::{Cfg, CfgEdge, Location},
        dataflow::{
            frame::Frame,
            framework::{DataflowAnalysis, Direction},
            lattice::MeetSemiLattice,
        },
    },
    bytecode::{FieldRef, Instruction, Op, ValueKind},
};

/// The symbolic identity of a monitor object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockName {
    /// The method receiver (`synchronized (this)` and synchronized methods'
    /// inlined bodies).
    This,
    /// Whatever reference the given local slot holds at the enter/exit pair.
    Local(u16),
    /// A static or instance field.
    Field(FieldRef),
    /// A lock whose identity could not be tracked.
    Unknown,
}

/// Provenance of one reference slot, tracked only far enough to name locks.
#[derive(Debug, Clone, PartialEq)]
pub enum LockValue {
    /// The method receiver.
    This,
    /// The reference currently held by a local slot.
    Local(u16),
    /// The value of a static field.
    Static(FieldRef),
    /// The value of an instance field (receiver identity not tracked).
    Instance(FieldRef),
    /// Untracked.
    Other,
}

impl LockValue {
    fn lock_name(&self) -> LockName {
        match self {
            LockValue::This => LockName::This,
            LockValue::Local(slot) => LockName::Local(*slot),
            LockValue::Static(field) | LockValue::Instance(field) => {
                LockName::Field(field.clone())
            }
            LockValue::Other => LockName::Unknown,
        }
    }
}

impl MeetSemiLattice for LockValue {
    fn meet(&self, other: &Self) -> Self {
        if self == other {
            self.clone()
        } else {
            LockValue::Other
        }
    }
}

/// The lock-set fact: held-monitor counts plus the provenance frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LockSet {
    frame: Frame<LockValue>,
    held: BTreeMap<LockName, u32>,
}

impl LockSet {
    /// Returns the held monitors with their nesting counts.
    #[must_use]
    pub fn held(&self) -> &BTreeMap<LockName, u32> {
        &self.held
    }

    /// Returns `true` if the given lock is held on every path to this point.
    #[must_use]
    pub fn holds(&self, lock: &LockName) -> bool {
        self.held.get(lock).copied().unwrap_or(0) > 0
    }

    /// Returns the total monitor-nesting depth.
    #[must_use]
    pub fn lock_count(&self) -> u32 {
        self.held.values().sum()
    }

    /// Returns `true` if any monitor is held, i.e. the point is inside some
    /// synchronized region.
    #[must_use]
    pub fn in_synchronized_region(&self) -> bool {
        self.lock_count() > 0
    }

    fn enter(&mut self, lock: LockName) {
        *self.held.entry(lock).or_insert(0) += 1;
    }

    fn exit(&mut self, lock: &LockName) {
        // A monitorexit with no matching enter (exception cleanup paths) is
        // ignored rather than underflowing.
        if let Some(count) = self.held.get_mut(lock) {
            *count -= 1;
            if *count == 0 {
                self.held.remove(lock);
            }
        }
    }
}

impl MeetSemiLattice for LockSet {
    fn meet(&self, other: &Self) -> Self {
        let mut held = BTreeMap::new();
        for (lock, &count) in &self.held {
            if let Some(&other_count) = other.held.get(lock) {
                held.insert(lock.clone(), count.min(other_count));
            }
        }
        LockSet {
            frame: self.frame.meet(&other.frame),
            held,
        }
    }
}

/// Forward analysis computing [`LockSet`] facts.
#[derive(Debug, Default)]
pub struct LockSetAnalysis;

impl LockSetAnalysis {
    /// Creates the analysis.
    #[must_use]
    pub fn new() -> Self {
        LockSetAnalysis
    }
}

impl DataflowAnalysis for LockSetAnalysis {
    type Fact = LockSet;
    const DIRECTION: Direction = Direction::Forward;

    fn boundary(&self, cfg: &Cfg) -> LockSet {
        let method = cfg.method();
        let mut frame = Frame::new(method.max_locals(), LockValue::Other);
        for slot in 0..method.max_locals() {
            frame.set_local(slot, LockValue::Local(slot));
        }
        if !method.is_static() {
            frame.set_local(0, LockValue::This);
        }
        LockSet {
            frame,
            held: BTreeMap::new(),
        }
    }

    fn transfer(&self, fact: &mut LockSet, insn: &Instruction, _loc: Location, _cfg: &Cfg) {
        match &insn.op {
            Op::Load { kind: ValueKind::Ref, slot } => {
                let value = fact
                    .frame
                    .local(*slot)
                    .cloned()
                    .unwrap_or(LockValue::Other);
                fact.frame.push(value);
            }
            Op::Store { kind: ValueKind::Ref, slot } => {
                let value = match fact.frame.pop() {
                    // The slot becomes the canonical identity for untracked
                    // references stored into it.
                    Some(LockValue::Other) | None => LockValue::Local(*slot),
                    Some(tracked) => tracked,
                };
                fact.frame.set_local(*slot, value);
            }
            Op::Store { kind, slot } => {
                fact.frame.pop_n(kind.slot_width());
                fact.frame.set_local(*slot, LockValue::Other);
                if kind.is_wide() {
                    fact.frame.set_local(slot + 1, LockValue::Other);
                }
            }
            Op::GetStatic(field) if field.is_reference() => {
                fact.frame.push(LockValue::Static(field.clone()));
            }
            Op::GetField(field) if field.is_reference() => {
                fact.frame.pop_n(1);
                fact.frame.push(LockValue::Instance(field.clone()));
            }
            Op::Stack(op) => {
                fact.frame.apply_stack_op(*op);
            }
            Op::MonitorEnter => {
                let lock = fact
                    .frame
                    .pop()
                    .map_or(LockName::Unknown, |v| v.lock_name());
                fact.enter(lock);
            }
            Op::MonitorExit => {
                let lock = fact
                    .frame
                    .pop()
                    .map_or(LockName::Unknown, |v| v.lock_name());
                fact.exit(&lock);
            }
            op => {
                fact.frame.apply_generic(
                    op.stack_slots_consumed(),
                    op.stack_slots_produced(),
                    LockValue::Other,
                );
            }
        }
    }

    fn edge_transfer(&self, fact: &LockSet, edge: &CfgEdge, _cfg: &Cfg) -> LockSet {
        if !edge.kind().is_exception() {
            return fact.clone();
        }
        // Handler entry: the JVM discards the operand stack and pushes the
        // thrown reference.
        let mut out = fact.clone();
        out.frame.clear_stack();
        out.frame.push(LockValue::Other);
        out
    }
}
