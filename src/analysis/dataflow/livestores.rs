//! Live-store analysis: which local stores may still be read.
//!
//! A backward bitset analysis over local slots. A slot's bit is set when the
//! value most recently stored into it may be loaded later on some path; a
//! `store` whose slot bit is clear immediately after it is a dead store, the
//! classic symptom of a value computed and dropped (often inside an
//! exception handler).
//!
//! The meet is set union (a slot is live if read on *any* outgoing path),
//! and the boundary at EXIT is the empty set: nothing outlives the method.

use crate::{
    analysis::{
        cfg::{Cfg, Location},
        dataflow::{
            framework::{DataflowAnalysis, Dataflow, Direction},
            lattice::MeetSemiLattice,
        },
    },
    bytecode::{Instruction, Op},
    utils::BitSet,
};

/// The set of local slots whose most recent store may still be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSlots(BitSet);

impl LiveSlots {
    /// Creates an empty set over `max_locals` slots.
    #[must_use]
    pub fn empty(max_locals: u16) -> Self {
        LiveSlots(BitSet::new(usize::from(max_locals)))
    }

    /// Returns `true` if the slot's pending store may be read later.
    #[must_use]
    pub fn is_live(&self, slot: u16) -> bool {
        let index = usize::from(slot);
        index < self.0.len() && self.0.contains(index)
    }

    /// Returns the number of live slots.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.count()
    }

    fn read(&mut self, slot: u16, wide: bool) {
        self.insert(slot);
        if wide {
            self.insert(slot + 1);
        }
    }

    fn killed(&mut self, slot: u16, wide: bool) {
        self.remove(slot);
        if wide {
            self.remove(slot + 1);
        }
    }

    fn insert(&mut self, slot: u16) {
        let index = usize::from(slot);
        if index < self.0.len() {
            self.0.insert(index);
        }
    }

    fn remove(&mut self, slot: u16) {
        let index = usize::from(slot);
        if index < self.0.len() {
            self.0.remove(index);
        }
    }
}

impl MeetSemiLattice for LiveSlots {
    fn meet(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.0.union_with(&other.0);
        result
    }
}

/// Backward analysis computing [`LiveSlots`] facts.
#[derive(Debug, Default)]
pub struct LiveStoreAnalysis;

impl LiveStoreAnalysis {
    /// Creates the analysis.
    #[must_use]
    pub fn new() -> Self {
        LiveStoreAnalysis
    }

    /// Returns whether the store at `location` is dead: the stored value can
    /// never be read. Returns `None` when the location is not a store or its
    /// block was never visited.
    #[must_use]
    pub fn store_is_dead(flow: &Dataflow<Self>, location: Location) -> Option<bool> {
        let insn = flow.cfg().instruction_at(location)?;
        let Op::Store { slot, .. } = insn.op else {
            return None;
        };
        let after = flow.fact_after(location)?;
        Some(!after.is_live(slot))
    }
}

impl DataflowAnalysis for LiveStoreAnalysis {
    type Fact = LiveSlots;
    const DIRECTION: Direction = Direction::Backward;

    fn boundary(&self, cfg: &Cfg) -> LiveSlots {
        LiveSlots::empty(cfg.method().max_locals())
    }

    fn transfer(&self, fact: &mut LiveSlots, insn: &Instruction, _loc: Location, _cfg: &Cfg) {
        match &insn.op {
            Op::Load { kind, slot } => fact.read(*slot, kind.is_wide()),
            Op::Store { kind, slot } => fact.killed(*slot, kind.is_wide()),
            // iinc reads before it writes; the old value is live above it.
            Op::Iinc { slot, .. } => fact.read(*slot, false),
            Op::Ret { slot } => fact.read(*slot, false),
            _ => {}
        }
    }
}
