//! Value numbering: opaque equivalence ids for stack and local slots.
//!
//! Two slots carry the same [`ValueId`] only if they provably hold the same
//! value: ids are minted fresh for every computed value and propagate
//! unchanged through loads, stores and the `dup` family. At a control-flow
//! merge, differing ids combine into a merge id so two syntactically
//! different computations are never falsely considered equal, while one
//! computation reaching the merge along several paths keeps its id.
//!
//! # Determinism and termination
//!
//! Minting happens through caches keyed by the producing location (or the
//! ordered pair of merged ids), so re-running a transfer or meet yields the
//! same ids. Without the caches the fixpoint would mint a fresh id per
//! iteration and never converge. The caches live behind a `RefCell` on the
//! analysis value; the engine is single-threaded per method by contract.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use crate::{
    analysis::{
        cfg::{Cfg, CfgEdge, Location},
        dataflow::{
            frame::Frame,
            framework::{DataflowAnalysis, Direction},
            lattice::MeetSemiLattice,
        },
    },
    bytecode::{Instruction, Op, ValueKind},
};

/// An opaque value-equivalence id. Ids are only comparable within the
/// analysis run that minted them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    /// Returns the raw id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl MeetSemiLattice for ValueId {
    /// Fallback meet used only when a [`ValueFrame`] is combined outside the
    /// analysis (the solver always routes through
    /// [`ValueNumberAnalysis::meet`], which mints cached merge ids instead).
    fn meet(&self, other: &Self) -> Self {
        if self == other {
            *self
        } else {
            ValueId(u32::MAX)
        }
    }
}

/// The value-numbering fact: one [`ValueId`] per slot.
pub type ValueFrame = Frame<ValueId>;

#[derive(Debug, Default)]
struct NumberingState {
    next: u32,
    /// Ids produced by each instruction, keyed by (location, output slot).
    produced: HashMap<(Location, usize), ValueId>,
    /// Merge ids, keyed by the ordered pair of merged ids.
    merged: HashMap<(ValueId, ValueId), ValueId>,
    /// Ids for values entering along an edge (exception objects), keyed by
    /// edge index.
    edge_values: HashMap<usize, ValueId>,
    /// Ids of the locals at ENTRY, minted once.
    boundary: Option<Vec<ValueId>>,
}

impl NumberingState {
    fn fresh(&mut self) -> ValueId {
        let id = ValueId(self.next);
        self.next += 1;
        id
    }

    fn produced_at(&mut self, location: Location, index: usize) -> ValueId {
        if let Some(&id) = self.produced.get(&(location, index)) {
            return id;
        }
        let id = self.fresh();
        self.produced.insert((location, index), id);
        id
    }

    fn merge(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(&id) = self.merged.get(&key) {
            return id;
        }
        let id = self.fresh();
        self.merged.insert(key, id);
        id
    }
}

/// Forward analysis assigning equivalence ids to every slot.
#[derive(Debug, Default)]
pub struct ValueNumberAnalysis {
    state: RefCell<NumberingState>,
}

impl ValueNumberAnalysis {
    /// Creates the analysis with an empty numbering.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataflowAnalysis for ValueNumberAnalysis {
    type Fact = ValueFrame;
    const DIRECTION: Direction = Direction::Forward;

    fn boundary(&self, cfg: &Cfg) -> ValueFrame {
        let method = cfg.method();
        let max_locals = method.max_locals();
        let mut state = self.state.borrow_mut();
        if state.boundary.is_none() {
            let ids = (0..max_locals).map(|_| state.fresh()).collect();
            state.boundary = Some(ids);
        }
        let ids = state.boundary.clone().unwrap_or_default();
        drop(state);

        let mut frame = Frame::new(max_locals, ValueId(u32::MAX));
        for (slot, id) in (0..max_locals).zip(ids) {
            frame.set_local(slot, id);
        }
        frame
    }

    fn transfer(&self, fact: &mut ValueFrame, insn: &Instruction, loc: Location, _cfg: &Cfg) {
        match &insn.op {
            Op::Load { kind, slot } => {
                let width = kind.slot_width() as u16;
                for offset in 0..width {
                    let id = fact.local(slot + offset).copied().unwrap_or_else(|| {
                        self.state.borrow_mut().produced_at(loc, usize::from(offset))
                    });
                    fact.push(id);
                }
            }
            Op::Store { kind, slot } => {
                let width = kind.slot_width() as u16;
                // The value slots were pushed bottom-first; pop in reverse.
                for offset in (0..width).rev() {
                    let id = fact.pop().unwrap_or_else(|| {
                        self.state.borrow_mut().produced_at(loc, usize::from(offset))
                    });
                    fact.set_local(slot + offset, id);
                }
            }
            Op::Stack(op) => {
                fact.apply_stack_op(*op);
            }
            Op::CheckCast(_) => {
                // A successful cast is the same reference.
            }
            Op::Iinc { slot, .. } => {
                let id = self.state.borrow_mut().produced_at(loc, 0);
                fact.set_local(*slot, id);
            }
            op => {
                fact.pop_n(op.stack_slots_consumed());
                let mut state = self.state.borrow_mut();
                for index in 0..op.stack_slots_produced() {
                    fact.push(state.produced_at(loc, index));
                }
            }
        }
    }

    fn edge_transfer(&self, fact: &ValueFrame, edge: &CfgEdge, _cfg: &Cfg) -> ValueFrame {
        if !edge.kind().is_exception() {
            return fact.clone();
        }
        let mut out = fact.clone();
        out.clear_stack();
        let id = {
            let mut state = self.state.borrow_mut();
            match state.edge_values.get(&edge.id().index()) {
                Some(&id) => id,
                None => {
                    let id = state.fresh();
                    state.edge_values.insert(edge.id().index(), id);
                    id
                }
            }
        };
        out.push(id);
        out
    }

    fn meet(&self, a: &ValueFrame, b: &ValueFrame) -> ValueFrame {
        let mut state = self.state.borrow_mut();
        let mut result = a.clone();
        result.merge_with(b, |x, y| if x == y { *x } else { state.merge(*x, *y) });
        result
    }
}
