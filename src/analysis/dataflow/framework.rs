//! The dataflow analysis trait and the queryable result type.
//!
//! An analysis implements [`DataflowAnalysis`]: a direction, a boundary fact
//! for the seed sentinel, and a per-instruction transfer function. The
//! [`solver`](crate::analysis::dataflow::DataflowSolver) iterates it to a
//! fixpoint and hands back a [`Dataflow`], which answers fact queries at any
//! [`Location`].
//!
//! # Unvisited vs empty
//!
//! A block the solver never reached holds [`BlockFact::Unvisited`], which is
//! not a fact at all: queries against it return `None`, and the solver never
//! feeds it into a meet. A block that was reached with no information holds
//! `Valid(fact)` where the fact happens to be empty. Keeping the two apart is
//! a hard contract of this engine; callers must branch on the `Option` before
//! using a fact.

use std::sync::Arc;

use crate::{
    analysis::{
        cfg::{BlockId, Cfg, CfgEdge, Location},
        dataflow::lattice::MeetSemiLattice,
    },
    bytecode::Instruction,
};

/// Direction of a dataflow analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Facts flow from ENTRY towards EXIT; a block's starting fact is the
    /// meet over its predecessors' ending facts.
    Forward,
    /// Facts flow from EXIT towards ENTRY; a block's ending fact is the
    /// meet over its successors' starting facts.
    Backward,
}

/// The per-block fact slot maintained by the solver.
///
/// `Unvisited` means the solver never computed a fact for the block (it is
/// unreachable, or not reached yet mid-iteration). It is distinct from any
/// valid fact, including an empty one.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockFact<L> {
    /// No fact was ever computed for this block.
    Unvisited,
    /// A computed fact.
    Valid(L),
}

impl<L> BlockFact<L> {
    /// Returns the fact if one was computed.
    #[must_use]
    pub fn valid(&self) -> Option<&L> {
        match self {
            BlockFact::Unvisited => None,
            BlockFact::Valid(fact) => Some(fact),
        }
    }

    /// Returns `true` if a fact was computed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, BlockFact::Valid(_))
    }
}

/// A dataflow analysis: lattice, direction, boundary and transfer.
///
/// The solver calls [`transfer`](DataflowAnalysis::transfer) once per
/// instruction in direction order, [`edge_transfer`](DataflowAnalysis::edge_transfer)
/// once per traversed edge, and [`meet`](DataflowAnalysis::meet) to combine
/// facts at merge points. The two hooks have identity defaults; nullness
/// overrides `edge_transfer` to narrow on branch outcomes, and value
/// numbering overrides `meet` to keep its merge cache.
///
/// # Termination contract
///
/// The solver terminates only if the fact lattice has finite height and the
/// transfer functions are monotone. The engine does not check this.
pub trait DataflowAnalysis {
    /// The fact lattice for this analysis.
    type Fact: MeetSemiLattice;

    /// The direction facts flow in.
    const DIRECTION: Direction;

    /// Returns the fact at the analysis boundary: the state at ENTRY for a
    /// forward analysis, at EXIT for a backward one.
    fn boundary(&self, cfg: &Cfg) -> Self::Fact;

    /// Applies one instruction's effect to a fact, in place.
    ///
    /// For a forward analysis the fact is the state before the instruction
    /// and becomes the state after it; for a backward analysis the roles are
    /// reversed and the solver calls this in reverse instruction order.
    fn transfer(&self, fact: &mut Self::Fact, instruction: &Instruction, location: Location, cfg: &Cfg);

    /// Transforms a fact as it crosses an edge, before the merge meet.
    ///
    /// The default is the identity. Edge-sensitive analyses use the edge
    /// kind to gain precision (e.g. the taken edge of `ifnonnull` proves the
    /// tested value non-null).
    fn edge_transfer(&self, fact: &Self::Fact, _edge: &CfgEdge, _cfg: &Cfg) -> Self::Fact {
        fact.clone()
    }

    /// Combines two facts at a merge point.
    ///
    /// Defaults to the lattice meet. An analysis that needs merge-point
    /// state (value numbering's merge cache) overrides this.
    fn meet(&self, a: &Self::Fact, b: &Self::Fact) -> Self::Fact {
        a.meet(b)
    }
}

/// The solved result of one dataflow analysis over one CFG.
///
/// Facts are stored per block in program-order terms: the *start* fact holds
/// before the block's first instruction, the *end* fact after its last,
/// regardless of direction. Location queries replay the transfer function
/// within the block, so they cost O(block length).
///
/// All queries return `Option`: `None` means the location's block was never
/// visited (unreachable code) and no fact exists.
#[derive(Debug)]
pub struct Dataflow<A: DataflowAnalysis> {
    analysis: A,
    cfg: Arc<Cfg>,
    start_facts: Vec<BlockFact<A::Fact>>,
    end_facts: Vec<BlockFact<A::Fact>>,
    iterations: usize,
}

impl<A: DataflowAnalysis> Dataflow<A> {
    pub(crate) fn from_parts(
        analysis: A,
        cfg: Arc<Cfg>,
        start_facts: Vec<BlockFact<A::Fact>>,
        end_facts: Vec<BlockFact<A::Fact>>,
        iterations: usize,
    ) -> Self {
        Self {
            analysis,
            cfg,
            start_facts,
            end_facts,
            iterations,
        }
    }

    /// Returns the analysis instance that produced this result.
    #[must_use]
    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    /// Returns the CFG the analysis ran over.
    #[must_use]
    pub fn cfg(&self) -> &Arc<Cfg> {
        &self.cfg
    }

    /// Returns how many block-processing steps the solver performed.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Returns `true` if the solver computed a fact for the block.
    #[must_use]
    pub fn is_visited(&self, block: BlockId) -> bool {
        self.start_facts
            .get(block.index())
            .is_some_and(BlockFact::is_valid)
    }

    /// Returns the fact holding before the block's first instruction, or
    /// `None` if the block was never visited.
    #[must_use]
    pub fn fact_at_block_start(&self, block: BlockId) -> Option<&A::Fact> {
        self.start_facts.get(block.index())?.valid()
    }

    /// Returns the fact holding after the block's last instruction, or
    /// `None` if the block was never visited.
    #[must_use]
    pub fn fact_at_block_end(&self, block: BlockId) -> Option<&A::Fact> {
        self.end_facts.get(block.index())?.valid()
    }

    /// Returns the fact holding immediately before the instruction at
    /// `location` (in program order), or `None` for unvisited blocks.
    #[must_use]
    pub fn fact_before(&self, location: Location) -> Option<A::Fact> {
        self.replay(location.block, location.index, ReplayUpTo::Before)
    }

    /// Returns the fact holding immediately after the instruction at
    /// `location` (in program order), or `None` for unvisited blocks.
    #[must_use]
    pub fn fact_after(&self, location: Location) -> Option<A::Fact> {
        self.replay(location.block, location.index, ReplayUpTo::After)
    }

    fn replay(
        &self,
        block: BlockId,
        index: usize,
        up_to: ReplayUpTo,
    ) -> Option<A::Fact> {
        let instructions = self.cfg.instructions(block);
        if index >= instructions.len() {
            return None;
        }
        match A::DIRECTION {
            Direction::Forward => {
                // Replay forward from the block-start fact.
                let mut fact = self.fact_at_block_start(block)?.clone();
                let stop = match up_to {
                    ReplayUpTo::Before => index,
                    ReplayUpTo::After => index + 1,
                };
                for (i, insn) in instructions[..stop].iter().enumerate() {
                    self.analysis
                        .transfer(&mut fact, insn, Location::new(block, i), &self.cfg);
                }
                Some(fact)
            }
            Direction::Backward => {
                // Replay in reverse from the block-end fact.
                let mut fact = self.fact_at_block_end(block)?.clone();
                let stop = match up_to {
                    ReplayUpTo::Before => index,
                    ReplayUpTo::After => index + 1,
                };
                for i in (stop..instructions.len()).rev() {
                    self.analysis.transfer(
                        &mut fact,
                        &instructions[i],
                        Location::new(block, i),
                        &self.cfg,
                    );
                }
                Some(fact)
            }
        }
    }
}

#[derive(Clone, Copy)]
enum ReplayUpTo {
    Before,
    After,
}
