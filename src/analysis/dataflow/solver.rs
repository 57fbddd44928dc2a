//! The worklist fixpoint solver.
//!
//! # Algorithm
//!
//! 1. Every block starts [`BlockFact::Unvisited`]; only the seed sentinel
//!    (ENTRY forward, EXIT backward) gets the analysis's boundary fact.
//! 2. Blocks enter the worklist in reverse postorder (forward) or postorder
//!    (backward), the orders that minimise re-processing on reducible CFGs.
//! 3. Dequeue a block; merge the facts flowing into it, applying the
//!    analysis's edge transfer per edge and skipping unvisited neighbours
//!    entirely. If nothing valid flows in yet, the block stays unvisited and
//!    is revisited when a neighbour changes.
//! 4. Run the transfer function instruction by instruction in direction
//!    order. If the block's outgoing fact changed, enqueue the blocks it
//!    feeds.
//! 5. Repeat until the worklist drains.
//!
//! Unreachable blocks are simply never enqueued by a changed neighbour and
//! finish the run unvisited, which is exactly the "invalid fact" answer the
//! query layer reports for them.
//!
//! # Termination
//!
//! Guaranteed only by the analysis's contract: finite lattice height and
//! monotone transfer functions. On reducible CFGs convergence takes O(d)
//! passes, where d is the loop-nesting depth.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::analysis::{
    cfg::{BlockId, Cfg, Location},
    dataflow::framework::{BlockFact, Dataflow, DataflowAnalysis, Direction},
};

/// Iterates a [`DataflowAnalysis`] to a fixpoint over one CFG.
///
/// # Usage
///
/// ```rust,ignore
/// use jvmscope::analysis::dataflow::{DataflowSolver, LiveStoreAnalysis};
///
/// let dataflow = DataflowSolver::new(LiveStoreAnalysis::new()).solve(cfg);
/// let live = dataflow.fact_after(location);
/// ```
pub struct DataflowSolver<A: DataflowAnalysis> {
    analysis: A,
    start_facts: Vec<BlockFact<A::Fact>>,
    end_facts: Vec<BlockFact<A::Fact>>,
    worklist: VecDeque<BlockId>,
    in_worklist: Vec<bool>,
    iterations: usize,
}

impl<A: DataflowAnalysis> DataflowSolver<A> {
    /// Creates a solver for the given analysis.
    #[must_use]
    pub fn new(analysis: A) -> Self {
        Self {
            analysis,
            start_facts: Vec::new(),
            end_facts: Vec::new(),
            worklist: VecDeque::new(),
            in_worklist: Vec::new(),
            iterations: 0,
        }
    }

    /// Runs the analysis to a fixpoint and returns the queryable result.
    #[must_use]
    pub fn solve(mut self, cfg: Arc<Cfg>) -> Dataflow<A> {
        self.initialize(&cfg);
        while let Some(block) = self.worklist.pop_front() {
            self.in_worklist[block.index()] = false;
            self.iterations += 1;

            let changed = match A::DIRECTION {
                Direction::Forward => self.process_forward(block, &cfg),
                Direction::Backward => self.process_backward(block, &cfg),
            };
            if changed {
                self.enqueue_affected(block, &cfg);
            }
        }
        Dataflow::from_parts(
            self.analysis,
            cfg,
            self.start_facts,
            self.end_facts,
            self.iterations,
        )
    }

    fn initialize(&mut self, cfg: &Cfg) {
        let count = cfg.block_count();
        self.start_facts = std::iter::repeat_with(|| BlockFact::Unvisited)
            .take(count)
            .collect();
        self.end_facts = std::iter::repeat_with(|| BlockFact::Unvisited)
            .take(count)
            .collect();
        self.in_worklist = vec![false; count];

        let boundary = self.analysis.boundary(cfg);
        let order = match A::DIRECTION {
            Direction::Forward => {
                // ENTRY has no instructions: its start and end facts coincide.
                self.start_facts[cfg.entry().index()] = BlockFact::Valid(boundary.clone());
                self.end_facts[cfg.entry().index()] = BlockFact::Valid(boundary);
                cfg.reverse_postorder()
            }
            Direction::Backward => {
                self.start_facts[cfg.exit().index()] = BlockFact::Valid(boundary.clone());
                self.end_facts[cfg.exit().index()] = BlockFact::Valid(boundary);
                cfg.postorder()
            }
        };
        for block in order {
            self.worklist.push_back(block);
            self.in_worklist[block.index()] = true;
        }
    }

    /// Processes one block forward. Returns `true` if its end fact changed.
    fn process_forward(&mut self, block: BlockId, cfg: &Cfg) -> bool {
        let input = if block == cfg.entry() {
            match self.start_facts[block.index()].valid() {
                Some(fact) => fact.clone(),
                None => return false,
            }
        } else {
            let mut merged: Option<A::Fact> = None;
            for edge in cfg.in_edges(block) {
                let Some(pred_end) = self.end_facts[edge.source().index()].valid() else {
                    continue;
                };
                let transferred = self.analysis.edge_transfer(pred_end, edge, cfg);
                merged = Some(match merged {
                    None => transferred,
                    Some(acc) => self.analysis.meet(&acc, &transferred),
                });
            }
            match merged {
                Some(fact) => fact,
                // Nothing valid flows in yet; stay unvisited.
                None => return false,
            }
        };

        let mut fact = input.clone();
        for (i, insn) in cfg.instructions(block).iter().enumerate() {
            self.analysis
                .transfer(&mut fact, insn, Location::new(block, i), cfg);
        }

        self.start_facts[block.index()] = BlockFact::Valid(input);
        let changed = self.end_facts[block.index()].valid() != Some(&fact);
        self.end_facts[block.index()] = BlockFact::Valid(fact);
        changed
    }

    /// Processes one block backward. Returns `true` if its start fact changed.
    fn process_backward(&mut self, block: BlockId, cfg: &Cfg) -> bool {
        let output = if block == cfg.exit() {
            match self.end_facts[block.index()].valid() {
                Some(fact) => fact.clone(),
                None => return false,
            }
        } else {
            let mut merged: Option<A::Fact> = None;
            for edge in cfg.out_edges(block) {
                let Some(succ_start) = self.start_facts[edge.target().index()].valid() else {
                    continue;
                };
                let transferred = self.analysis.edge_transfer(succ_start, edge, cfg);
                merged = Some(match merged {
                    None => transferred,
                    Some(acc) => self.analysis.meet(&acc, &transferred),
                });
            }
            match merged {
                Some(fact) => fact,
                None => return false,
            }
        };

        let mut fact = output.clone();
        let instructions = cfg.instructions(block);
        for i in (0..instructions.len()).rev() {
            self.analysis
                .transfer(&mut fact, &instructions[i], Location::new(block, i), cfg);
        }

        self.end_facts[block.index()] = BlockFact::Valid(output);
        let changed = self.start_facts[block.index()].valid() != Some(&fact);
        self.start_facts[block.index()] = BlockFact::Valid(fact);
        changed
    }

    fn enqueue_affected(&mut self, block: BlockId, cfg: &Cfg) {
        let affected: Vec<BlockId> = match A::DIRECTION {
            Direction::Forward => cfg.successors(block).collect(),
            Direction::Backward => cfg.predecessors(block).collect(),
        };
        for next in affected {
            // Blocks dead in the forward graph get no facts from either
            // direction; EXIT's predecessors may include them.
            if !cfg.is_live(next) {
                continue;
            }
            if !self.in_worklist[next.index()] {
                self.worklist.push_back(next);
                self.in_worklist[next.index()] = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            cfg::{build_cfg, CfgEdge, EdgeKind},
            dataflow::lattice::MeetSemiLattice,
        },
        bytecode::Instruction,
        test::asm::MethodBuilder,
    };

    /// Counts instructions along the path; flat-merges differing counts.
    #[derive(Debug, Clone, PartialEq)]
    enum Count {
        Exactly(usize),
        Varies,
    }

    impl MeetSemiLattice for Count {
        fn meet(&self, other: &Self) -> Self {
            match (self, other) {
                (Count::Exactly(a), Count::Exactly(b)) if a == b => Count::Exactly(*a),
                _ => Count::Varies,
            }
        }
    }

    struct InstructionCounter;

    impl DataflowAnalysis for InstructionCounter {
        type Fact = Count;
        const DIRECTION: Direction = Direction::Forward;

        fn boundary(&self, _cfg: &Cfg) -> Count {
            Count::Exactly(0)
        }

        fn transfer(&self, fact: &mut Count, _insn: &Instruction, _loc: Location, _cfg: &Cfg) {
            if let Count::Exactly(n) = fact {
                *n += 1;
            }
        }
    }

    /// Same, but only along non-exception edges, to exercise edge_transfer.
    struct NormalPathCounter;

    impl DataflowAnalysis for NormalPathCounter {
        type Fact = Count;
        const DIRECTION: Direction = Direction::Forward;

        fn boundary(&self, _cfg: &Cfg) -> Count {
            Count::Exactly(0)
        }

        fn transfer(&self, fact: &mut Count, _insn: &Instruction, _loc: Location, _cfg: &Cfg) {
            if let Count::Exactly(n) = fact {
                *n += 1;
            }
        }

        fn edge_transfer(&self, fact: &Count, edge: &CfgEdge, _cfg: &Cfg) -> Count {
            if edge.kind().is_exception() {
                Count::Varies
            } else {
                fact.clone()
            }
        }
    }

    fn diamond() -> Arc<Cfg> {
        let method = MethodBuilder::new_static(2)
            .iload(0)
            .ifeq("else")
            .iconst(1)
            .istore(1)
            .goto_("join")
            .label("else")
            .iconst(2)
            .istore(1)
            .label("join")
            .iload(1)
            .ireturn()
            .finish();
        Arc::new(build_cfg(Arc::new(method)).expect("CFG"))
    }

    #[test]
    fn straight_counts_converge() {
        let cfg = diamond();
        let flow = DataflowSolver::new(InstructionCounter).solve(Arc::clone(&cfg));

        // Both arms are 3 instructions long (counting their terminator), so
        // the join sees Exactly on both paths with different values.
        let join = BlockId::new(3);
        assert_eq!(
            flow.fact_at_block_start(join),
            Some(&Count::Varies),
            "arms of different accumulated counts must flat-merge"
        );
        // The condition block is 2 instructions after ENTRY's 0.
        assert_eq!(
            flow.fact_at_block_end(BlockId::new(0)),
            Some(&Count::Exactly(2))
        );
    }

    #[test]
    fn unreachable_blocks_stay_unvisited() {
        let method = MethodBuilder::new_static(0)
            .goto_("end")
            .iconst(1)
            .istore(0)
            .label("end")
            .return_()
            .finish();
        let cfg = Arc::new(build_cfg(Arc::new(method)).expect("CFG"));
        let flow = DataflowSolver::new(InstructionCounter).solve(Arc::clone(&cfg));

        let dead = BlockId::new(1);
        assert!(!flow.is_visited(dead));
        assert_eq!(flow.fact_at_block_start(dead), None);
        assert_eq!(flow.fact_before(Location::new(dead, 0)), None);
        assert!(flow.is_visited(BlockId::new(0)));
    }

    #[test]
    fn location_replay_matches_block_facts() {
        let cfg = diamond();
        let flow = DataflowSolver::new(InstructionCounter).solve(Arc::clone(&cfg));

        let cond = BlockId::new(0);
        assert_eq!(
            flow.fact_before(Location::new(cond, 0)),
            Some(Count::Exactly(0))
        );
        assert_eq!(
            flow.fact_after(Location::new(cond, 1)),
            Some(Count::Exactly(2))
        );
        assert_eq!(
            flow.fact_after(Location::new(cond, 1)).as_ref(),
            flow.fact_at_block_end(cond)
        );
    }

    #[test]
    fn edge_transfer_participates_in_merge() {
        let cfg = diamond();
        let flow = DataflowSolver::new(NormalPathCounter).solve(Arc::clone(&cfg));
        // No exception edges in a diamond, so behaviour matches the plain
        // counter.
        assert_eq!(
            flow.fact_at_block_end(BlockId::new(0)),
            Some(&Count::Exactly(2))
        );
    }

    #[test]
    fn resolving_twice_is_deterministic() {
        let cfg = diamond();
        let a = DataflowSolver::new(InstructionCounter).solve(Arc::clone(&cfg));
        let b = DataflowSolver::new(InstructionCounter).solve(Arc::clone(&cfg));
        for block in cfg.blocks() {
            assert_eq!(
                a.fact_at_block_start(block.id()),
                b.fact_at_block_start(block.id())
            );
            assert_eq!(
                a.fact_at_block_end(block.id()),
                b.fact_at_block_end(block.id())
            );
        }
    }
}
