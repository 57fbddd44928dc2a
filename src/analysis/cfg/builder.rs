//! Control flow graph construction.
//!
//! The builder turns one method's instruction stream and exception table
//! into a [`Cfg`] in three passes:
//!
//! 1. **Boundary marking** - a block starts at every branch/switch target,
//!    at the instruction following any unconditional transfer, and at every
//!    exception-handler entry pc.
//! 2. **Partitioning** - instructions between consecutive boundaries form
//!    one block; each block records its first potentially-throwing
//!    instruction.
//! 3. **Edge construction** - typed edges per the terminating instruction,
//!    exception edges per the exception table, and the synthetic
//!    ENTRY/EXIT sentinels with START/RETURN edges.
//!
//! Any unresolvable target (a branch to a pc that is not an instruction
//! boundary) aborts the build with [`Error::Structural`]; the builder never
//! produces a partial graph.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::{
    analysis::cfg::{BasicBlock, BlockId, BlockKind, Cfg, CfgEdge, EdgeId, EdgeKind},
    bytecode::{MethodBody, Op},
    Error, Result,
};

/// Builds the control flow graph for a method body.
///
/// # Errors
///
/// Returns [`Error::Structural`] when a branch, switch or exception-table
/// target does not resolve to an instruction boundary, or when control can
/// fall off the end of the code array.
///
/// # Examples
///
/// ```rust,ignore
/// use jvmscope::analysis::cfg::build_cfg;
///
/// let cfg = build_cfg(Arc::new(method))?;
/// assert!(cfg.block_count() >= 3); // at least one real block + ENTRY + EXIT
/// ```
pub fn build_cfg(method: Arc<MethodBody>) -> Result<Cfg> {
    Builder::new(method).build()
}

struct Builder {
    method: Arc<MethodBody>,
}

impl Builder {
    fn new(method: Arc<MethodBody>) -> Self {
        Self { method }
    }

    fn build(self) -> Result<Cfg> {
        let boundaries = self.mark_boundaries()?;
        let (blocks, block_of) = self.partition(&boundaries);

        let entry = BlockId::new(blocks.len());
        let exit = BlockId::new(blocks.len() + 1);

        let mut all_blocks = blocks;
        all_blocks.push(BasicBlock::sentinel(entry, BlockKind::Entry));
        all_blocks.push(BasicBlock::sentinel(exit, BlockKind::Exit));

        let edges = self.connect(&all_blocks, &block_of, entry, exit)?;

        Ok(Cfg::from_parts(self.method, all_blocks, edges, entry, exit))
    }

    /// Pass 1: collect the instruction indices where blocks begin.
    fn mark_boundaries(&self) -> Result<BTreeSet<usize>> {
        let instructions = self.method.instructions();
        let mut boundaries = BTreeSet::new();
        boundaries.insert(0);

        let mut targets = Vec::new();
        for (idx, insn) in instructions.iter().enumerate() {
            targets.clear();
            insn.branch_targets(&mut targets);
            for &target_pc in &targets {
                let target_idx = self.method.index_of_pc(target_pc).ok_or_else(|| {
                    Error::structural_at(
                        format!("branch target {target_pc} is not an instruction boundary"),
                        insn.pc,
                    )
                })?;
                boundaries.insert(target_idx);
            }
            if insn.ends_block() && idx + 1 < instructions.len() {
                boundaries.insert(idx + 1);
            }
        }

        for handler in self.method.exception_table() {
            let handler_idx = self.method.index_of_pc(handler.handler_pc).ok_or_else(|| {
                Error::structural(format!(
                    "exception handler entry {} is not an instruction boundary",
                    handler.handler_pc
                ))
            })?;
            boundaries.insert(handler_idx);
        }

        Ok(boundaries)
    }

    /// Pass 2: slice the instruction stream into blocks at the boundaries.
    ///
    /// Returns the blocks (in program order, densely numbered from 0) and a
    /// per-instruction table mapping instruction index to owning block.
    fn partition(&self, boundaries: &BTreeSet<usize>) -> (Vec<BasicBlock>, Vec<BlockId>) {
        let instructions = self.method.instructions();
        let starts: Vec<usize> = boundaries.iter().copied().collect();

        let mut blocks = Vec::with_capacity(starts.len());
        let mut block_of = vec![BlockId::new(0); instructions.len()];

        for (block_idx, &start) in starts.iter().enumerate() {
            let end = starts.get(block_idx + 1).copied().unwrap_or(instructions.len());
            let id = BlockId::new(block_idx);
            let thrower = (start..end).find(|&i| instructions[i].can_throw());
            blocks.push(BasicBlock::new(id, start..end, thrower));
            for slot in &mut block_of[start..end] {
                *slot = id;
            }
        }

        (blocks, block_of)
    }

    /// Pass 3: add all typed edges.
    fn connect(
        &self,
        blocks: &[BasicBlock],
        block_of: &[BlockId],
        entry: BlockId,
        exit: BlockId,
    ) -> Result<Vec<CfgEdge>> {
        let instructions = self.method.instructions();
        let real_count = blocks.len() - 2;
        let mut edges = EdgeList::default();

        edges.add(entry, block_of[0], EdgeKind::Start);

        // Blocks whose `ret` should return to the successor of each `jsr`.
        let mut jsr_followers: Vec<BlockId> = Vec::new();
        let mut ret_blocks: Vec<BlockId> = Vec::new();

        for block in &blocks[..real_count] {
            let range = block.instruction_range();
            let last = &instructions[range.end - 1];
            let next_block = || -> Result<BlockId> {
                block_of.get(range.end).copied().ok_or_else(|| {
                    Error::structural_at("control falls off the end of the method", last.pc)
                })
            };
            let resolve = |pc: u32| -> BlockId {
                // Pass 1 guaranteed every target resolves.
                block_of[self.method.index_of_pc(pc).expect("validated target")]
            };

            match &last.op {
                Op::Branch { target, .. } => {
                    edges.add(block.id(), resolve(*target), EdgeKind::BranchTaken);
                    edges.add(block.id(), next_block()?, EdgeKind::FallThrough);
                }
                Op::Goto { target } => {
                    edges.add(block.id(), resolve(*target), EdgeKind::Goto);
                }
                Op::Switch { default, cases } => {
                    for &(value, target) in cases {
                        edges.add(block.id(), resolve(target), EdgeKind::SwitchCase { value });
                    }
                    edges.add(block.id(), resolve(*default), EdgeKind::SwitchDefault);
                }
                Op::Return { .. } => {
                    edges.add(block.id(), exit, EdgeKind::Return);
                }
                Op::Throw => {
                    // Routed through the exception table below.
                }
                Op::Jsr { target } => {
                    edges.add(block.id(), resolve(*target), EdgeKind::Jsr);
                    if let Ok(follower) = next_block() {
                        jsr_followers.push(follower);
                    }
                }
                Op::Ret { .. } => {
                    ret_blocks.push(block.id());
                }
                _ => {
                    edges.add(block.id(), next_block()?, EdgeKind::FallThrough);
                }
            }
        }

        // `ret` targets are not encoded in the instruction; conservatively
        // connect every ret block to every jsr follower.
        for &ret_block in &ret_blocks {
            for &follower in &jsr_followers {
                edges.add(ret_block, follower, EdgeKind::Ret);
            }
        }

        self.connect_exceptions(blocks, block_of, exit, &mut edges);

        // A method that can only loop forever reaches EXIT through nothing;
        // keep post-dominance defined with a synthetic edge.
        if !edges.reaches(exit) {
            edges.add(entry, exit, EdgeKind::Exit);
        }

        Ok(edges.finish())
    }

    /// Routes exception edges: handler edges for covered throwers, an
    /// UnhandledException edge to EXIT where an exception may escape.
    fn connect_exceptions(
        &self,
        blocks: &[BasicBlock],
        block_of: &[BlockId],
        exit: BlockId,
        edges: &mut EdgeList,
    ) {
        let instructions = self.method.instructions();
        let real_count = blocks.len() - 2;

        for block in &blocks[..real_count] {
            let Some(thrower_idx) = block.exception_thrower() else {
                continue;
            };
            let thrower_pc = instructions[thrower_idx].pc;

            let mut escapes = true;
            for handler in self.method.exception_table() {
                if !handler.covers(thrower_pc) {
                    continue;
                }
                // Pass 1 guaranteed the handler entry resolves.
                let handler_block = block_of[self
                    .method
                    .index_of_pc(handler.handler_pc)
                    .expect("validated handler")];
                edges.add(
                    block.id(),
                    handler_block,
                    EdgeKind::HandledException {
                        catch_type: handler.catch_type.clone(),
                    },
                );
                if handler.catch_type.is_none() {
                    // A catch-all swallows everything from this range.
                    escapes = false;
                    break;
                }
            }
            if escapes {
                edges.add(block.id(), exit, EdgeKind::UnhandledException);
            }
        }
    }
}

/// Accumulates edges, deduplicating identical (source, target, kind) triples
/// that overlapping exception-table rows would otherwise produce.
#[derive(Default)]
struct EdgeList {
    edges: Vec<CfgEdge>,
    seen: HashSet<(usize, usize, EdgeKind)>,
}

impl EdgeList {
    fn add(&mut self, source: BlockId, target: BlockId, kind: EdgeKind) {
        if !self
            .seen
            .insert((source.index(), target.index(), kind.clone()))
        {
            return;
        }
        let id = EdgeId::new(self.edges.len());
        self.edges.push(CfgEdge::new(id, source, target, kind));
    }

    fn reaches(&self, target: BlockId) -> bool {
        self.edges.iter().any(|e| e.target() == target)
    }

    fn finish(self) -> Vec<CfgEdge> {
        self.edges
    }
}
