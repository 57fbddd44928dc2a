//! The control flow graph.
//!
//! [`Cfg`] stores blocks and edges in flat arrays indexed by [`BlockId`] and
//! [`EdgeId`], with adjacency lists of edge ids per block. There are no
//! owning references between graph entities, so back-edges cost nothing and
//! all traversals are iterative.
//!
//! A `Cfg` is built once per method by the
//! [`builder`](crate::analysis::cfg::build_cfg) and shared read-only by every
//! analysis for that method.

use std::sync::Arc;

use crate::{
    analysis::cfg::{BasicBlock, BlockId, CfgEdge, EdgeId, EdgeKind, Location},
    bytecode::{Instruction, MethodBody},
    utils::BitSet,
};

/// A control flow graph for one method.
///
/// # Structure
///
/// - Real blocks occupy ids `0..real_block_count()` in program order.
/// - The synthetic ENTRY and EXIT sentinels take the last two ids.
/// - Every edge is typed by [`EdgeKind`]; exception-path edges are excluded
///   from dominance but participate in dataflow.
///
/// # Invariants (established by the builder)
///
/// - ENTRY has no predecessors, EXIT no successors.
/// - Every non-EXIT block has at least one outgoing edge.
/// - Blocks unreachable from ENTRY are flagged dead ([`Cfg::is_live`]),
///   never silently given facts.
#[derive(Debug)]
pub struct Cfg {
    method: Arc<MethodBody>,
    blocks: Vec<BasicBlock>,
    edges: Vec<CfgEdge>,
    out_edges: Vec<Vec<EdgeId>>,
    in_edges: Vec<Vec<EdgeId>>,
    entry: BlockId,
    exit: BlockId,
    live: BitSet,
}

impl Cfg {
    pub(crate) fn from_parts(
        method: Arc<MethodBody>,
        blocks: Vec<BasicBlock>,
        edges: Vec<CfgEdge>,
        entry: BlockId,
        exit: BlockId,
    ) -> Self {
        let mut out_edges = vec![Vec::new(); blocks.len()];
        let mut in_edges = vec![Vec::new(); blocks.len()];
        for edge in &edges {
            out_edges[edge.source().index()].push(edge.id());
            in_edges[edge.target().index()].push(edge.id());
        }

        let mut cfg = Self {
            method,
            blocks,
            edges,
            out_edges,
            in_edges,
            entry,
            exit,
            live: BitSet::new(0),
        };
        cfg.live = cfg.compute_reachable();
        cfg
    }

    /// Returns the method body this graph was built from.
    #[must_use]
    pub fn method(&self) -> &Arc<MethodBody> {
        &self.method
    }

    /// Returns the total number of blocks, including the two sentinels.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the number of real (non-sentinel) blocks.
    #[must_use]
    pub fn real_block_count(&self) -> usize {
        self.blocks.len() - 2
    }

    /// Returns the block with the given id, or `None` if out of range.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Returns an iterator over all blocks, sentinels included.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    /// Returns the synthetic ENTRY block id.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// Returns the synthetic EXIT block id.
    #[must_use]
    pub const fn exit(&self) -> BlockId {
        self.exit
    }

    /// Returns the instructions of a block (empty for sentinels).
    #[must_use]
    pub fn instructions(&self, id: BlockId) -> &[Instruction] {
        match self.blocks.get(id.index()) {
            Some(block) => &self.method.instructions()[block.instruction_range()],
            None => &[],
        }
    }

    /// Returns the last instruction of a block, if it has any.
    #[must_use]
    pub fn last_instruction(&self, id: BlockId) -> Option<&Instruction> {
        self.instructions(id).last()
    }

    /// Returns the instruction at a location.
    #[must_use]
    pub fn instruction_at(&self, location: Location) -> Option<&Instruction> {
        self.instructions(location.block).get(location.index)
    }

    /// Returns the edge with the given id, or `None` if out of range.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&CfgEdge> {
        self.edges.get(id.index())
    }

    /// Returns the total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns an iterator over all edges.
    pub fn edges(&self) -> impl Iterator<Item = &CfgEdge> {
        self.edges.iter()
    }

    /// Returns the outgoing edges of a block.
    pub fn out_edges(&self, id: BlockId) -> impl Iterator<Item = &CfgEdge> {
        self.out_edges
            .get(id.index())
            .into_iter()
            .flatten()
            .map(|&eid| &self.edges[eid.index()])
    }

    /// Returns the incoming edges of a block.
    pub fn in_edges(&self, id: BlockId) -> impl Iterator<Item = &CfgEdge> {
        self.in_edges
            .get(id.index())
            .into_iter()
            .flatten()
            .map(|&eid| &self.edges[eid.index()])
    }

    /// Returns the successor block ids of a block.
    pub fn successors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.out_edges(id).map(CfgEdge::target)
    }

    /// Returns the predecessor block ids of a block.
    pub fn predecessors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.in_edges(id).map(CfgEdge::source)
    }

    /// Returns `true` if the block is reachable from ENTRY.
    ///
    /// Blocks that fail this check are dead code (e.g. a handler for a range
    /// that cannot throw); dataflow leaves them unvisited and fact queries on
    /// them return `None`.
    #[must_use]
    pub fn is_live(&self, id: BlockId) -> bool {
        id.index() < self.live.len() && self.live.contains(id.index())
    }

    /// Returns the set of blocks reachable from ENTRY, as a bit set over
    /// block ids.
    #[must_use]
    pub fn live_blocks(&self) -> &BitSet {
        &self.live
    }

    fn compute_reachable(&self) -> BitSet {
        let mut seen = BitSet::new(self.blocks.len());
        let mut stack = vec![self.entry];
        seen.insert(self.entry.index());
        while let Some(block) = stack.pop() {
            for succ in self.successors(block) {
                if !seen.contains(succ.index()) {
                    seen.insert(succ.index());
                    stack.push(succ);
                }
            }
        }
        seen
    }

    /// Returns block ids in postorder of an iterative DFS from ENTRY.
    ///
    /// Only reachable blocks appear in the result.
    #[must_use]
    pub fn postorder(&self) -> Vec<BlockId> {
        // Iterative two-phase DFS; recursion is off-limits for large methods.
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut visited = BitSet::new(self.blocks.len());
        let mut stack: Vec<(BlockId, bool)> = vec![(self.entry, false)];
        while let Some((block, expanded)) = stack.pop() {
            if expanded {
                order.push(block);
                continue;
            }
            if visited.contains(block.index()) {
                continue;
            }
            visited.insert(block.index());
            stack.push((block, true));
            for succ in self.successors(block) {
                if !visited.contains(succ.index()) {
                    stack.push((succ, false));
                }
            }
        }
        order
    }

    /// Returns block ids in reverse postorder from ENTRY, the iteration
    /// order the dataflow solver uses for forward analyses.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }

    /// Returns an iterator over every location in program order: real blocks
    /// by ascending id, instructions by ascending index.
    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.blocks
            .iter()
            .filter(|b| !b.is_entry() && !b.is_exit())
            .flat_map(|b| (0..b.len()).map(move |idx| Location::new(b.id(), idx)))
    }

    /// Resolves a byte offset to the location of the instruction at that pc.
    #[must_use]
    pub fn location_of_pc(&self, pc: u32) -> Option<Location> {
        let method_index = self.method.index_of_pc(pc)?;
        let block = self
            .blocks
            .iter()
            .find(|b| b.instruction_range().contains(&method_index))?;
        Some(Location::new(
            block.id(),
            method_index - block.instruction_range().start,
        ))
    }

    /// Returns the byte offset of the instruction at a location.
    #[must_use]
    pub fn pc_of(&self, location: Location) -> Option<u32> {
        self.instruction_at(location).map(|insn| insn.pc)
    }

    /// Returns the location one past the last instruction-bearing position
    /// of a block, i.e. the number of instructions in it.
    #[must_use]
    pub fn block_len(&self, id: BlockId) -> usize {
        self.block(id).map_or(0, BasicBlock::len)
    }

    /// Looks up the first edge connecting `source` to `target`, if any,
    /// exception edges included.
    #[must_use]
    pub fn edge_between(&self, source: BlockId, target: BlockId) -> Option<&CfgEdge> {
        self.out_edges(source).find(|e| e.target() == target)
    }

    /// Returns the predecessors of a block along non-exception edges only,
    /// the subgraph dominance is computed over.
    pub fn non_exception_predecessors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.in_edges(id)
            .filter(|e| !e.kind().is_exception())
            .map(CfgEdge::source)
    }

    /// Returns the successors of a block along non-exception edges only.
    pub fn non_exception_successors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.out_edges(id)
            .filter(|e| !e.kind().is_exception())
            .map(CfgEdge::target)
    }

    /// Counts outgoing edges of the given kind class, used by well-formedness
    /// assertions in tests.
    #[must_use]
    pub fn count_edges_where(&self, mut pred: impl FnMut(&EdgeKind) -> bool) -> usize {
        self.edges.iter().filter(|e| pred(e.kind())).count()
    }
}
