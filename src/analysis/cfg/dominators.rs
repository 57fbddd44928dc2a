//! Dominance and post-dominance over the non-exception subgraph.
//!
//! A block `a` dominates `b` when every path from ENTRY to `b` passes
//! through `a`. Exception edges are excluded: a handler does not sit on the
//! normal path to anything, and including those edges would dissolve almost
//! every dominance relationship in methods with try blocks.
//!
//! # Algorithm
//!
//! The classic iterative bitset fixpoint:
//!
//! - `Dom(root) = {root}`
//! - `Dom(n) = {n} ∪ ⋂ Dom(p)` over the (non-exception) predecessors `p`
//!
//! iterated in reverse postorder until no set changes. The lattice of block
//! subsets is finite, so termination is guaranteed. Everything is iterative;
//! no step recurses, so pathological method sizes cannot overflow the stack.
//!
//! Post-dominance is the same computation on the reversed graph with EXIT as
//! the root.
//!
//! Blocks unreachable from the root get no dominator set at all - an
//! explicit "undefined" distinct from "dominated by everything", so queries
//! against dead code answer `false` instead of lying.

use crate::{
    analysis::cfg::{BlockId, Cfg},
    utils::BitSet,
};

/// The dominance relation for one CFG (forward or reversed).
///
/// Obtain via [`DominatorInfo::compute`] or
/// [`DominatorInfo::compute_post`]; the per-method analysis context caches
/// both.
#[derive(Debug, Clone)]
pub struct DominatorInfo {
    /// Per-block dominator sets; `None` for blocks unreachable from the root.
    sets: Vec<Option<BitSet>>,
    root: BlockId,
}

impl DominatorInfo {
    /// Computes dominators over the non-exception subgraph, rooted at ENTRY.
    #[must_use]
    pub fn compute(cfg: &Cfg) -> Self {
        Self::solve(cfg, cfg.entry(), Direction::Forward)
    }

    /// Computes post-dominators: the symmetric relation on the reversed
    /// graph, rooted at EXIT.
    #[must_use]
    pub fn compute_post(cfg: &Cfg) -> Self {
        Self::solve(cfg, cfg.exit(), Direction::Reversed)
    }

    fn solve(cfg: &Cfg, root: BlockId, direction: Direction) -> Self {
        let count = cfg.block_count();
        let order = rpo_from(cfg, root, direction);

        let mut sets: Vec<Option<BitSet>> = vec![None; count];
        let mut root_set = BitSet::new(count);
        root_set.insert(root.index());
        sets[root.index()] = Some(root_set);

        // Reachable non-root blocks start at "dominated by everything" and
        // are whittled down by intersection.
        for &block in &order {
            if block != root {
                sets[block.index()] = Some(BitSet::full(count));
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &order {
                if block == root {
                    continue;
                }
                let mut merged: Option<BitSet> = None;
                for pred in preds(cfg, block, direction) {
                    let Some(pred_set) = &sets[pred.index()] else {
                        continue;
                    };
                    match &mut merged {
                        None => merged = Some(pred_set.clone()),
                        Some(acc) => {
                            acc.intersect_with(pred_set);
                        }
                    }
                }
                let mut new_set = merged.unwrap_or_else(|| BitSet::new(count));
                new_set.insert(block.index());
                if sets[block.index()].as_ref() != Some(&new_set) {
                    sets[block.index()] = Some(new_set);
                    changed = true;
                }
            }
        }

        Self { sets, root }
    }

    /// Returns the root of the relation (ENTRY, or EXIT for post-dominance).
    #[must_use]
    pub const fn root(&self) -> BlockId {
        self.root
    }

    /// Returns `true` if `a` dominates `b`.
    ///
    /// Every reachable block dominates itself. If `b` is unreachable from
    /// the root its dominator set is undefined and this returns `false` for
    /// every `a`, including `b` itself.
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        match self.sets.get(b.index()) {
            Some(Some(set)) => a.index() < set.len() && set.contains(a.index()),
            _ => false,
        }
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the dominator set of `b`, or `None` if `b` is unreachable.
    #[must_use]
    pub fn dominators_of(&self, b: BlockId) -> Option<&BitSet> {
        self.sets.get(b.index()).and_then(Option::as_ref)
    }

    /// Returns every block dominated by `b`, in ascending id order.
    #[must_use]
    pub fn all_dominated_by(&self, b: BlockId) -> Vec<BlockId> {
        (0..self.sets.len())
            .map(BlockId::new)
            .filter(|&candidate| self.dominates(b, candidate))
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reversed,
}

fn preds(cfg: &Cfg, block: BlockId, direction: Direction) -> Vec<BlockId> {
    match direction {
        Direction::Forward => cfg.non_exception_predecessors(block).collect(),
        Direction::Reversed => cfg.non_exception_successors(block).collect(),
    }
}

fn succs(cfg: &Cfg, block: BlockId, direction: Direction) -> Vec<BlockId> {
    match direction {
        Direction::Forward => cfg.non_exception_successors(block).collect(),
        Direction::Reversed => cfg.non_exception_predecessors(block).collect(),
    }
}

/// Reverse postorder over the non-exception subgraph from `root`, iterative.
fn rpo_from(cfg: &Cfg, root: BlockId, direction: Direction) -> Vec<BlockId> {
    let count = cfg.block_count();
    let mut order = Vec::with_capacity(count);
    let mut visited = BitSet::new(count);
    let mut stack: Vec<(BlockId, bool)> = vec![(root, false)];
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
        for succ in succs(cfg, block, direction) {
            if !visited.contains(succ.index()) {
                stack.push((succ, false));
            }
        }
    }
    order.reverse();
    order
}
