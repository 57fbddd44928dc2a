//! Basic blocks and the identifiers used to address them.
//!
//! Blocks do not own their instructions: each [`BasicBlock`] is a range into
//! the method's instruction arena, and blocks/edges are referenced by integer
//! ids everywhere. This keeps the graph free of ownership cycles and makes
//! iterative traversal cheap.

use std::fmt;
use std::ops::Range;

/// A strongly-typed identifier for basic blocks within one CFG.
///
/// Ids are assigned densely from 0 in program order for real blocks, with
/// the synthetic ENTRY and EXIT blocks taking the last two ids. A `BlockId`
/// is only meaningful relative to the [`Cfg`](crate::analysis::cfg::Cfg)
/// that produced it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Creates a block id from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the raw index, usable for indexing per-block side tables.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Distinguishes the synthetic sentinel blocks from real code blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// A block holding real instructions.
    Normal,
    /// The synthetic entry sentinel (no instructions, one START edge out).
    Entry,
    /// The synthetic exit sentinel (no instructions, no successors).
    Exit,
}

/// A maximal straight-line run of instructions with one entry and one exit.
///
/// The instruction contents are addressed as a range into the owning
/// method's instruction array; use
/// [`Cfg::instructions`](crate::analysis::cfg::Cfg::instructions) to resolve
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    id: BlockId,
    kind: BlockKind,
    range: Range<usize>,
    exception_thrower: Option<usize>,
}

impl BasicBlock {
    /// Creates a normal block over the given instruction-index range.
    ///
    /// `exception_thrower` is the index (into the method's instruction array)
    /// of the first instruction in the block that may raise an exception, if
    /// any; exception edges attach to blocks through this marker.
    #[must_use]
    pub(crate) fn new(id: BlockId, range: Range<usize>, exception_thrower: Option<usize>) -> Self {
        Self {
            id,
            kind: BlockKind::Normal,
            range,
            exception_thrower,
        }
    }

    /// Creates a synthetic (ENTRY/EXIT) sentinel block with no instructions.
    #[must_use]
    pub(crate) fn sentinel(id: BlockId, kind: BlockKind) -> Self {
        Self {
            id,
            kind,
            range: 0..0,
            exception_thrower: None,
        }
    }

    /// Returns this block's id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the block kind.
    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Returns `true` for the synthetic entry sentinel.
    #[must_use]
    pub fn is_entry(&self) -> bool {
        self.kind == BlockKind::Entry
    }

    /// Returns `true` for the synthetic exit sentinel.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        self.kind == BlockKind::Exit
    }

    /// Returns the range of instruction indices this block covers.
    #[must_use]
    pub fn instruction_range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Returns the number of instructions in the block (0 for sentinels).
    #[must_use]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Returns the method-wide index of the first potentially-throwing
    /// instruction in this block, if any.
    #[must_use]
    pub const fn exception_thrower(&self) -> Option<usize> {
        self.exception_thrower
    }
}

/// An addressable program point: an instruction position within a block.
///
/// Dataflow facts are indexed by `Location`; the pair identifies the
/// `index`-th instruction of `block` (0-based within the block).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    /// The containing block.
    pub block: BlockId,
    /// The instruction index within the block.
    pub index: usize,
}

impl Location {
    /// Creates a location.
    #[must_use]
    pub const fn new(block: BlockId, index: usize) -> Self {
        Self { block, index }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({}:{})", self.block, self.index)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_formatting() {
        let id = BlockId::new(7);
        assert_eq!(id.index(), 7);
        assert_eq!(format!("{id}"), "b7");
        assert_eq!(format!("{id:?}"), "BlockId(7)");
    }

    #[test]
    fn sentinel_blocks_are_empty() {
        let entry = BasicBlock::sentinel(BlockId::new(3), BlockKind::Entry);
        assert!(entry.is_entry());
        assert!(entry.is_empty());
        assert_eq!(entry.exception_thrower(), None);
    }

    #[test]
    fn normal_block_range() {
        let block = BasicBlock::new(BlockId::new(0), 2..5, Some(3));
        assert_eq!(block.len(), 3);
        assert_eq!(block.kind(), BlockKind::Normal);
        assert_eq!(block.exception_thrower(), Some(3));
    }

    #[test]
    fn location_ordering_follows_program_order() {
        let a = Location::new(BlockId::new(0), 1);
        let b = Location::new(BlockId::new(0), 2);
        let c = Location::new(BlockId::new(1), 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(format!("{a}"), "b0:1");
    }
}
