//! Typed control-flow edges.
//!
//! Every edge in the CFG carries an [`EdgeKind`] describing the control
//! transfer it models. The kinds matter to consumers: dominance is computed
//! over the non-exception subgraph, nullness narrowing keys off the branch
//! kinds, and detectors distinguish handled from unhandled exception paths.

use std::fmt;

use crate::{analysis::cfg::BlockId, bytecode::ClassRef};

/// A strongly-typed identifier for edges within one CFG.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    /// Creates an edge id from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        EdgeId(index)
    }

    /// Returns the raw index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

/// The kind of control transfer an edge represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Sequential flow from a block whose last instruction does not
    /// unconditionally transfer control (including the untaken path of a
    /// conditional branch).
    FallThrough,
    /// The taken path of a conditional branch.
    BranchTaken,
    /// An unconditional `goto`.
    Goto,
    /// One arm of a `tableswitch`/`lookupswitch`.
    SwitchCase {
        /// The case value selecting this arm.
        value: i32,
    },
    /// The default arm of a switch.
    SwitchDefault,
    /// Flow to an exception handler covering the source block's throwing
    /// instruction.
    HandledException {
        /// The caught exception class, or `None` for a catch-all.
        catch_type: Option<ClassRef>,
    },
    /// Flow to EXIT from a potentially-throwing instruction not covered by
    /// a catch-all handler (the exception may escape the method).
    UnhandledException,
    /// The synthetic edge from ENTRY to the first real block.
    Start,
    /// Flow from a `return` instruction to EXIT.
    Return,
    /// A synthetic ENTRY-to-EXIT edge added when nothing else reaches EXIT
    /// (a method that can only loop forever); keeps post-dominance defined.
    Exit,
    /// A `jsr` jump to a subroutine entry.
    Jsr,
    /// Flow from a subroutine `ret` back to an instruction following a `jsr`.
    Ret,
}

impl EdgeKind {
    /// Returns `true` for exception-path edges, which dominance computation
    /// excludes.
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        matches!(
            self,
            EdgeKind::HandledException { .. } | EdgeKind::UnhandledException
        )
    }

    /// Returns `true` for the two conditional-branch outcome kinds.
    #[must_use]
    pub const fn is_branch_outcome(&self) -> bool {
        matches!(self, EdgeKind::BranchTaken | EdgeKind::FallThrough)
    }

    /// Returns `true` for switch arms (case or default).
    #[must_use]
    pub const fn is_switch(&self) -> bool {
        matches!(self, EdgeKind::SwitchCase { .. } | EdgeKind::SwitchDefault)
    }

    /// Returns `true` for the synthetic kinds that involve a sentinel block.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        matches!(
            self,
            EdgeKind::Start | EdgeKind::Return | EdgeKind::Exit | EdgeKind::UnhandledException
        )
    }
}

/// A typed edge between two blocks of a CFG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgEdge {
    id: EdgeId,
    source: BlockId,
    target: BlockId,
    kind: EdgeKind,
}

impl CfgEdge {
    /// Creates an edge.
    #[must_use]
    pub(crate) const fn new(id: EdgeId, source: BlockId, target: BlockId, kind: EdgeKind) -> Self {
        Self {
            id,
            source,
            target,
            kind,
        }
    }

    /// Returns this edge's id.
    #[must_use]
    pub const fn id(&self) -> EdgeId {
        self.id
    }

    /// Returns the source block id.
    #[must_use]
    pub const fn source(&self) -> BlockId {
        self.source
    }

    /// Returns the target block id.
    #[must_use]
    pub const fn target(&self) -> BlockId {
        self.target
    }

    /// Returns the edge kind.
    #[must_use]
    pub const fn kind(&self) -> &EdgeKind {
        &self.kind
    }
}
