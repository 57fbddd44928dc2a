use thiserror::Error;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// All failures are scoped to a single method: the engine refuses to analyze one malformed or
/// oversized method body and signals that distinctly, so an outer driver can log and move on
/// to the next method or class. Nothing here is fatal to a whole scan.
///
/// # Error Categories
///
/// ## Structural Failures
/// - [`Error::Structural`] - The instruction stream or exception table is unresolvable
///   (e.g. a branch to a byte offset that is not an instruction boundary). The CFG builder
///   produces no graph for such a method.
///
/// ## Cost Control
/// - [`Error::Unprofitable`] - The method body exceeds the configured size threshold and
///   full analysis is not cost-effective. The engine signals "skip" rather than attempting
///   a fixpoint that may take unbounded time on huge generated methods.
///
/// ## Internal Invariants
/// - [`Error::Graph`] - An index or adjacency invariant of the flat graph representation
///   was violated. Seeing this indicates a bug in the builder, not bad input.
///
/// Note that querying a dataflow fact at an unreached location is *not* an error: those
/// queries return `None` (an invalid fact) and callers are required to branch on validity.
///
/// # Examples
///
/// ```rust,ignore
/// use jvmscope::{Error, analysis::MethodAnalysis};
///
/// match analysis.cfg() {
///     Ok(cfg) => println!("{} blocks", cfg.block_count()),
///     Err(Error::Structural { message, pc }) => {
///         eprintln!("skipping method: {message} (at pc {pc:?})");
///     }
///     Err(Error::Unprofitable { size, limit }) => {
///         eprintln!("skipping method: {size} instructions exceeds limit {limit}");
///     }
///     Err(e) => eprintln!("analysis error: {e}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The instruction stream or exception table for a method is unresolvable.
    ///
    /// This error occurs when the CFG builder encounters input it cannot turn into a
    /// well-formed graph: a branch or switch target that does not land on an instruction
    /// boundary, an exception handler entry outside the method, or an empty body. The
    /// builder refuses to produce a partial CFG.
    ///
    /// # Fields
    ///
    /// * `message` - Description of what was unresolvable
    /// * `pc` - The byte offset of the offending instruction, when known
    #[error("structural build failure{}: {message}", pc.map(|p| format!(" at pc {p}")).unwrap_or_default())]
    Structural {
        /// Description of the structural problem.
        message: String,
        /// Byte offset of the instruction that triggered the failure, if known.
        pc: Option<u32>,
    },

    /// The method body is too large for full analysis to be cost-effective.
    ///
    /// Huge generated methods (parser tables, builder chains) can make the fixpoint
    /// solver arbitrarily slow. Above the configured instruction-count threshold the
    /// engine skips the method instead of timing out.
    #[error("method body has {size} instructions, exceeding the analysis limit of {limit}")]
    Unprofitable {
        /// Number of instructions in the method body.
        size: usize,
        /// The configured instruction-count limit.
        limit: usize,
    },

    /// An internal graph invariant was violated.
    ///
    /// The CFG stores blocks and edges in flat arrays indexed by id; this error is
    /// raised when an id is out of range or an adjacency list refers to a missing
    /// edge. It indicates a bug in graph construction rather than malformed input.
    #[error("{0}")]
    Graph(String),
}

impl Error {
    /// Creates a [`Error::Structural`] with no associated program counter.
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Error::Structural {
            message: message.into(),
            pc: None,
        }
    }

    /// Creates a [`Error::Structural`] tied to the instruction at `pc`.
    pub(crate) fn structural_at(message: impl Into<String>, pc: u32) -> Self {
        Error::Structural {
            message: message.into(),
            pc: Some(pc),
        }
    }
}
