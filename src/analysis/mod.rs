//! The per-method analysis engine: CFG, dominance, dataflow, stack
//! simulation and pattern matching.
//!
//! [`MethodAnalysis`] is the entry point detectors share for one method.
//! Every expensive artifact (the CFG, dominator relations, each dataflow
//! fixpoint, the stack scan) is computed at most once and memoized, so
//! dozens of detectors querying the same method pay for one computation.
//! Failures are memoized too: a method that fails structurally fails the
//! same way for every caller without rebuilding.

pub mod cfg;
pub mod dataflow;
pub mod pattern;
pub mod stack;

use std::cell::OnceCell;
use std::sync::Arc;

use crate::{
    analysis::{
        cfg::{build_cfg, Cfg, DominatorInfo},
        dataflow::{
            CallListAnalysis, Dataflow, DataflowAnalysis, DataflowSolver, LiveStoreAnalysis,
            LockSetAnalysis, NullnessAnalysis, TypeFlowAnalysis, ValueNumberAnalysis,
        },
        pattern::{Match, Pattern, PatternMatcher},
        stack::{OpcodeStack, StackScan},
    },
    bytecode::MethodBody,
    Error, Result,
};

/// Instruction-count threshold above which a method is skipped as
/// unprofitable to analyze.
pub const DEFAULT_INSTRUCTION_LIMIT: usize = 6000;

/// The memoized analysis context for one method.
///
/// All computation is lazy and single-threaded; results are shared as
/// `Arc`s so callers can hold them across queries. A context is cheap to
/// construct and owns nothing until the first query.
///
/// # Examples
///
/// ```rust,ignore
/// use jvmscope::analysis::MethodAnalysis;
///
/// let analysis = MethodAnalysis::new(method);
/// let cfg = analysis.cfg()?;
/// let nullness = analysis.nullness()?;
/// let fact = nullness.fact_before(location);
/// ```
pub struct MethodAnalysis {
    method: Arc<MethodBody>,
    instruction_limit: usize,
    cfg: OnceCell<Result<Arc<Cfg>>>,
    dominators: OnceCell<Result<Arc<DominatorInfo>>>,
    post_dominators: OnceCell<Result<Arc<DominatorInfo>>>,
    lock_sets: OnceCell<Result<Arc<Dataflow<LockSetAnalysis>>>>,
    nullness: OnceCell<Result<Arc<Dataflow<NullnessAnalysis>>>>,
    value_numbers: OnceCell<Result<Arc<Dataflow<ValueNumberAnalysis>>>>,
    live_stores: OnceCell<Result<Arc<Dataflow<LiveStoreAnalysis>>>>,
    call_lists: OnceCell<Result<Arc<Dataflow<CallListAnalysis>>>>,
    type_flow: OnceCell<Result<Arc<Dataflow<TypeFlowAnalysis>>>>,
    stack_scan: OnceCell<Result<Arc<StackScan>>>,
}

impl MethodAnalysis {
    /// Creates a context for one method with the default size limit.
    #[must_use]
    pub fn new(method: Arc<MethodBody>) -> Self {
        Self {
            method,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
            cfg: OnceCell::new(),
            dominators: OnceCell::new(),
            post_dominators: OnceCell::new(),
            lock_sets: OnceCell::new(),
            nullness: OnceCell::new(),
            value_numbers: OnceCell::new(),
            live_stores: OnceCell::new(),
            call_lists: OnceCell::new(),
            type_flow: OnceCell::new(),
            stack_scan: OnceCell::new(),
        }
    }

    /// Overrides the unprofitability threshold (instruction count).
    #[must_use]
    pub fn with_instruction_limit(mut self, limit: usize) -> Self {
        self.instruction_limit = limit;
        self
    }

    /// Returns the method under analysis.
    #[must_use]
    pub fn method(&self) -> &Arc<MethodBody> {
        &self.method
    }

    fn check_profitable(&self) -> Result<()> {
        let size = self.method.len();
        if size > self.instruction_limit {
            return Err(Error::Unprofitable {
                size,
                limit: self.instruction_limit,
            });
        }
        Ok(())
    }

    /// Returns the control flow graph, building it on first use.
    ///
    /// # Errors
    ///
    /// [`Error::Unprofitable`] when the method exceeds the size limit,
    /// [`Error::Structural`] when the instruction stream is unresolvable.
    /// The failure is memoized like any result.
    pub fn cfg(&self) -> Result<Arc<Cfg>> {
        self.cfg
            .get_or_init(|| {
                self.check_profitable()?;
                build_cfg(Arc::clone(&self.method)).map(Arc::new)
            })
            .clone()
    }

    /// Returns the dominator relation over non-exception edges.
    ///
    /// # Errors
    ///
    /// Propagates the memoized [`cfg`](Self::cfg) failure, if any.
    pub fn dominators(&self) -> Result<Arc<DominatorInfo>> {
        self.dominators
            .get_or_init(|| {
                let cfg = self.cfg()?;
                Ok(Arc::new(DominatorInfo::compute(&cfg)))
            })
            .clone()
    }

    /// Returns the post-dominator relation.
    ///
    /// # Errors
    ///
    /// Propagates the memoized [`cfg`](Self::cfg) failure, if any.
    pub fn post_dominators(&self) -> Result<Arc<DominatorInfo>> {
        self.post_dominators
            .get_or_init(|| {
                let cfg = self.cfg()?;
                Ok(Arc::new(DominatorInfo::compute_post(&cfg)))
            })
            .clone()
    }

    fn solve<A>(&self, cell: &OnceCell<Result<Arc<Dataflow<A>>>>, analysis: A) -> Result<Arc<Dataflow<A>>>
    where
        A: DataflowAnalysis,
    {
        cell.get_or_init(|| {
            let cfg = self.cfg()?;
            Ok(Arc::new(DataflowSolver::new(analysis).solve(cfg)))
        })
        .clone()
    }

    /// Returns the solved lock-set dataflow.
    ///
    /// # Errors
    ///
    /// Propagates the memoized [`cfg`](Self::cfg) failure, if any.
    pub fn lock_sets(&self) -> Result<Arc<Dataflow<LockSetAnalysis>>> {
        self.solve(&self.lock_sets, LockSetAnalysis::new())
    }

    /// Returns the solved nullness dataflow.
    ///
    /// # Errors
    ///
    /// Propagates the memoized [`cfg`](Self::cfg) failure, if any.
    pub fn nullness(&self) -> Result<Arc<Dataflow<NullnessAnalysis>>> {
        self.solve(&self.nullness, NullnessAnalysis::new())
    }

    /// Returns the solved value-numbering dataflow.
    ///
    /// # Errors
    ///
    /// Propagates the memoized [`cfg`](Self::cfg) failure, if any.
    pub fn value_numbers(&self) -> Result<Arc<Dataflow<ValueNumberAnalysis>>> {
        self.solve(&self.value_numbers, ValueNumberAnalysis::new())
    }

    /// Returns the solved live-store dataflow.
    ///
    /// # Errors
    ///
    /// Propagates the memoized [`cfg`](Self::cfg) failure, if any.
    pub fn live_stores(&self) -> Result<Arc<Dataflow<LiveStoreAnalysis>>> {
        self.solve(&self.live_stores, LiveStoreAnalysis::new())
    }

    /// Returns the solved call-list dataflow.
    ///
    /// # Errors
    ///
    /// Propagates the memoized [`cfg`](Self::cfg) failure, if any.
    pub fn call_lists(&self) -> Result<Arc<Dataflow<CallListAnalysis>>> {
        self.solve(&self.call_lists, CallListAnalysis::new())
    }

    /// Returns the solved type-tracking dataflow.
    ///
    /// # Errors
    ///
    /// Propagates the memoized [`cfg`](Self::cfg) failure, if any.
    pub fn type_flow(&self) -> Result<Arc<Dataflow<TypeFlowAnalysis>>> {
        self.solve(&self.type_flow, TypeFlowAnalysis::new())
    }

    /// Returns the single-pass stack scan.
    ///
    /// The scan does not need a CFG, but the size limit still applies.
    ///
    /// # Errors
    ///
    /// [`Error::Unprofitable`] when the method exceeds the size limit.
    pub fn stack_scan(&self) -> Result<Arc<StackScan>> {
        self.stack_scan
            .get_or_init(|| {
                self.check_profitable()?;
                Ok(Arc::new(OpcodeStack::scan(&self.method)))
            })
            .clone()
    }

    /// Runs the pattern matcher over this method.
    ///
    /// # Errors
    ///
    /// Propagates the memoized [`cfg`](Self::cfg) failure, if any.
    pub fn find_pattern(&self, pattern: &Pattern) -> Result<Vec<Match>> {
        let cfg = self.cfg()?;
        let dominators = self.dominators()?;
        Ok(PatternMatcher::new(&cfg, &dominators).find(pattern))
    }
}
