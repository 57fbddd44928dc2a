//! The lattice trait dataflow facts implement.
//!
//! A fact type forms a meet semi-lattice: values can be combined at control
//! flow merge points with a `meet` operation that only ever loses precision.
//! The solver requires:
//!
//! - **Idempotent**: `x.meet(x) == x`
//! - **Commutative**: `x.meet(y) == y.meet(x)`
//! - **Associative**: `x.meet(y.meet(z)) == x.meet(y).meet(z)`
//! - **Monotone**: `x.meet(y)` is never more precise than `x` or `y`
//! - **Finite height**: chains of strictly-decreasing meets are finite
//!
//! The last two are termination contracts the engine cannot check; a
//! non-monotone meet or an infinite-height lattice makes the fixpoint loop
//! forever. Each concrete analysis in this crate documents why its lattice
//! is finite.
//!
//! There is deliberately no `top()` constructor here: the solver models
//! "never computed" with an explicit
//! [`BlockFact::Unvisited`](crate::analysis::dataflow::BlockFact) sentinel
//! that acts as the meet identity, so a fact type only ever represents
//! states that some execution path actually produced. Conflating the two is
//! the classic source of "dead code has an empty fact" bugs.

use std::fmt::Debug;

/// A meet semi-lattice; the interface every dataflow fact implements.
pub trait MeetSemiLattice: Clone + Debug + PartialEq {
    /// Computes the meet (combine at a control-flow merge) of two facts.
    ///
    /// The result must be no more precise than either operand.
    #[must_use]
    fn meet(&self, other: &Self) -> Self;
}

#[cfg(test)]
pub(crate) mod laws {
    //! Reusable lattice-law assertions for analysis unit tests.

    use super::MeetSemiLattice;

    /// Asserts idempotence, commutativity and associativity over the given
    /// sample values.
    pub(crate) fn assert_meet_laws<L: MeetSemiLattice>(samples: &[L]) {
        for a in samples {
            assert_eq!(a.meet(a), *a, "meet not idempotent for {a:?}");
            for b in samples {
                assert_eq!(a.meet(b), b.meet(a), "meet not commutative for {a:?}, {b:?}");
                for c in samples {
                    assert_eq!(
                        a.meet(&b.meet(c)),
                        a.meet(b).meet(c),
                        "meet not associative for {a:?}, {b:?}, {c:?}"
                    );
                }
            }
        }
    }
}
