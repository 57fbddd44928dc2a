//! Engine-level properties: determinism, lattice laws, dominance and CFG
//! well-formedness.

mod common;

use std::fmt::Debug;
use std::sync::Arc;

use jvmscope::prelude::*;

fn cfg_of(method: MethodBody) -> Arc<Cfg> {
    Arc::new(build_cfg(Arc::new(method)).expect("CFG"))
}

/// Idempotence, commutativity and associativity over sample facts.
fn assert_meet_laws<L: MeetSemiLattice + Debug>(samples: &[L]) {
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

/// Collects every valid block fact a solved analysis produced.
fn harvest<A: DataflowAnalysis>(flow: &Dataflow<A>) -> Vec<A::Fact> {
    let mut facts = Vec::new();
    for block in flow.cfg().blocks() {
        if let Some(fact) = flow.fact_at_block_start(block.id()) {
            facts.push(fact.clone());
        }
        if let Some(fact) = flow.fact_at_block_end(block.id()) {
            facts.push(fact.clone());
        }
    }
    facts
}

#[test]
fn solving_twice_yields_identical_facts() {
    for method in [common::null_checked_call(), common::diamond()] {
        let cfg = cfg_of(method);
        let a = DataflowSolver::new(NullnessAnalysis::new()).solve(Arc::clone(&cfg));
        let b = DataflowSolver::new(NullnessAnalysis::new()).solve(Arc::clone(&cfg));

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
        for location in cfg.locations() {
            assert_eq!(a.fact_before(location), b.fact_before(location));
            assert_eq!(a.fact_after(location), b.fact_after(location));
        }
    }
}

#[test]
fn meet_laws_hold_for_every_concrete_lattice() {
    // Sample each lattice with facts an actual solve produced, so the laws
    // are checked on the states the engine really merges.
    let locks = DataflowSolver::new(LockSetAnalysis::new())
        .solve(cfg_of(common::conditional_synchronized()));
    assert_meet_laws(&harvest(&locks));

    let nullness =
        DataflowSolver::new(NullnessAnalysis::new()).solve(cfg_of(common::null_checked_call()));
    assert_meet_laws(&harvest(&nullness));

    let types = DataflowSolver::new(TypeFlowAnalysis::new()).solve(cfg_of(common::diamond()));
    assert_meet_laws(&harvest(&types));

    let live = DataflowSolver::new(LiveStoreAnalysis::new()).solve(cfg_of(common::diamond()));
    assert_meet_laws(&harvest(&live));

    let calls =
        DataflowSolver::new(CallListAnalysis::new()).solve(cfg_of(common::null_checked_call()));
    assert_meet_laws(&harvest(&calls));
}

#[test]
fn entry_dominates_every_live_block() {
    let cfg = cfg_of(common::diamond());
    let dom = DominatorInfo::compute(&cfg);

    for block in cfg.blocks() {
        if cfg.is_live(block.id()) {
            assert!(dom.dominates(block.id(), block.id()), "{} not reflexive", block.id());
            assert!(
                dom.dominates(cfg.entry(), block.id()),
                "ENTRY does not dominate {}",
                block.id()
            );
        }
        assert!(!dom.strictly_dominates(block.id(), block.id()));
    }

    // The condition block sits on every path to the join; the arms do not.
    let cond = BlockId::new(0);
    let join = BlockId::new(3);
    assert!(dom.dominates(cond, join));
    assert!(!dom.dominates(BlockId::new(1), join));
    assert!(!dom.dominates(BlockId::new(2), join));
}

#[test]
fn exit_post_dominates_every_live_block() {
    let cfg = cfg_of(common::diamond());
    let post = DominatorInfo::compute_post(&cfg);

    for block in cfg.blocks() {
        if cfg.is_live(block.id()) {
            assert!(post.dominates(cfg.exit(), block.id()));
        }
    }
    // The join sits on every path from the condition to EXIT.
    assert!(post.dominates(BlockId::new(3), BlockId::new(0)));
}

#[test]
fn graphs_are_well_formed() {
    for method in [
        common::diamond(),
        common::conditional_synchronized(),
        common::code_after_throw(),
        common::lazy_init(),
    ] {
        let len = method.len();
        let cfg = cfg_of(method);

        assert_eq!(cfg.in_edges(cfg.entry()).count(), 0, "ENTRY has predecessors");
        assert_eq!(cfg.out_edges(cfg.exit()).count(), 0, "EXIT has successors");

        for block in cfg.blocks() {
            if block.id() != cfg.exit() && cfg.is_live(block.id()) {
                assert!(
                    cfg.out_edges(block.id()).count() > 0,
                    "live block {} has no outgoing edge",
                    block.id()
                );
            }
        }

        // Program-order location iteration covers every instruction once.
        let pcs: Vec<u32> = cfg
            .locations()
            .map(|loc| cfg.pc_of(loc).expect("pc"))
            .collect();
        assert_eq!(pcs.len(), len);
        assert!(pcs.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn visited_status_matches_liveness_in_both_directions() {
    for method in [common::diamond(), common::code_after_throw()] {
        let cfg = cfg_of(method);
        let forward = DataflowSolver::new(NullnessAnalysis::new()).solve(Arc::clone(&cfg));
        let backward = DataflowSolver::new(LiveStoreAnalysis::new()).solve(Arc::clone(&cfg));

        for block in cfg.blocks() {
            assert_eq!(
                forward.is_visited(block.id()),
                cfg.is_live(block.id()),
                "forward visit of {} disagrees with liveness",
                block.id()
            );
            assert_eq!(
                backward.is_visited(block.id()),
                cfg.is_live(block.id()),
                "backward visit of {} disagrees with liveness",
                block.id()
            );
        }
    }
}
