//! Control flow graph construction and dominance analysis.
//!
//! This module turns one method's instruction stream into a [`Cfg`] of
//! [`BasicBlock`]s connected by typed [`CfgEdge`]s, and computes the
//! dominance/post-dominance relations over it. It is the foundation the
//! dataflow solver and the pattern matcher are layered on.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jvmscope::analysis::cfg::{build_cfg, DominatorInfo};
//!
//! let cfg = build_cfg(Arc::new(method))?;
//! let dom = DominatorInfo::compute(&cfg);
//! assert!(dom.dominates(cfg.entry(), some_block));
//! ```

mod block;
mod builder;
mod dominators;
mod edge;
mod graph;

pub use block::{BasicBlock, BlockId, BlockKind, Location};
pub use builder::build_cfg;
pub use dominators::DominatorInfo;
pub use edge::{CfgEdge, EdgeId, EdgeKind};
pub use graph::Cfg;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        bytecode::MethodBody,
        test::asm::{self, MethodBuilder},
        Error,
    };

    fn cfg_of(method: MethodBody) -> Cfg {
        build_cfg(Arc::new(method)).expect("CFG build failed")
    }

    #[test]
    fn straight_line_method_is_one_block() {
        // int f(int a) { return a; }
        let method = MethodBuilder::new_static(1)
            .iload(0)
            .ireturn()
            .finish();
        let cfg = cfg_of(method);

        assert_eq!(cfg.real_block_count(), 1);
        let first = BlockId::new(0);
        assert_eq!(cfg.instructions(first).len(), 2);
        assert!(cfg
            .out_edges(first)
            .any(|e| *e.kind() == EdgeKind::Return && e.target() == cfg.exit()));
        assert!(cfg
            .out_edges(cfg.entry())
            .any(|e| *e.kind() == EdgeKind::Start));
    }

    #[test]
    fn conditional_branch_splits_blocks() {
        // if (a != 0) { b = 1; } else { b = 2; } return b;
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
        let cfg = cfg_of(method);

        assert_eq!(cfg.real_block_count(), 4);
        let cond = BlockId::new(0);
        let kinds: Vec<_> = cfg.out_edges(cond).map(|e| e.kind().clone()).collect();
        assert!(kinds.contains(&EdgeKind::BranchTaken));
        assert!(kinds.contains(&EdgeKind::FallThrough));

        // edge_between answers over the full edge set.
        let fall = cfg.edge_between(cond, BlockId::new(1)).expect("edge");
        assert_eq!(*fall.kind(), EdgeKind::FallThrough);
        assert!(cfg.edge_between(BlockId::new(1), cond).is_none());
    }

    #[test]
    fn switch_arms_get_typed_edges() {
        let method = MethodBuilder::new_static(1)
            .iload(0)
            .switch(vec![(0, "zero"), (1, "one")], "other")
            .label("zero")
            .return_()
            .label("one")
            .return_()
            .label("other")
            .return_()
            .finish();
        let cfg = cfg_of(method);

        assert_eq!(
            cfg.count_edges_where(EdgeKind::is_switch),
            3 // two cases + default
        );
        assert_eq!(
            cfg.count_edges_where(|k| matches!(k, EdgeKind::SwitchDefault)),
            1
        );
    }

    #[test]
    fn exception_table_routes_handler_edges() {
        // try { x.foo(); } catch (Exception e) { return; } return;
        let method = asm::try_catch_method();
        let cfg = cfg_of(method);

        assert_eq!(
            cfg.count_edges_where(|k| matches!(k, EdgeKind::HandledException { .. })),
            1
        );
        // Typed handler: the exception may still escape.
        assert_eq!(
            cfg.count_edges_where(|k| matches!(k, EdgeKind::UnhandledException)),
            1
        );

        // edge_between reports handler edges too.
        let edge = cfg
            .edge_between(BlockId::new(0), BlockId::new(1))
            .expect("handler edge");
        assert!(edge.kind().is_exception());
    }

    #[test]
    fn bad_branch_target_is_structural_failure() {
        let method = MethodBuilder::new_static(1)
            .iload(0)
            .ifeq_pc(9999)
            .return_()
            .finish();
        let err = build_cfg(Arc::new(method)).unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
    }

    #[test]
    fn infinite_loop_gets_synthetic_exit_edge() {
        let method = MethodBuilder::new_static(0)
            .label("top")
            .goto_("top")
            .finish();
        let cfg = cfg_of(method);

        assert!(cfg
            .out_edges(cfg.entry())
            .any(|e| *e.kind() == EdgeKind::Exit && e.target() == cfg.exit()));
    }

    #[test]
    fn unreachable_block_is_flagged_dead() {
        // goto over a block that nothing targets
        let method = MethodBuilder::new_static(0)
            .goto_("end")
            .iconst(1)
            .istore(0)
            .label("end")
            .return_()
            .finish();
        let cfg = cfg_of(method);

        let dead = BlockId::new(1);
        assert!(!cfg.is_live(dead));
        assert!(cfg.is_live(BlockId::new(0)));
        assert!(cfg.is_live(cfg.exit()));
    }

    #[test]
    fn every_non_exit_block_has_a_successor() {
        let cfg = cfg_of(asm::try_catch_method());
        for block in cfg.blocks() {
            if block.id() != cfg.exit() && cfg.is_live(block.id()) {
                assert!(
                    cfg.out_edges(block.id()).next().is_some(),
                    "{} has no outgoing edge",
                    block.id()
                );
            }
        }
    }

    #[test]
    fn dominators_on_diamond() {
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
        let cfg = cfg_of(method);
        let dom = DominatorInfo::compute(&cfg);

        let cond = BlockId::new(0);
        let then_arm = BlockId::new(1);
        let else_arm = BlockId::new(2);
        let join = BlockId::new(3);

        assert!(dom.dominates(cfg.entry(), join));
        assert!(dom.dominates(cond, join));
        assert!(!dom.dominates(then_arm, join));
        assert!(!dom.dominates(else_arm, join));
        // Reflexivity
        for block in cfg.blocks() {
            if cfg.is_live(block.id()) {
                assert!(dom.dominates(block.id(), block.id()));
            }
        }
    }

    #[test]
    fn postdominators_on_diamond() {
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
        let cfg = cfg_of(method);
        let pdom = DominatorInfo::compute_post(&cfg);

        let cond = BlockId::new(0);
        let join = BlockId::new(3);
        assert!(pdom.dominates(join, cond));
        assert!(pdom.dominates(cfg.exit(), cond));
    }

    #[test]
    fn unreachable_block_has_undefined_dominators() {
        let method = MethodBuilder::new_static(0)
            .goto_("end")
            .iconst(1)
            .istore(0)
            .label("end")
            .return_()
            .finish();
        let cfg = cfg_of(method);
        let dom = DominatorInfo::compute(&cfg);

        let dead = BlockId::new(1);
        assert!(dom.dominators_of(dead).is_none());
        // Not even self-domination for dead code: undefined, not "everything".
        assert!(!dom.dominates(dead, dead));
        assert!(!dom.dominates(cfg.entry(), dead));
    }

    #[test]
    fn locations_iterate_in_program_order() {
        let method = MethodBuilder::new_static(1)
            .iload(0)
            .ifeq("end")
            .iconst(1)
            .istore(0)
            .label("end")
            .return_()
            .finish();
        let cfg = cfg_of(method);

        let pcs: Vec<u32> = cfg
            .locations()
            .map(|loc| cfg.pc_of(loc).unwrap())
            .collect();
        let mut sorted = pcs.clone();
        sorted.sort_unstable();
        assert_eq!(pcs, sorted);
        assert_eq!(pcs.len(), cfg.method().len());
    }
}
