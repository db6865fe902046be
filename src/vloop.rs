//! Loop-level gatekeeper (`spec.md §4.3`).
//!
//! `VLoop::check_preconditions` is the first stage of `VLoopAnalyzer`'s
//! pipeline (`spec.md §2`, dataflow). It rejects a loop outright before any
//! scratch structures (body order, dependence graph, ...) are built, the
//! way `regalloc::context::Context::run` bails out of its pipeline on the
//! first failing pass rather than building later-stage state speculatively.

use crate::ir::{Graph, LoopId};
use crate::isa::VectorIsa;
use crate::result::PreconditionFailure;
use crate::timing;

/// Loop-level precondition checks (`spec.md §4.3`).
pub struct VLoop;

impl VLoop {
    /// Reject `lp` unless every precondition in `spec.md §4.3` holds.
    ///
    /// `allow_inner_control_flow` is the caller's explicit opt-in for loops
    /// whose body contains control flow (normally disallowed).
    pub fn check_preconditions(
        graph: &Graph,
        isa: &dyn VectorIsa,
        lp: LoopId,
        allow_inner_control_flow: bool,
    ) -> Result<(), PreconditionFailure> {
        let _tt = timing::preconditions();
        let info = graph.loop_info(lp);

        // The platform must have a power-of-two byte-vector width of at
        // least 2. `VectorIsa::vector_width_in_bytes` is queried with the
        // induction variable's own element kind as a representative probe;
        // the real element-type-specific query happens later, per memory
        // reference, once `VLoopTypes` has run.
        let iv_kind = crate::ir::ElementKind::full_int();
        let width = isa.vector_width_in_bytes(iv_kind);
        if width < 2 || (width & (width - 1)) != 0 {
            return Err(PreconditionFailure::NoVectorWidth);
        }

        // "Valid counted integer loop": a nonzero constant stride and a
        // recognizable induction-variable phi at the header. Both are
        // structural facts the host is assumed to have already verified
        // when it populated `CountedLoopInfo`; here we only check the
        // parts visible to this crate.
        if info.stride == 0 {
            return Err(PreconditionFailure::NotCountedLoop);
        }

        if info.already_vectorized {
            return Err(PreconditionFailure::AlreadyVectorized);
        }

        if info.unroll_only {
            return Err(PreconditionFailure::UnrollOnly);
        }

        if info.has_inner_control_flow && !allow_inner_control_flow {
            return Err(PreconditionFailure::InBodyControlFlow);
        }

        if info.backedge_user.is_none() {
            return Err(PreconditionFailure::BackedgeNotUnique);
        }

        if info.is_main && info.pre_loop_limit.is_none() {
            return Err(PreconditionFailure::MissingPreLoopLimit);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CountedLoopInfo, NodeData, Opcode};
    use crate::isa::HostIsa;

    fn base_info(header: crate::ir::Node, iv: crate::ir::Node, init: crate::ir::Node) -> CountedLoopInfo {
        CountedLoopInfo {
            header,
            iv_phi: iv,
            init,
            pre_loop_limit: None,
            stride: 1,
            is_main: false,
            already_vectorized: false,
            unroll_only: false,
            has_inner_control_flow: false,
            backedge_user: Some(header),
            pre_loop: None,
            max_unroll: Some(4),
        }
    }

    fn setup() -> (Graph, LoopId) {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);
        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let init = g.push(NodeData::new(Opcode::ConstI).with_imm(0));
        let lp = g.push_loop(base_info(header, iv, init));
        (g, lp)
    }

    #[test]
    fn accepts_a_well_formed_counted_loop() {
        let (g, lp) = setup();
        let isa = HostIsa::default();
        assert!(VLoop::check_preconditions(&g, &isa, lp, false).is_ok());
    }

    #[test]
    fn rejects_already_vectorized() {
        let (mut g, lp) = setup();
        g.loop_info(lp); // sanity: loop exists
        let mut info = base_info(
            g.loop_info(lp).header,
            g.loop_info(lp).iv_phi,
            g.loop_info(lp).init,
        );
        info.already_vectorized = true;
        let lp2 = g.push_loop(info);
        let isa = HostIsa::default();
        assert_eq!(
            VLoop::check_preconditions(&g, &isa, lp2, false),
            Err(PreconditionFailure::AlreadyVectorized)
        );
    }

    #[test]
    fn rejects_main_loop_without_pre_loop_limit() {
        let (mut g, lp) = setup();
        let mut info = base_info(
            g.loop_info(lp).header,
            g.loop_info(lp).iv_phi,
            g.loop_info(lp).init,
        );
        info.is_main = true;
        info.pre_loop_limit = None;
        let lp2 = g.push_loop(info);
        let isa = HostIsa::default();
        assert_eq!(
            VLoop::check_preconditions(&g, &isa, lp2, false),
            Err(PreconditionFailure::MissingPreLoopLimit)
        );
    }

    #[test]
    fn rejects_no_vector_width() {
        let (g, lp) = setup();
        let isa = HostIsa {
            vector_width: 1,
            ..HostIsa::default()
        };
        assert_eq!(
            VLoop::check_preconditions(&g, &isa, lp, false),
            Err(PreconditionFailure::NoVectorWidth)
        );
    }
}
