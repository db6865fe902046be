//! `VLoopAnalyzer`: the single-pass pipeline over one counted loop
//! (`spec.md §4.9`).
//!
//! Composes every earlier stage in dataflow order and fails early,
//! mirroring `regalloc::context::Context::run`'s pass-by-pass bail-out
//! (see `vloop.rs`): preconditions, then reductions, memory slices, body
//! order, element types, and finally the dependence graph. A loop with
//! neither a reduction nor a store is rejected before any of the
//! expensive later stages run.

use crate::body::VLoopBody;
use crate::dependence::VLoopDependenceGraph;
use crate::dominator_tree::DominatorTree;
use crate::ir::{Graph, LoopId, Node};
use crate::isa::VectorIsa;
use crate::memory_slices::VLoopMemorySlices;
use crate::reductions::VLoopReductions;
use crate::result::{AnalyzerFailure, AutovecError, AutovecResult};
use crate::timing;
use crate::types::VLoopTypes;
use crate::vloop::VLoop;

/// The validated analysis bundle handed to the code generator
/// (`spec.md §6`, "It exposes to the code generator").
pub struct LoopAnalysis {
    pub reductions: VLoopReductions,
    pub memory_slices: VLoopMemorySlices,
    pub body: VLoopBody,
    pub types: VLoopTypes,
    pub dependence: VLoopDependenceGraph,
}

/// Pipeline entry point (`spec.md §4.9`).
pub struct VLoopAnalyzer;

impl VLoopAnalyzer {
    /// Run the full analysis pipeline over `lp`.
    ///
    /// `iv` is the loop's induction variable phi, threaded through to
    /// `VPointer` construction inside the dependence-graph stage.
    /// `allow_inner_control_flow` is forwarded to `VLoop::check_preconditions`
    /// unchanged.
    pub fn analyze(
        graph: &mut Graph,
        domtree: &DominatorTree,
        isa: &dyn VectorIsa,
        lp: LoopId,
        iv: Node,
        allow_inner_control_flow: bool,
    ) -> AutovecResult<LoopAnalysis> {
        let _tt = timing::analyzer();

        VLoop::check_preconditions(graph, isa, lp, allow_inner_control_flow)
            .map_err(AutovecError::from)?;

        if graph.loop_info(lp).max_unroll.is_none() {
            return Err(AutovecError::from(AnalyzerFailure::NoMaxUnrollSignal));
        }

        log::debug!("vloop analysis: detecting reductions");
        let reductions = VLoopReductions::detect(graph, lp);

        log::debug!("vloop analysis: partitioning memory slices");
        let memory_slices = VLoopMemorySlices::build(graph, lp).map_err(AutovecError::from)?;

        if reductions.iter().next().is_none() && memory_slices.slices().iter().all(|s| s.stores.is_empty()) {
            return Err(AutovecError::from(AnalyzerFailure::NoReductionOrStore));
        }

        log::debug!("vloop analysis: constructing body order");
        let body = VLoopBody::construct(graph, lp).map_err(AutovecError::from)?;

        log::debug!("vloop analysis: inferring element types");
        let types = VLoopTypes::infer(graph, lp, body.order());

        log::debug!("vloop analysis: building dependence graph");
        let dependence = VLoopDependenceGraph::build(graph, domtree, isa, lp, iv, &memory_slices);

        log::trace!(
            "vloop analysis complete: {} body nodes, {} slices",
            body.order().len(),
            memory_slices.slices().len()
        );

        Ok(LoopAnalysis {
            reductions,
            memory_slices,
            body,
            types,
            dependence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CountedLoopInfo, MemType, NodeData, Opcode};
    use crate::isa::HostIsa;

    /// `for (i=0;i<N;++i) a[i] = b[i] + 1;`: a well-formed loop with a
    /// single store should clear the whole pipeline.
    #[test]
    fn full_pipeline_succeeds_on_simple_store_loop() {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);

        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));
        let base_a = g.push(NodeData::new(Opcode::ConstL).with_imm(0x1000));
        let base_b = g.push(NodeData::new(Opcode::ConstL).with_imm(0x2000));

        let adr_b = g.push(NodeData::new(Opcode::AddP).with_inputs([base_b, iv, zero]));
        let mem_head = g.push(NodeData::new(Opcode::MemPhi).with_ctrl(header).with_alias_index(1));
        let load_b = g.push(
            NodeData::new(Opcode::Load)
                .with_inputs([adr_b])
                .with_ctrl(header)
                .with_mem_type(MemType::I32)
                .with_alias_index(2)
                .with_mem_in(mem_head),
        );
        let one = g.push(NodeData::new(Opcode::ConstI).with_imm(1));
        let sum = g.push(NodeData::new(Opcode::AddI).with_inputs([load_b, one]));

        let adr_a = g.push(NodeData::new(Opcode::AddP).with_inputs([base_a, iv, zero]));
        let store = g.push(
            NodeData::new(Opcode::Store)
                .with_inputs([adr_a, sum])
                .with_ctrl(header)
                .with_mem_type(MemType::I32)
                .with_alias_index(1)
                .with_mem_in(mem_head),
        );
        g.data_mut(mem_head).inputs = smallvec::smallvec![zero, store];

        let info = CountedLoopInfo {
            header,
            iv_phi: iv,
            init: zero,
            pre_loop_limit: None,
            stride: 1,
            is_main: false,
            already_vectorized: false,
            unroll_only: false,
            has_inner_control_flow: false,
            backedge_user: Some(header),
            pre_loop: None,
            max_unroll: Some(8),
        };
        let lp = g.push_loop(info);
        for n in [iv, adr_b, mem_head, load_b, sum, adr_a, store] {
            g.data_mut(n).loop_id = Some(lp);
        }

        let domtree = DominatorTree::compute(&g, start);
        let isa = HostIsa::default();
        let analysis = VLoopAnalyzer::analyze(&mut g, &domtree, &isa, lp, iv, false).unwrap();

        assert!(analysis.body.order()[0] == header);
        assert_eq!(analysis.memory_slices.slices().len(), 1);
        assert!(analysis.dependence.dep_node(store).is_some());
    }

    #[test]
    fn rejects_loop_with_no_reduction_or_store() {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);
        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));

        let info = CountedLoopInfo {
            header,
            iv_phi: iv,
            init: zero,
            pre_loop_limit: None,
            stride: 1,
            is_main: false,
            already_vectorized: false,
            unroll_only: false,
            has_inner_control_flow: false,
            backedge_user: Some(header),
            pre_loop: None,
            max_unroll: Some(1),
        };
        let lp = g.push_loop(info);
        g.data_mut(iv).loop_id = Some(lp);

        let domtree = DominatorTree::compute(&g, start);
        let isa = HostIsa::default();
        let err = VLoopAnalyzer::analyze(&mut g, &domtree, &isa, lp, iv, false).unwrap_err();
        assert_eq!(err, AutovecError::Analyzer(AnalyzerFailure::NoReductionOrStore));
    }

    #[test]
    fn rejects_loop_with_no_max_unroll_signal() {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);
        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));

        let info = CountedLoopInfo {
            header,
            iv_phi: iv,
            init: zero,
            pre_loop_limit: None,
            stride: 1,
            is_main: false,
            already_vectorized: false,
            unroll_only: false,
            has_inner_control_flow: false,
            backedge_user: Some(header),
            pre_loop: None,
            max_unroll: None,
        };
        let lp = g.push_loop(info);
        g.data_mut(iv).loop_id = Some(lp);

        let domtree = DominatorTree::compute(&g, start);
        let isa = HostIsa::default();
        let err = VLoopAnalyzer::analyze(&mut g, &domtree, &isa, lp, iv, false).unwrap_err();
        assert_eq!(err, AutovecError::Analyzer(AnalyzerFailure::NoMaxUnrollSignal));
    }
}
