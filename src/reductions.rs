//! Reduction cycle detection (`spec.md §4.4`).
//!
//! For each non-induction phi at the loop header, walks backward from the
//! phi's backedge input looking for a chain of same-opcode arithmetic nodes
//! that closes back onto the phi. Chains are accepted only when every node
//! on the chain is otherwise unused within the loop body — an intermediate
//! result leaking out would make the reduction unsafe to reassociate.

use crate::ir::{Graph, LoopId, Node, Opcode};
use crate::timing;
use crate::{HashMap, HashSet};
use std::vec::Vec;

/// The search is bounded by a small constant (`spec.md §4.4`, "The search
/// is bounded by a small constant"): this is comfortably more than any
/// realistic unroll factor reduction chain.
const MAX_CHAIN: usize = 8;

/// The set of node ids recognized as participating in a reduction cycle
/// (`spec.md §3`, "Reductions set").
pub struct VLoopReductions {
    members: HashSet<Node>,
}

impl VLoopReductions {
    /// Whether `n` participates in a recognized reduction cycle.
    pub fn contains(&self, n: Node) -> bool {
        self.members.contains(&n)
    }

    /// All recognized reduction-cycle members.
    pub fn iter(&self) -> impl Iterator<Item = Node> + '_ {
        self.members.iter().copied()
    }

    /// Detect every reduction cycle in `lp` (`spec.md §4.4`).
    pub fn detect(graph: &Graph, lp: LoopId) -> Self {
        let _tt = timing::reductions();
        let info = graph.loop_info(lp);
        let iv_phi = info.iv_phi;

        let body_members: HashSet<Node> = graph.members_of(lp).into_iter().collect();
        let use_map = build_use_map(graph, &body_members);

        let mut members = HashSet::new();
        for &n in &body_members {
            if n == iv_phi {
                continue;
            }
            let data = graph.data(n);
            if data.opcode != Opcode::Phi || data.ctrl != Some(info.header) {
                continue;
            }
            if data.inputs.len() != 2 {
                continue;
            }
            let backedge_input = data.inputs[1];
            if let Some(chain) = find_cycle(graph, lp, n, backedge_input) {
                if chain_is_internal(&chain, n, &use_map) {
                    members.extend(chain);
                }
            }
        }

        VLoopReductions { members }
    }
}

/// Map from a node to every in-body node that consumes it as a data input.
fn build_use_map(graph: &Graph, body_members: &HashSet<Node>) -> HashMap<Node, Vec<Node>> {
    let mut use_map: HashMap<Node, Vec<Node>> = HashMap::new();
    for &n in body_members {
        for &input in graph.data(n).inputs.iter() {
            use_map.entry(input).or_default().push(n);
        }
    }
    use_map
}

/// Walk backward from `backedge_input` looking for a chain of same-opcode
/// reduction-candidate nodes that closes onto `phi`. Returns the chain in
/// order from `backedge_input` (closest to the phi) to the node whose
/// operand is literally `phi`.
fn find_cycle(graph: &Graph, lp: LoopId, phi: Node, backedge_input: Node) -> Option<Vec<Node>> {
    trace(graph, lp, phi, backedge_input, None, 0, &mut Vec::new())
}

fn trace(
    graph: &Graph,
    lp: LoopId,
    phi: Node,
    cur: Node,
    opcode: Option<Opcode>,
    depth: usize,
    path: &mut Vec<Node>,
) -> Option<Vec<Node>> {
    if depth >= MAX_CHAIN {
        return None;
    }
    if !graph.is_member(cur, lp) {
        return None;
    }
    let data = graph.data(cur);
    if !data.opcode.is_reduction_candidate() {
        return None;
    }
    if let Some(op) = opcode {
        if data.opcode != op {
            return None;
        }
    }
    if data.inputs.len() != 2 {
        return None;
    }

    // Tolerates commutative swaps (`spec.md §4.4`): either operand may be
    // the accumulator link, so both are tried.
    for &candidate in &[data.inputs[0], data.inputs[1]] {
        if candidate == phi {
            path.push(cur);
            return Some(path.clone());
        }
    }
    for &candidate in &[data.inputs[0], data.inputs[1]] {
        path.push(cur);
        if let Some(found) = trace(graph, lp, phi, candidate, Some(data.opcode), depth + 1, path) {
            return Some(found);
        }
        path.pop();
    }
    None
}

/// "No intermediate node is used outside the cycle (within the loop body)"
/// (`spec.md §4.4`): each chain node's only permitted in-body user is the
/// next node toward the phi (or the phi itself, for the node closest to
/// it).
fn chain_is_internal(chain: &[Node], phi: Node, use_map: &HashMap<Node, Vec<Node>>) -> bool {
    for (i, &n) in chain.iter().enumerate() {
        let permitted = if i == 0 { phi } else { chain[i - 1] };
        let users = match use_map.get(&n) {
            Some(u) => u,
            None => return false,
        };
        if users.iter().any(|&u| u != permitted) {
            return false;
        }
        if !users.contains(&permitted) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CountedLoopInfo, MemType, NodeData};

    /// `sum += a[i]` with unroll factor 1: a single `AddI` cycle
    /// (`spec.md §8` scenario S4, degenerate unroll=1 case).
    #[test]
    fn single_add_reduction_cycle_recognized() {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);

        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));
        let base = g.push(NodeData::new(Opcode::ConstL).with_imm(0x1000));
        let adr = g.push(NodeData::new(Opcode::AddP).with_inputs([base, iv, zero]));
        let load = g.push(
            NodeData::new(Opcode::Load)
                .with_inputs([adr])
                .with_ctrl(header)
                .with_mem_type(MemType::I32)
                .with_alias_index(1),
        );

        let sum_phi = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let add = g.push(NodeData::new(Opcode::AddI).with_inputs([sum_phi, load]));
        // Close the phi's backedge input onto `add` after the fact (entity
        // maps don't allow forward-referencing inputs at construction).
        g.data_mut(sum_phi).inputs = smallvec::smallvec![zero, add];

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
        for n in [iv, adr, load, sum_phi, add] {
            g.data_mut(n).loop_id = Some(lp);
        }

        let reductions = VLoopReductions::detect(&g, lp);
        assert!(reductions.contains(add));
        assert!(!reductions.contains(sum_phi));
        assert!(!reductions.contains(load));
    }

    #[test]
    fn leaking_intermediate_blocks_recognition() {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);
        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));
        let base = g.push(NodeData::new(Opcode::ConstL).with_imm(0x1000));
        let adr = g.push(NodeData::new(Opcode::AddP).with_inputs([base, iv, zero]));
        let load = g.push(
            NodeData::new(Opcode::Load)
                .with_inputs([adr])
                .with_ctrl(header)
                .with_mem_type(MemType::I32)
                .with_alias_index(1),
        );
        let sum_phi = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let add = g.push(NodeData::new(Opcode::AddI).with_inputs([sum_phi, load]));
        g.data_mut(sum_phi).inputs = smallvec::smallvec![zero, add];
        // An extra, unrelated use of `add` inside the loop body: this
        // should block recognition since `add`'s result now escapes the
        // cycle.
        let extra = g.push(NodeData::new(Opcode::AddI).with_inputs([add, load]));

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
        for n in [iv, adr, load, sum_phi, add, extra] {
            g.data_mut(n).loop_id = Some(lp);
        }

        let reductions = VLoopReductions::detect(&g, lp);
        assert!(!reductions.contains(add));
    }
}
