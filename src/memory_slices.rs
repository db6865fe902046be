//! Alias-disjoint memory slice partitioning (`spec.md §4.5`).
//!
//! A slice is the set of memory operations reachable along one memory
//! phi's chain that all share that phi's alias class. `VLoopMemorySlices`
//! finds every such phi at the loop header (a "head"), follows its
//! backedge ("tail") up the chain of stores back to the head, and attaches
//! every load that hangs off one of those stores (`mem_in` pointing at it)
//! or directly off the head (for loads preceding the first store).

use crate::ir::{Graph, LoopId, Node, Opcode};
use crate::result::AnalyzerFailure;
use crate::timing;
use crate::HashSet;
use std::vec::Vec;

/// One alias-disjoint slice: the memory phi heading it, the node feeding
/// its backedge, and every store/load reachable along the chain
/// (`spec.md §3`, "Memory slices").
#[derive(Clone, Debug)]
pub struct Slice {
    /// The memory-phi node at the loop header.
    pub head: Node,
    /// The node feeding the phi's loop-back edge.
    pub tail: Node,
    /// Stores in the chain, in program order (head-to-tail).
    pub stores: Vec<Node>,
    /// Loads hanging off the head or any store in this slice, unordered.
    pub loads: Vec<Node>,
}

impl Slice {
    /// Every memory node belonging to this slice, head first.
    pub fn members(&self) -> Vec<Node> {
        let mut v = Vec::with_capacity(1 + self.stores.len() + self.loads.len());
        v.push(self.head);
        v.extend(self.stores.iter().copied());
        v.extend(self.loads.iter().copied());
        v
    }
}

/// The partition of a loop's memory operations into alias-disjoint slices
/// (`spec.md §4.5`).
pub struct VLoopMemorySlices {
    slices: Vec<Slice>,
}

impl VLoopMemorySlices {
    /// The discovered slices, one per memory phi with a genuine backedge.
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Partition `lp`'s memory operations (`spec.md §4.5`).
    pub fn build(graph: &Graph, lp: LoopId) -> Result<Self, AnalyzerFailure> {
        let _tt = timing::memory_slices();
        let info = graph.loop_info(lp);
        let body_members: HashSet<Node> = graph.members_of(lp).into_iter().collect();

        let mut slices = Vec::new();
        let mut heads: Vec<Node> = body_members
            .iter()
            .copied()
            .filter(|&n| graph.data(n).opcode == Opcode::MemPhi && graph.data(n).ctrl == Some(info.header))
            .collect();
        heads.sort();

        for head in heads {
            let data = graph.data(head);
            if data.inputs.len() != 2 {
                continue;
            }
            let (entry, tail) = (data.inputs[0], data.inputs[1]);
            if entry == tail {
                // No genuine backedge: this slice sees no memory traffic
                // inside the loop.
                continue;
            }
            slices.push(get_slice(graph, &body_members, head, tail)?);
        }

        Ok(VLoopMemorySlices { slices })
    }
}

/// `get_slice(head, tail)` (`spec.md §4.5`): walk the store chain from
/// `tail` back to `head`, then attach every load hanging off the head or
/// one of the discovered stores.
fn get_slice(
    graph: &Graph,
    body_members: &HashSet<Node>,
    head: Node,
    tail: Node,
) -> Result<Slice, AnalyzerFailure> {
    let mut stores_reverse = Vec::new();
    let mut cur = tail;
    loop {
        if cur == head {
            break;
        }
        if !body_members.contains(&cur) {
            // Chain left the loop body without reaching the head again:
            // only acceptable if it landed on a non-body memory phi
            // (whitelisted per `spec.md §4.5`).
            if graph.data(cur).opcode == Opcode::MemPhi {
                break;
            }
            return Err(AnalyzerFailure::NodeNotAllowed);
        }
        let data = graph.data(cur);
        match data.opcode {
            Opcode::Store => {
                stores_reverse.push(cur);
                match data.mem_in {
                    Some(prev) => cur = prev,
                    None => return Err(AnalyzerFailure::NodeNotAllowed),
                }
            }
            Opcode::MemPhi => {
                // A non-body memory phi reached mid-chain: whitelisted,
                // chain ends here (`spec.md §4.5`).
                break;
            }
            _ => return Err(AnalyzerFailure::NodeNotAllowed),
        }
    }
    stores_reverse.reverse();
    let stores = stores_reverse;

    let chain_set: HashSet<Node> = std::iter::once(head).chain(stores.iter().copied()).collect();
    let alias = graph.get_alias_index(head);

    let mut loads = Vec::new();
    for &n in body_members {
        if graph.data(n).opcode != Opcode::Load {
            continue;
        }
        if graph.get_alias_index(n) != alias {
            continue;
        }
        if let Some(mem_in) = graph.data(n).mem_in {
            if chain_set.contains(&mem_in) {
                loads.push(n);
            }
        }
    }
    loads.sort();

    Ok(Slice {
        head,
        tail,
        stores,
        loads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CountedLoopInfo, MemType, NodeData};

    /// `for (i=0;i<N;++i) { a[i] = b[i]; }`: one slice for `a` (a single
    /// store chained to the phi) and `b`'s load hangs off the phi
    /// directly (no prior store to this slice ever exists, so `b`'s
    /// alias class has no phi/slice of its own here — it is tested
    /// instead as a load attached to `a`'s own slice to exercise the
    /// attachment logic without needing a second phi).
    #[test]
    fn single_store_slice_with_attached_load() {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);

        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));
        let base = g.push(NodeData::new(Opcode::ConstL).with_imm(0x1000));
        let adr = g.push(NodeData::new(Opcode::AddP).with_inputs([base, iv, zero]));

        let mem_head = g.push(NodeData::new(Opcode::MemPhi).with_ctrl(header).with_alias_index(1));
        let load = g.push(
            NodeData::new(Opcode::Load)
                .with_inputs([adr])
                .with_ctrl(header)
                .with_mem_type(MemType::I32)
                .with_alias_index(1)
                .with_mem_in(mem_head),
        );
        let store = g.push(
            NodeData::new(Opcode::Store)
                .with_inputs([adr])
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
            max_unroll: Some(1),
        };
        let lp = g.push_loop(info);
        for n in [iv, adr, mem_head, load, store] {
            g.data_mut(n).loop_id = Some(lp);
        }

        let slices = VLoopMemorySlices::build(&g, lp).unwrap();
        assert_eq!(slices.slices().len(), 1);
        let slice = &slices.slices()[0];
        assert_eq!(slice.head, mem_head);
        assert_eq!(slice.stores, vec![store]);
        assert_eq!(slice.loads, vec![load]);
    }

    #[test]
    fn phi_with_no_backedge_traffic_has_no_slice() {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);
        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));
        let mem_head = g.push(NodeData::new(Opcode::MemPhi).with_ctrl(header).with_alias_index(2));
        g.data_mut(mem_head).inputs = smallvec::smallvec![zero, zero];

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
        for n in [iv, mem_head] {
            g.data_mut(n).loop_id = Some(lp);
        }
        let slices = VLoopMemorySlices::build(&g, lp).unwrap();
        assert!(slices.slices().is_empty());
    }
}
