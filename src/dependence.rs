//! Memory/data dependence graph (`spec.md §4.8`).
//!
//! One `DepNode` per in-body memory node, plus a synthetic root and one
//! synthetic sink per slice. Edges are added between same-slice ops whose
//! `VPointer`s are not provably non-aliasing (excluding load-after-load
//! pairs); every node's depth is the longest path from the root, computed
//! by fixpoint relaxation, and backs the `independent`/`mutually
//! independent` queries used by the code generator to decide which
//! accesses can be reordered into lanes.

use crate::dominator_tree::DominatorTree;
use crate::ir::{Graph, LoopId, Node, Opcode};
use crate::isa::VectorIsa;
use crate::memory_slices::{Slice, VLoopMemorySlices};
use crate::timing;
use crate::vpointer::{VPointer, VPointerCmp};
use cranelift_bforest::{Set, SetForest};
use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use crate::{HashMap, HashSet};
use std::collections::VecDeque;
use std::vec::Vec;

/// An index into the dependence graph's own node arena, distinct from
/// `ir::Node` so that synthetic root/sink nodes don't need to be real IR
/// nodes (`spec.md §9`, "Arena + indices vs. pointer graphs").
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepNode(u32);
entity_impl!(DepNode, "dep");

#[derive(Clone, Debug)]
struct DepNodeData {
    /// `None` for the synthetic root and per-slice sinks.
    mem: Option<Node>,
    depth: u32,
    is_load: bool,
}

/// The dependence DAG for one loop (`spec.md §3`, "Dependence graph").
pub struct VLoopDependenceGraph {
    nodes: PrimaryMap<DepNode, DepNodeData>,
    node_of: HashMap<Node, DepNode>,
    succ: SecondaryMap<DepNode, Set<DepNode>>,
    pred: SecondaryMap<DepNode, Set<DepNode>>,
    forest: SetForest<DepNode>,
    root: DepNode,
}

impl VLoopDependenceGraph {
    /// The synthetic global root.
    pub fn root(&self) -> DepNode {
        self.root
    }

    /// The dependence-graph node for an in-body memory `ir::Node`, if any.
    pub fn dep_node(&self, n: Node) -> Option<DepNode> {
        self.node_of.get(&n).copied()
    }

    /// `n`'s depth: the longest path from the root.
    pub fn depth(&self, n: DepNode) -> u32 {
        self.nodes[n].depth
    }

    /// Build the dependence graph for `lp`, given its already-computed
    /// memory slices (`spec.md §4.8`).
    pub fn build(
        graph: &mut Graph,
        domtree: &DominatorTree,
        isa: &dyn VectorIsa,
        lp: LoopId,
        iv: Node,
        slices: &VLoopMemorySlices,
    ) -> Self {
        let _tt = timing::dependence_graph();

        let mut nodes = PrimaryMap::new();
        let mut node_of = HashMap::new();
        let root = nodes.push(DepNodeData {
            mem: None,
            depth: 0,
            is_load: false,
        });

        let mut succ: SecondaryMap<DepNode, Set<DepNode>> = SecondaryMap::new();
        let mut pred: SecondaryMap<DepNode, Set<DepNode>> = SecondaryMap::new();
        let mut forest = SetForest::new();

        for slice in slices.slices() {
            build_slice(
                graph,
                domtree,
                isa,
                lp,
                iv,
                slice,
                root,
                &mut nodes,
                &mut node_of,
                &mut succ,
                &mut pred,
                &mut forest,
            );
        }

        let mut dg = VLoopDependenceGraph {
            nodes,
            node_of,
            succ,
            pred,
            forest,
            root,
        };
        dg.compute_depths();
        dg
    }

    fn compute_depths(&mut self) {
        self.nodes[self.root].depth = 0;
        let all: Vec<DepNode> = self.nodes.keys().collect();
        for _ in 0..(all.len() + 2) {
            let mut changed = false;
            for &n in &all {
                if n == self.root {
                    continue;
                }
                let preds: Vec<DepNode> = self.pred[n].iter(&self.forest).collect();
                let new_depth = preds.iter().map(|&p| self.nodes[p].depth).max().map_or(0, |m| m + 1);
                if self.nodes[n].depth != new_depth {
                    self.nodes[n].depth = new_depth;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// `independent(s1, s2)` (`spec.md §4.8`).
    pub fn independent(&self, s1: DepNode, s2: DepNode) -> bool {
        if s1 == s2 {
            return false;
        }
        let d1 = self.depth(s1);
        let d2 = self.depth(s2);
        if d1 == d2 {
            return true;
        }
        let (shallow, deep) = if d1 < d2 { (s1, s2) } else { (s2, s1) };
        let floor = self.depth(shallow);
        !self.reaches_backward(deep, shallow, floor)
    }

    /// Mutual independence of a set (`spec.md §4.8`): a single backward
    /// BFS from every member, pruned below the set's minimum depth, must
    /// never encounter another member.
    pub fn mutually_independent(&self, set: &[DepNode]) -> bool {
        if set.len() < 2 {
            return true;
        }
        let members: HashSet<DepNode> = set.iter().copied().collect();
        let floor = set.iter().map(|&n| self.depth(n)).min().unwrap_or(0);

        let mut visited: HashSet<DepNode> = HashSet::new();
        let mut queue: VecDeque<DepNode> = VecDeque::new();
        for &n in set {
            visited.insert(n);
            queue.push_back(n);
        }
        while let Some(n) = queue.pop_front() {
            for p in self.pred[n].iter(&self.forest) {
                if self.depth(p) < floor {
                    continue;
                }
                if members.contains(&p) {
                    return false;
                }
                if visited.insert(p) {
                    queue.push_back(p);
                }
            }
        }
        true
    }

    fn reaches_backward(&self, from: DepNode, target: DepNode, floor: u32) -> bool {
        let mut visited: HashSet<DepNode> = HashSet::new();
        let mut queue: VecDeque<DepNode> = VecDeque::new();
        queue.push_back(from);
        visited.insert(from);
        while let Some(n) = queue.pop_front() {
            if n == target {
                return true;
            }
            for p in self.pred[n].iter(&self.forest) {
                if self.depth(p) < floor {
                    continue;
                }
                if visited.insert(p) {
                    queue.push_back(p);
                }
            }
        }
        false
    }
}

#[allow(clippy::too_many_arguments)]
fn build_slice(
    graph: &mut Graph,
    domtree: &DominatorTree,
    isa: &dyn VectorIsa,
    lp: LoopId,
    iv: Node,
    slice: &Slice,
    root: DepNode,
    nodes: &mut PrimaryMap<DepNode, DepNodeData>,
    node_of: &mut HashMap<Node, DepNode>,
    succ: &mut SecondaryMap<DepNode, Set<DepNode>>,
    pred: &mut SecondaryMap<DepNode, Set<DepNode>>,
    forest: &mut SetForest<DepNode>,
) {
    // Members in predecessor-first (program) order: the head, then the
    // stores head-to-tail, with each store's attached loads inserted
    // right after it so load-vs-earlier-store pairs are compared.
    let mut ordered: Vec<Node> = Vec::with_capacity(slice.members().len());
    ordered.push(slice.head);
    for &store in &slice.stores {
        ordered.push(store);
        for &load in &slice.loads {
            if graph.data(load).mem_in == Some(store) {
                ordered.push(load);
            }
        }
    }
    for &load in &slice.loads {
        if graph.data(load).mem_in == Some(slice.head) {
            ordered.insert(1, load);
        }
    }

    let dep_of = |node_of: &mut HashMap<Node, DepNode>,
                  nodes: &mut PrimaryMap<DepNode, DepNodeData>,
                  mem: Node,
                  is_load: bool| {
        *node_of.entry(mem).or_insert_with(|| {
            nodes.push(DepNodeData {
                mem: Some(mem),
                depth: 0,
                is_load,
            })
        })
    };

    let head_dep = dep_of(node_of, nodes, slice.head, false);
    add_edge(root, head_dep, succ, pred, forest);

    let sink = nodes.push(DepNodeData {
        mem: None,
        depth: 0,
        is_load: false,
    });

    let mut vptrs: Vec<Option<VPointer>> = Vec::with_capacity(ordered.len());
    for &n in &ordered {
        if n == slice.head {
            vptrs.push(None);
        } else {
            vptrs.push(Some(VPointer::new(graph, domtree, n, lp, iv, isa, None)));
        }
    }

    let mut has_incoming: HashSet<Node> = HashSet::new();
    let mut has_outgoing: HashSet<Node> = HashSet::new();

    for i in 0..ordered.len() {
        for j in (i + 1)..ordered.len() {
            let (n1, n2) = (ordered[i], ordered[j]);
            let load1 = graph.data(n1).opcode == Opcode::Load;
            let load2 = graph.data(n2).opcode == Opcode::Load;
            if load1 && load2 {
                continue;
            }
            if n1 == slice.head {
                // The head's ordering relationship with everything else
                // is already captured via the synthetic root wiring;
                // pairwise VPointer comparison doesn't apply to a phi.
                continue;
            }
            let (p1, p2) = match (&vptrs[i], &vptrs[j]) {
                (Some(p1), Some(p2)) => (p1, p2),
                _ => continue,
            };
            let element_size = graph
                .data(n1)
                .mem_type
                .map(|t| t.size_in_bytes() as i64)
                .unwrap_or(1);
            let cmp = VPointer::cmp(p1, p2, element_size);
            if cmp != VPointerCmp::NotEqual {
                let d1 = dep_of(node_of, nodes, n1, load1);
                let d2 = dep_of(node_of, nodes, n2, load2);
                add_edge(d1, d2, succ, pred, forest);
                has_outgoing.insert(n1);
                has_incoming.insert(n2);
            }
        }
    }

    for &n in &ordered {
        if n == slice.head {
            continue;
        }
        let is_load = graph.data(n).opcode == Opcode::Load;
        let d = dep_of(node_of, nodes, n, is_load);
        if !has_incoming.contains(&n) {
            add_edge(head_dep, d, succ, pred, forest);
        }
        if !has_outgoing.contains(&n) {
            add_edge(d, sink, succ, pred, forest);
        }
    }
}

fn add_edge(
    from: DepNode,
    to: DepNode,
    succ: &mut SecondaryMap<DepNode, Set<DepNode>>,
    pred: &mut SecondaryMap<DepNode, Set<DepNode>>,
    forest: &mut SetForest<DepNode>,
) {
    succ[from].insert(to, forest, &());
    pred[to].insert(from, forest, &());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CountedLoopInfo, MemType, NodeData};
    use crate::isa::HostIsa;

    /// `for (i=0;i<N;++i) a[i+7] = a[i];` (`spec.md §8` scenario S2): the
    /// dependence graph must create an edge from the load `a[i]` to the
    /// store `a[i+7]`.
    #[test]
    fn scenario_s2_load_to_store_edge_exists() {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);
        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));
        let base = g.push(NodeData::new(Opcode::ConstL).with_imm(0x1000));

        let load_adr = g.push(NodeData::new(Opcode::AddP).with_inputs([base, iv, zero]));
        let mem_head = g.push(NodeData::new(Opcode::MemPhi).with_ctrl(header).with_alias_index(1));
        let load = g.push(
            NodeData::new(Opcode::Load)
                .with_inputs([load_adr])
                .with_ctrl(header)
                .with_mem_type(MemType::I32)
                .with_alias_index(1)
                .with_mem_in(mem_head),
        );

        let seven = g.push(NodeData::new(Opcode::ConstI).with_imm(7));
        let store_adr = g.push(NodeData::new(Opcode::AddP).with_inputs([base, iv, seven]));
        let store = g.push(
            NodeData::new(Opcode::Store)
                .with_inputs([store_adr])
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
        for n in [iv, load_adr, mem_head, load, store_adr, store] {
            g.data_mut(n).loop_id = Some(lp);
        }

        let domtree = DominatorTree::compute(&g, start);
        let isa = HostIsa::default();
        let slices = VLoopMemorySlices::build(&g, lp).unwrap();
        let dg = VLoopDependenceGraph::build(&mut g, &domtree, &isa, lp, iv, &slices);

        let load_dep = dg.dep_node(load).unwrap();
        let store_dep = dg.dep_node(store).unwrap();
        assert!(dg.depth(store_dep) > dg.depth(load_dep));
        assert!(!dg.independent(load_dep, store_dep));
    }
}
