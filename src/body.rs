//! Reverse-postorder body construction (`spec.md §4.6`).
//!
//! Two passes: first reject any node kind `VLoopBody` must refuse
//! outright; then walk out-edges from the loop head in depth-first order,
//! emitting a reverse postorder. The loop head is always first — a
//! standard property of RPO from a single root whose DFS reaches every
//! other node in the walk.

use crate::ir::{Graph, LoopId, Node, NodeMap, Opcode};
use crate::result::AnalyzerFailure;
use crate::timing;
use crate::{HashMap, HashSet};
use std::vec::Vec;

/// The ordered body of a loop: `body[0..n)` in reverse postorder, plus a
/// `node -> position` map (`spec.md §3`, "Body order").
pub struct VLoopBody {
    order: Vec<Node>,
    position: NodeMap<Option<u32>>,
}

impl VLoopBody {
    /// The body nodes, in reverse postorder. Index 0 is the loop head.
    pub fn order(&self) -> &[Node] {
        &self.order
    }

    /// `n`'s position in `order()`, if `n` is a body member.
    pub fn position(&self, n: Node) -> Option<u32> {
        self.position.get(n).copied().flatten()
    }

    /// `VLoopBody::construct` (`spec.md §4.6`).
    pub fn construct(graph: &Graph, lp: LoopId) -> Result<Self, AnalyzerFailure> {
        let _tt = timing::body();
        let header = graph.loop_info(lp).header;

        // Pass 1: reject disallowed node kinds.
        let mut members: HashSet<Node> = graph.members_of(lp).into_iter().collect();
        for &n in &members {
            if graph.data(n).opcode.is_disallowed_in_body() {
                return Err(AnalyzerFailure::NodeNotAllowed);
            }
        }
        members.insert(header);

        // Pass 2: depth-first walk over out-edges ("uses") from the head,
        // emitting postorder, then reversed.
        let succ = build_successors(graph, header, &members);

        let mut order = Vec::with_capacity(members.len());
        let mut visited: HashSet<Node> = HashSet::new();
        postorder_from(header, &succ, &mut visited, &mut order);

        // Any body member unreached from the head (e.g. a constant whose
        // only use is itself disallowed or pruned) still needs a place in
        // the order; attach leftovers deterministically after the main
        // walk.
        let mut leftovers: Vec<Node> = members.iter().copied().filter(|n| !visited.contains(n)).collect();
        leftovers.sort();
        for n in leftovers {
            postorder_from(n, &succ, &mut visited, &mut order);
        }

        order.reverse();

        let mut position = NodeMap::new();
        for (i, &n) in order.iter().enumerate() {
            position[n] = Some(i as u32);
        }

        Ok(VLoopBody { order, position })
    }
}

/// Successor ("out-edge") adjacency restricted to `members`. An edge
/// `a -> b` exists when `b` reads `a` as a data/control input, except that
/// a phi's backedge input never produces an edge back into the phi (that
/// would reintroduce the cycle RPO is meant to break) — the one exception
/// being the loop head itself, which always reaches every phi it heads
/// (`spec.md §4.6`, "skip phi uses except from the loop head itself").
fn build_successors(graph: &Graph, header: Node, members: &HashSet<Node>) -> HashMap<Node, Vec<Node>> {
    let mut succ: HashMap<Node, Vec<Node>> = HashMap::new();
    for &n in members {
        if n == header {
            continue;
        }
        let data = graph.data(n);
        let is_phi = matches!(data.opcode, Opcode::Phi | Opcode::MemPhi);
        if is_phi && data.inputs.len() == 2 {
            let entry = data.inputs[0];
            if members.contains(&entry) {
                succ.entry(entry).or_default().push(n);
            }
            succ.entry(header).or_default().push(n);
            continue;
        }
        for &input in data.inputs.iter() {
            if members.contains(&input) {
                succ.entry(input).or_default().push(n);
            }
        }
        if let Some(ctrl) = data.ctrl {
            if members.contains(&ctrl) && ctrl != n {
                succ.entry(ctrl).or_default().push(n);
            }
        }
    }
    succ
}

fn postorder_from(
    root: Node,
    succ: &HashMap<Node, Vec<Node>>,
    visited: &mut HashSet<Node>,
    order: &mut Vec<Node>,
) {
    if !visited.insert(root) {
        return;
    }
    if let Some(next) = succ.get(&root) {
        for &m in next {
            postorder_from(m, succ, visited, order);
        }
    }
    order.push(root);
}
