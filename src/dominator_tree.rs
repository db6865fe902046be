//! Dominance over the control nodes of the analyzed graph.
//!
//! `spec.md §6` lists `ctrl_of(node)` / `dominates(a, b)` as a capability
//! the host compiler supplies. This crate owns its graph (see `ir.rs`), so
//! it must compute that capability itself rather than receive it; this
//! module is named and shaped after `cranelift_codegen::dominator_tree`
//! (`pub mod dominator_tree` in `cranelift-codegen/src/lib.rs`, not shipped
//! in this retrieval pack), and implements the same textbook fixpoint:
//! Cooper, Harvey & Kennedy, "A Simple, Fast Dominance Algorithm".
//!
//! This is pure plumbing with no vectorization semantics of its own; it is
//! exercised only through `VPointer`'s invariant-dominance check
//! (`spec.md §4.1`, `DESIGN.md` Open Question 1).

use crate::ir::{Graph, Node, NodeMap};
use std::vec::Vec;

/// A computed dominator tree over the control nodes reachable from a
/// function/loop entry node.
pub struct DominatorTree {
    rpo: Vec<Node>,
    rpo_number: NodeMap<Option<u32>>,
    idom: NodeMap<Option<Node>>,
    valid: bool,
}

impl DominatorTree {
    /// An empty, invalid dominator tree.
    pub fn new() -> Self {
        DominatorTree {
            rpo: Vec::new(),
            rpo_number: NodeMap::new(),
            idom: NodeMap::new(),
            valid: false,
        }
    }

    /// Compute the dominator tree of the control subgraph reachable from
    /// `entry`, using each node's `ctrl_preds` (`ir::NodeData::ctrl_preds`).
    pub fn compute(graph: &Graph, entry: Node) -> Self {
        let mut tree = Self::new();
        tree.recompute(graph, entry);
        tree
    }

    fn recompute(&mut self, graph: &Graph, entry: Node) {
        self.rpo.clear();
        self.rpo_number = NodeMap::new();
        self.idom = NodeMap::new();

        // Depth-first post-order over control predecessors, reversed to
        // get a reverse postorder with `entry` first.
        let mut postorder = Vec::new();
        let mut visited = NodeMap::<bool>::new();
        let mut stack: Vec<(Node, usize)> = alloc_stack(entry);
        visited[entry] = true;

        while let Some(&mut (node, ref mut next_succ)) = stack.last_mut() {
            let succs = control_successors(graph, node);
            if *next_succ < succs.len() {
                let succ = succs[*next_succ];
                *next_succ += 1;
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(node);
                stack.pop();
            }
        }

        self.rpo = postorder;
        self.rpo.reverse();
        for (i, &node) in self.rpo.iter().enumerate() {
            self.rpo_number[node] = Some(i as u32);
        }

        self.idom[entry] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &node in self.rpo.iter().skip(1) {
                let mut new_idom: Option<Node> = None;
                for &pred in graph.data(node).ctrl_preds.iter() {
                    if self.rpo_number[pred].is_none() {
                        continue; // unreachable predecessor
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => self.intersect(cur, pred),
                    });
                }
                if new_idom != self.idom[node] {
                    self.idom[node] = new_idom;
                    changed = true;
                }
            }
        }

        self.valid = true;
    }

    fn intersect(&self, mut a: Node, mut b: Node) -> Node {
        while a != b {
            while self.rpo_number[a] > self.rpo_number[b] {
                a = self.idom[a].expect("idom computed for reachable node");
            }
            while self.rpo_number[b] > self.rpo_number[a] {
                b = self.idom[b].expect("idom computed for reachable node");
            }
        }
        a
    }

    /// Whether `compute`/`recompute` has run.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether `a` dominates `b` (a node is considered to dominate itself).
    pub fn dominates(&self, a: Node, b: Node) -> bool {
        debug_assert!(self.valid);
        if self.rpo_number[a].is_none() || self.rpo_number[b].is_none() {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom[cur] {
                Some(next) if next != cur => cur = next,
                _ => return cur == a,
            }
        }
    }
}

impl Default for DominatorTree {
    fn default() -> Self {
        Self::new()
    }
}

fn alloc_stack(entry: Node) -> Vec<(Node, usize)> {
    let mut v = Vec::with_capacity(8);
    v.push((entry, 0));
    v
}

/// Control successors of `node`: every other control node whose
/// `ctrl_preds` names `node`. Computed on the fly rather than cached,
/// since loops under analysis are small.
fn control_successors(graph: &Graph, node: Node) -> Vec<Node> {
    let mut out = Vec::new();
    for n in graph.iter() {
        if graph.data(n).ctrl_preds.contains(&node) {
            out.push(n);
        }
    }
    out
}
