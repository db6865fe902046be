//! Element-type inference (`spec.md §4.7`).
//!
//! Assigns every body node an initial scalar element type from its IR
//! container type, then narrows arithmetic nodes backward so later
//! vectorization can pick the smallest safe lane width. Four opcodes that
//! would change meaning if narrowed past their operand's real width
//! (`RShiftI`/`URShiftI`/`AbsI`/`ReverseBytes`) are driven forward from
//! their operand instead of backward from their users.

use crate::ir::{ElementKind, Graph, LoopId, Node, NodeMap, Opcode};
use crate::timing;
use crate::HashMap;
use std::vec::Vec;

/// One inferred `ElementKind` per body node (`spec.md §3`, "Element-type
/// map").
pub struct VLoopTypes {
    kinds: NodeMap<ElementKind>,
}

impl VLoopTypes {
    /// `n`'s inferred element type.
    pub fn kind(&self, n: Node) -> ElementKind {
        self.kinds[n]
    }

    /// `VLoopTypes::infer` (`spec.md §4.7`).
    pub fn infer(graph: &Graph, lp: LoopId, body: &[Node]) -> Self {
        let _tt = timing::types();
        let mut kinds: NodeMap<ElementKind> = NodeMap::with_default(ElementKind::full_int());

        for &n in body {
            let data = graph.data(n);
            if let Some(mem_ty) = data.mem_type {
                kinds[n] = mem_ty.initial_element_kind();
            } else {
                kinds[n] = ElementKind::full_int();
            }
        }

        let use_map = build_use_map(graph, body);

        for _ in 0..(body.len() + 2) {
            let mut changed = false;

            // Opcodes that must be driven forward from their operand
            // rather than narrowed by their users (`spec.md §4.7`,
            // "Exceptions that preserve higher-order bits").
            for &n in body {
                let opcode = graph.data(n).opcode;
                if !opcode.preserves_high_bits() {
                    continue;
                }
                let input = match graph.data(n).inputs.first() {
                    Some(&i) => i,
                    None => continue,
                };
                let new_kind = if graph.is_member(input, lp) && graph.data(input).opcode.is_load() {
                    kinds[input]
                } else {
                    ElementKind::full_int()
                };
                if kinds[n] != new_kind {
                    kinds[n] = new_kind;
                    changed = true;
                }
            }

            // Backward narrowing for everything else. Left shift
            // (`spec.md §4.7`, "Left shift is unaffected") needs no
            // special case: it narrows its own type from its users like
            // any other node, and narrows its operand below exactly the
            // same way.
            for &n in body {
                let data = graph.data(n);
                let n_kind = kinds[n];
                for &input in data.inputs.iter() {
                    if !graph.is_member(input, lp) {
                        continue;
                    }
                    let input_data = graph.data(input);
                    if input_data.opcode.is_memory() {
                        continue;
                    }
                    if input_data.opcode.preserves_high_bits() {
                        // These are driven forward, not narrowed further.
                        continue;
                    }
                    let input_kind = kinds[input];
                    if !input_kind.is_larger_than(n_kind) {
                        continue;
                    }
                    let all_users_narrowed = use_map
                        .get(&input)
                        .map(|users| users.iter().all(|&u| kinds[u] == n_kind))
                        .unwrap_or(false);
                    if all_users_narrowed {
                        kinds[input] = n_kind;
                        changed = true;
                    }
                }
            }

            // Bool/Cmp propagation (`spec.md §4.7`).
            for &n in body {
                let data = graph.data(n);
                if data.opcode != Opcode::Bool || data.ctrl.is_some() {
                    continue;
                }
                let cmp = match data.inputs.first() {
                    Some(&c) => c,
                    None => continue,
                };
                if !graph.is_member(cmp, lp) {
                    continue;
                }
                let cmp_data = graph.data(cmp);
                if cmp_data.inputs.is_empty() {
                    continue;
                }
                let operand = cmp_data
                    .inputs
                    .iter()
                    .copied()
                    .find(|&o| graph.is_member(o, lp))
                    .unwrap_or(cmp_data.inputs[0]);
                let target = kinds[operand];
                if kinds[n] != target {
                    kinds[n] = target;
                    changed = true;
                }
                if kinds[cmp] != target {
                    kinds[cmp] = target;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        VLoopTypes { kinds }
    }
}

fn build_use_map(graph: &Graph, body: &[Node]) -> HashMap<Node, Vec<Node>> {
    let mut use_map: HashMap<Node, Vec<Node>> = HashMap::new();
    for &n in body {
        for &input in graph.data(n).inputs.iter() {
            use_map.entry(input).or_default().push(n);
        }
    }
    use_map
}
