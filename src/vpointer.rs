//! Address pattern matcher (`spec.md §4.1`).
//!
//! Decomposes a memory node's address expression into the canonical linear
//! form `base + offset + invar + scale·iv`. Matching is a partial function:
//! failure is reported by `VPointer::valid()` returning `false`, never by
//! panic (`spec.md §4.1`, "Errors are reported only by the invalid
//! marker").

use crate::dominator_tree::DominatorTree;
use crate::ir::{ElementKind, Graph, LoopId, Node, NodeData, Opcode};
use crate::isa::VectorIsa;
use std::vec::Vec;

/// Ordering result of comparing two `VPointer`s (`spec.md §4.1`,
/// "Comparison primitive").
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VPointerCmp {
    /// Proven to denote the same address.
    Equal,
    /// Proven to denote a strictly lower address.
    Less,
    /// Proven to denote a strictly higher address.
    Greater,
    /// Proven to denote different addresses.
    NotEqual,
    /// Not provably anything; must be treated as potentially aliasing.
    Unknown,
}

/// A canonical linear decomposition of one memory node's address.
///
/// Invariant (once `valid()` is true): the address of `mem` is semantically
/// equal to `base + offset + invar + scale * iv`, where `iv` is the loop's
/// induction variable (`spec.md §3`).
#[derive(Clone, Debug)]
pub struct VPointer {
    mem: Node,
    base: Node,
    adr: Node,
    /// `0` means "no induction-variable term" (loop-invariant access).
    scale: i64,
    offset: i64,
    invar: Option<Node>,
    /// The inferred kind (32- or 64-bit) of `invar`, when present.
    invar_kind: ElementKind,
    valid: bool,
}

impl VPointer {
    /// The memory node this decomposition describes.
    pub fn mem(&self) -> Node {
        self.mem
    }

    /// The loop-invariant object/array base address.
    pub fn base(&self) -> Node {
        self.base
    }

    /// The address "shape" node after peeling `AddP` layers.
    pub fn adr(&self) -> Node {
        self.adr
    }

    /// The scale on the induction variable; `0` if the access is
    /// loop-invariant.
    pub fn scale(&self) -> i64 {
        self.scale
    }

    /// The aggregate constant offset.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// The aggregated loop-invariant symbolic term, if any.
    pub fn invar(&self) -> Option<Node> {
        self.invar
    }

    /// Whether construction succeeded.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The biggest detectable factor of the invariant (`spec.md §4.1`):
    /// `2^k` if `invar` is `x << k`, else `1` if an invariant is present,
    /// else `0`.
    pub fn invariant_factor(&self, graph: &Graph) -> i64 {
        match self.invar {
            None => 0,
            Some(n) => {
                let data = graph.data(n);
                if data.opcode == Opcode::LShiftL {
                    if let Some(&shift_amount) = data.inputs.get(1) {
                        let shift_data = graph.data(shift_amount);
                        if shift_data.opcode == Opcode::ConstI {
                            return 1i64 << shift_data.imm;
                        }
                    }
                    1
                } else {
                    1
                }
            }
        }
    }

    fn invalid(mem: Node) -> Self {
        VPointer {
            mem,
            base: mem,
            adr: mem,
            scale: 0,
            offset: 0,
            invar: None,
            invar_kind: ElementKind::I32,
            valid: false,
        }
    }

    /// Attempt to decompose `mem`'s address. `lp` is the loop being
    /// analyzed; `iv` its induction variable phi; `isa` supplies the
    /// platform capabilities consulted for the "top"/unsafe-base case
    /// below. `analyze_only`, when `Some(stack)`, disables IR node
    /// creation and instead records every node the matcher traverses onto
    /// `stack` (`spec.md §4.1`, "Side effects").
    pub fn new(
        graph: &mut Graph,
        domtree: &DominatorTree,
        mem: Node,
        lp: LoopId,
        iv: Node,
        isa: &dyn VectorIsa,
        mut analyze_only: Option<&mut Vec<Node>>,
    ) -> Self {
        let mem_data = graph.data(mem).clone();
        if mem_data.inputs.is_empty() {
            return Self::invalid(mem);
        }
        let address_input = mem_data.inputs[0];

        let mut m = Matcher {
            graph,
            domtree,
            lp,
            iv,
            scale: 0,
            offset: 0,
            invar: None,
            invar_kind: ElementKind::I32,
            stack: analyze_only.as_deref_mut(),
        };

        // Peel `AddP(base, address, offset)` layers. `offset` is matched as
        // a scaled-iv-plus-constant term at each layer (this is where a
        // single-dimension index lives); `address` is what gets iterated
        // on next, terminating either when it is no longer an `AddP` or
        // when it equals `base` (`spec.md §4.1`, "Termination").
        let mut cur = address_input;
        let mut base = None;
        loop {
            let cur_data = m.trace(cur);
            if cur_data.opcode != Opcode::AddP {
                if base.is_none() {
                    base = Some(cur);
                }
                break;
            }
            if cur_data.inputs.len() != 3 {
                return Self::invalid(mem);
            }
            let this_base = cur_data.inputs[0];
            let address = cur_data.inputs[1];
            let offset = cur_data.inputs[2];

            match base {
                None => base = Some(this_base),
                Some(b) if b == this_base => {}
                Some(_) => return Self::invalid(mem),
            }

            if !m.scaled_iv_plus_offset(offset) {
                return Self::invalid(mem);
            }

            if address == this_base {
                cur = address;
                break;
            }
            cur = address;
        }

        let base = match base {
            Some(b) => b,
            None => return Self::invalid(mem),
        };

        // `base` must be loop-invariant...
        if m.graph.is_member(base, lp) {
            return Self::invalid(mem);
        }
        // ...and if the host flags it "top" (unknown/unsafe reference),
        // matching succeeds only when the platform tolerates misaligned
        // vector accesses (`spec.md §4.1`).
        if m.graph.is_top(base) && !isa.misaligned_vectors_ok() {
            return Self::invalid(mem);
        }

        VPointer {
            mem,
            base,
            adr: cur,
            scale: m.scale,
            offset: m.offset,
            invar: m.invar,
            invar_kind: m.invar_kind,
            valid: true,
        }
    }

    /// `cmp(p1, p2)` (`spec.md §4.1`, "Comparison primitive").
    pub fn cmp(p1: &VPointer, p2: &VPointer, element_size: i64) -> VPointerCmp {
        if !p1.valid || !p2.valid {
            return VPointerCmp::Unknown;
        }
        if p1.base != p2.base || p1.adr != p2.adr || p1.invar != p2.invar || p1.scale != p2.scale {
            return VPointerCmp::Unknown;
        }
        let delta = p1.offset - p2.offset;
        if delta == 0 {
            VPointerCmp::Equal
        } else if delta.abs() >= element_size.max(1) {
            // Offsets differ by at least one element: the two accesses
            // provably touch disjoint bytes (`spec.md §8` Testable
            // Property 2).
            VPointerCmp::NotEqual
        } else {
            // Same base/adr/invar/scale, but offsets are closer together
            // than one element: the accesses provably overlap. Must not
            // report `NotEqual` here.
            VPointerCmp::Unknown
        }
    }
}

/// Mutable matcher state threaded through the recursive-descent helpers
/// `scaled_iv`/`offset_plus_k`/`scaled_iv_plus_offset` (`spec.md §4.1`).
struct Matcher<'a> {
    graph: &'a mut Graph,
    domtree: &'a DominatorTree,
    lp: LoopId,
    iv: Node,
    scale: i64,
    offset: i64,
    invar: Option<Node>,
    invar_kind: ElementKind,
    stack: Option<&'a mut Vec<Node>>,
}

impl<'a> Matcher<'a> {
    fn trace(&mut self, n: Node) -> NodeData {
        if let Some(stack) = self.stack.as_deref_mut() {
            stack.push(n);
        }
        self.graph.data(n).clone()
    }

    fn const_value(&mut self, n: Node) -> Option<i64> {
        let data = self.trace(n);
        match data.opcode {
            Opcode::ConstI => Some(data.imm),
            Opcode::ConstL => {
                if data.imm >= i32::MIN as i64 && data.imm <= i32::MAX as i64 {
                    Some(data.imm)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// `scaled_iv(n)` (`spec.md §4.1`).
    fn scaled_iv(&mut self, n: Node) -> bool {
        if n == self.iv {
            self.scale = 1;
            return true;
        }
        let data = self.trace(n);
        match data.opcode {
            Opcode::MulI if data.inputs.len() == 2 => {
                let (a, b) = (data.inputs[0], data.inputs[1]);
                if a == self.iv {
                    if let Some(k) = self.const_value(b) {
                        self.scale = k;
                        return true;
                    }
                } else if b == self.iv {
                    if let Some(k) = self.const_value(a) {
                        self.scale = k;
                        return true;
                    }
                }
                false
            }
            Opcode::LShiftL if data.inputs.len() == 2 => {
                let (x, k) = (data.inputs[0], data.inputs[1]);
                if x == self.iv {
                    if let Some(shift) = self.const_value(k) {
                        self.scale = 1i64 << shift;
                        return true;
                    }
                    return false;
                }
                // `(scaled_iv_plus_offset(x)) << const`: only when no scale
                // has been recorded yet. See DESIGN.md Open Question 2 —
                // treated as deliberate, matching the spec text "only fires
                // when no IV has been matched yet".
                if self.scale != 0 {
                    return false;
                }
                let shift = match self.const_value(k) {
                    Some(s) => s,
                    None => return false,
                };
                let mut inner = Matcher {
                    graph: self.graph,
                    domtree: self.domtree,
                    lp: self.lp,
                    iv: self.iv,
                    scale: 0,
                    offset: 0,
                    invar: None,
                    invar_kind: ElementKind::I32,
                    stack: self.stack.as_deref_mut(),
                };
                if !inner.scaled_iv_plus_offset(x) {
                    return false;
                }
                let mult = 1i64 << shift;
                self.scale = inner.scale * mult;
                self.offset += inner.offset * mult;
                if let Some(inv) = inner.invar {
                    if self.stack.is_none() {
                        let shift_const = self.graph.value_number_or_insert(
                            NodeData::new(Opcode::ConstI).with_imm(shift),
                        );
                        let wrapped =
                            self.graph
                                .make_shift_left(inv, shift_const, inner.invar_kind);
                        self.invar = Some(wrapped);
                    } else {
                        self.invar = Some(inv);
                    }
                    self.invar_kind = inner.invar_kind;
                }
                true
            }
            Opcode::ConvI2L | Opcode::CastII if data.inputs.len() == 1 => {
                self.scaled_iv(data.inputs[0])
            }
            _ => false,
        }
    }

    /// `offset_plus_k(n, negate)` (`spec.md §4.1`).
    fn offset_plus_k(&mut self, n: Node, negate: bool) -> bool {
        if let Some(k) = self.const_value(n) {
            self.offset += if negate { -k } else { k };
            return true;
        }
        let data = self.trace(n);
        match data.opcode {
            Opcode::AddI if data.inputs.len() == 2 => {
                let (a, b) = (data.inputs[0], data.inputs[1]);
                if let Some(k) = self.const_value(a) {
                    if self.invariant_ok(b) {
                        self.offset += if negate { -k } else { k };
                        return self.add_invariant(b, negate);
                    }
                }
                if let Some(k) = self.const_value(b) {
                    if self.invariant_ok(a) {
                        self.offset += if negate { -k } else { k };
                        return self.add_invariant(a, negate);
                    }
                }
                false
            }
            Opcode::SubI if data.inputs.len() == 2 => {
                let (a, b) = (data.inputs[0], data.inputs[1]);
                if let Some(k) = self.const_value(a) {
                    if self.invariant_ok(b) {
                        self.offset += if negate { -k } else { k };
                        return self.add_invariant(b, !negate);
                    }
                }
                if let Some(k) = self.const_value(b) {
                    if self.invariant_ok(a) {
                        self.offset += if negate { k } else { -k };
                        return self.add_invariant(a, negate);
                    }
                }
                false
            }
            _ => {
                // A bare loop-invariant node, after optionally stripping one
                // `ConvI2L` and one `CastII`.
                let stripped = self.strip_one_conv_cast(n);
                if self.invariant_ok(stripped) {
                    return self.add_invariant(stripped, negate);
                }
                false
            }
        }
    }

    fn strip_one_conv_cast(&mut self, n: Node) -> Node {
        let data = self.trace(n);
        match data.opcode {
            Opcode::ConvI2L | Opcode::CastII if data.inputs.len() == 1 => {
                let inner = data.inputs[0];
                let inner_data = self.trace(inner);
                match inner_data.opcode {
                    Opcode::ConvI2L | Opcode::CastII if inner_data.inputs.len() == 1 => {
                        inner_data.inputs[0]
                    }
                    _ => inner,
                }
            }
            _ => n,
        }
    }

    /// Whether `n` is admissible as an invariant term: it must be
    /// loop-invariant, and — only when analyzing a main loop — it must
    /// dominate the pre-loop head (`spec.md §4.1`; `DESIGN.md` Open
    /// Question 1).
    fn invariant_ok(&self, n: Node) -> bool {
        if self.graph.is_member(n, self.lp) {
            return false;
        }
        let info = self.graph.loop_info(self.lp);
        if !info.is_main {
            return true;
        }
        match info.pre_loop {
            Some(pre) => {
                let pre_header = self.graph.loop_info(pre).header;
                self.domtree.dominates(n, pre_header)
            }
            None => true,
        }
    }

    fn add_invariant(&mut self, n: Node, negate: bool) -> bool {
        let kind = if self.graph.data(n).mem_type.map_or(false, |t| t.size_in_bytes() == 8) {
            ElementKind::I64
        } else {
            ElementKind::I32
        };
        // In analyze-only mode no IR nodes are created (`spec.md §4.1`,
        // "Side effects"): the negated term is left unmaterialized and
        // `combine_invariant` only records the node traversal.
        let term = if negate && self.stack.is_none() {
            let zero = self.graph.make_zero(kind);
            self.graph.make_sub(zero, n, kind)
        } else {
            n
        };
        self.combine_invariant(term, kind);
        true
    }

    fn combine_invariant(&mut self, term: Node, kind: ElementKind) {
        match self.invar {
            None => {
                self.invar = Some(term);
                self.invar_kind = kind;
            }
            Some(existing) => {
                let widen_to_64 = kind.is_64() || self.invar_kind.is_64();
                let target_kind = if widen_to_64 { ElementKind::I64 } else { ElementKind::I32 };
                if self.stack.is_some() {
                    // Analyze-only: record the combination without
                    // materializing any conversion/add nodes.
                    self.invar = Some(term);
                    self.invar_kind = target_kind;
                    return;
                }
                let existing = if widen_to_64 && !self.invar_kind.is_64() {
                    self.graph.make_conv_i_to_l(existing)
                } else {
                    existing
                };
                let term = if widen_to_64 && !kind.is_64() {
                    self.graph.make_conv_i_to_l(term)
                } else {
                    term
                };
                let sum = self.graph.make_add(existing, term, target_kind);
                self.invar = Some(sum);
                self.invar_kind = target_kind;
            }
        }
    }

    /// `scaled_iv_plus_offset(n)` (`spec.md §4.1`).
    fn scaled_iv_plus_offset(&mut self, n: Node) -> bool {
        if self.scaled_iv(n) {
            return true;
        }
        if self.offset_plus_k(n, false) {
            return true;
        }
        let data = self.trace(n);
        match data.opcode {
            Opcode::AddI if data.inputs.len() == 2 => {
                let (a, b) = (data.inputs[0], data.inputs[1]);
                if self.scaled_iv(a) {
                    return self.offset_plus_k(b, false);
                }
                self.scale = 0;
                if self.scaled_iv(b) {
                    return self.offset_plus_k(a, false);
                }
                false
            }
            Opcode::SubI if data.inputs.len() == 2 => {
                let (a, b) = (data.inputs[0], data.inputs[1]);
                if self.scaled_iv(a) {
                    return self.offset_plus_k(b, true);
                }
                self.scale = 0;
                if self.scaled_iv(b) {
                    self.scale = -self.scale;
                    return self.offset_plus_k(a, false);
                }
                false
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CountedLoopInfo, MemType};
    use crate::isa::HostIsa;

    /// Builds `a[i]` for `for (i=0;i<n;++i)`: `AddP(base, iv_scaled, header_off)`.
    fn build_simple_load() -> (Graph, DominatorTree, LoopId, Node, Node) {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);

        let base = g.push(NodeData::new(Opcode::ConstL).with_imm(0x1000));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));
        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let elem_size = g.push(NodeData::new(Opcode::ConstI).with_imm(4));
        let scaled = g.push(NodeData::new(Opcode::MulI).with_inputs([iv, elem_size]));
        let header_off = g.push(NodeData::new(Opcode::ConstI).with_imm(16));
        let adr = g.push(
            NodeData::new(Opcode::AddP).with_inputs([base, scaled, header_off]),
        );
        let load = g.push(
            NodeData::new(Opcode::Load)
                .with_inputs([adr])
                .with_ctrl(header)
                .with_mem_type(MemType::I32)
                .with_alias_index(1),
        );

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
            backedge_user: None,
            pre_loop: None,
            max_unroll: Some(1),
        };
        let lp = g.push_loop(info);
        g.data_mut(iv).loop_id = Some(lp);
        g.data_mut(scaled).loop_id = Some(lp);
        g.data_mut(load).loop_id = Some(lp);

        let domtree = DominatorTree::compute(&g, start);
        (g, domtree, lp, iv, load)
    }

    #[test]
    fn decomposes_simple_indexed_load() {
        let (mut g, domtree, lp, iv, load) = build_simple_load();
        let isa = HostIsa::default();
        let vp = VPointer::new(&mut g, &domtree, load, lp, iv, &isa, None);
        assert!(vp.valid());
        assert_eq!(vp.scale(), 4);
        assert_eq!(vp.offset(), 16);
        assert!(vp.invar().is_none());
    }

    /// `spec.md §8` Testable Property 2: `cmp` reports `NotEqual` only when
    /// offsets differ by at least one element size; closer offsets must
    /// never be reported `NotEqual`, since the accesses provably overlap.
    #[test]
    fn cmp_reports_not_equal_only_when_disjoint() {
        let (mut g, domtree, lp, iv, load) = build_simple_load();
        let isa = HostIsa::default();
        let vp1 = VPointer::new(&mut g, &domtree, load, lp, iv, &isa, None);
        let mut vp2 = vp1.clone();

        vp2.offset += 4;
        assert_eq!(VPointer::cmp(&vp1, &vp2, 4), VPointerCmp::NotEqual);

        vp2.offset -= 2; // now 2 bytes apart: overlapping within a 4-byte element.
        assert_ne!(VPointer::cmp(&vp1, &vp2, 4), VPointerCmp::NotEqual);

        vp2.offset -= 2; // back to 0: equal.
        assert_eq!(VPointer::cmp(&vp1, &vp2, 4), VPointerCmp::Equal);
    }

    /// Builds `a[i + x - y]` where `x`/`y` are loop-invariant, non-constant
    /// values at two separate `AddP` layers, so that matching exercises
    /// both `add_invariant`'s negation and `combine_invariant`'s merge of
    /// two already-recorded invariant terms.
    fn build_load_with_combined_invariant() -> (Graph, DominatorTree, LoopId, Node, Node) {
        let mut g = Graph::new();
        let start = g.push(NodeData::new(Opcode::Start));
        let mut header_data = NodeData::new(Opcode::CountedLoop);
        header_data.ctrl_preds.push(start);
        let header = g.push(header_data);

        let base = g.push(NodeData::new(Opcode::ConstL).with_imm(0x1000));
        let zero = g.push(NodeData::new(Opcode::ConstI).with_imm(0));
        let iv = g.push(NodeData::new(Opcode::Phi).with_ctrl(header));
        let invar_x = g.push(NodeData::new(Opcode::Phi).with_ctrl(start));
        let invar_y = g.push(NodeData::new(Opcode::Phi).with_ctrl(start));

        let inner_adr = g.push(NodeData::new(Opcode::AddP).with_inputs([base, iv, invar_x]));
        let neg_y = g.push(NodeData::new(Opcode::SubI).with_inputs([zero, invar_y]));
        let adr = g.push(
            NodeData::new(Opcode::AddP).with_inputs([base, inner_adr, neg_y]),
        );
        let load = g.push(
            NodeData::new(Opcode::Load)
                .with_inputs([adr])
                .with_ctrl(header)
                .with_mem_type(MemType::I32)
                .with_alias_index(1),
        );

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
            backedge_user: None,
            pre_loop: None,
            max_unroll: Some(1),
        };
        let lp = g.push_loop(info);
        for n in [iv, inner_adr, adr, load] {
            g.data_mut(n).loop_id = Some(lp);
        }

        let domtree = DominatorTree::compute(&g, start);
        (g, domtree, lp, iv, load)
    }

    #[test]
    fn combines_two_invariant_terms() {
        let (mut g, domtree, lp, iv, load) = build_load_with_combined_invariant();
        let isa = HostIsa::default();
        let vp = VPointer::new(&mut g, &domtree, load, lp, iv, &isa, None);
        assert!(vp.valid());
        assert!(vp.invar().is_some());
    }

    /// `spec.md §4.1`, "Side effects": analyze-only mode must create zero
    /// new IR nodes, even when matching needs to negate and combine
    /// invariant terms.
    #[test]
    fn analyze_only_creates_no_new_nodes() {
        let (mut g, domtree, lp, iv, load) = build_load_with_combined_invariant();
        let isa = HostIsa::default();
        let before = g.len();
        let mut stack = Vec::new();
        let vp = VPointer::new(&mut g, &domtree, load, lp, iv, &isa, Some(&mut stack));
        assert!(vp.valid());
        assert_eq!(g.len(), before);
        assert!(!stack.is_empty());
    }
}
