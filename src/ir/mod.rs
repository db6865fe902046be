//! A minimal sea-of-nodes IR substrate.
//!
//! `spec.md` treats the host IR as an external capability: opcode
//! inspection, typed value access, a value-numbering table, a
//! control-dominance oracle, a loop-membership oracle, and node creation
//! hooks (see `§6 EXTERNAL INTERFACES`). IR construction, ownership, and
//! verification are explicitly out of scope for the analysis core.
//!
//! This module realizes just enough of that capability surface to make the
//! analyzer buildable and testable: a dense `Node` entity space, an
//! `Opcode` tag, and a `Graph` that owns node data the way
//! `cranelift_codegen::ir::Function`/`DataFlowGraph` own instructions. It is
//! not a general-purpose SSA builder — there is no legalization, no
//! encoding, no textual form.

pub mod entities;

pub use entities::{AnyEntity, LoopId, Node};

use crate::HashMap;
use cranelift_entity::{PrimaryMap, SecondaryMap};
use smallvec::SmallVec;
use std::vec::Vec;

/// The opcode of a node in the analyzed graph.
///
/// This is not the full Cranelift/HotSpot instruction set — only the
/// opcodes the auto-vectorization analysis pattern-matches against or
/// creates (see `spec.md §4.1`, `§4.4`, `§4.7`).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Opcode {
    /// The function/loop entry control node.
    Start,
    /// A control merge point (e.g. a loop header region).
    Region,
    /// The control node heading a counted loop; also the anchor for
    /// `is_member`/dominance queries about "the loop".
    CountedLoop,
    /// A data phi at a loop header. The induction variable phi is
    /// distinguished by convention (see `ir::Graph::iv_phi`).
    Phi,
    /// A memory phi at a loop header (the head of a memory slice).
    MemPhi,
    /// `base + address + offset`: the canonical address-compute node.
    AddP,
    /// A 32-bit integer constant (value held in `NodeData::imm`).
    ConstI,
    /// A 64-bit integer constant (value held in `NodeData::imm`).
    ConstL,
    /// Integer addition.
    AddI,
    /// Integer subtraction.
    SubI,
    /// Integer multiplication.
    MulI,
    /// Left shift (preserves low bits regardless of signedness).
    LShiftL,
    /// Arithmetic right shift (signed).
    RShiftI,
    /// Logical right shift (unsigned).
    URShiftI,
    /// Absolute value.
    AbsI,
    /// Byte-order reversal.
    ReverseBytes,
    /// Widening `i32 -> i64` conversion.
    ConvI2L,
    /// A (possibly narrowing-then-widening) cast that is a no-op on values
    /// that fit, used by the matcher as a transparent wrapper.
    CastII,
    /// Integer comparison, consumed by `Bool`.
    CmpI,
    /// Boolean produced by a `CmpI`/`CmpL`, consumed by a branch or select.
    Bool,
    /// A typed memory load.
    Load,
    /// A typed memory store.
    Store,
    /// An atomic read-modify-write memory op. Never allowed in a
    /// vectorizable loop body (`spec.md §4.6`, scenario S6).
    LoadStore,
    /// A memory-space merge node, never allowed in the loop body proper.
    MergeMem,
    /// A projection out of a multi-result node.
    Proj,
}

impl Opcode {
    /// True for the opcodes `VLoopBody::construct` must reject outright
    /// (`spec.md §4.6`).
    pub fn is_disallowed_in_body(self) -> bool {
        matches!(self, Opcode::LoadStore | Opcode::MergeMem | Opcode::Proj)
    }

    /// True for opcodes that read memory.
    pub fn is_load(self) -> bool {
        matches!(self, Opcode::Load)
    }

    /// True for opcodes that write memory.
    pub fn is_store(self) -> bool {
        matches!(self, Opcode::Store)
    }

    /// True for opcodes that touch memory at all (phis included).
    pub fn is_memory(self) -> bool {
        matches!(
            self,
            Opcode::Load | Opcode::Store | Opcode::MemPhi | Opcode::LoadStore
        )
    }

    /// Same-opcode arithmetic nodes eligible to participate in a reduction
    /// cycle (`spec.md §4.4`). This is deliberately conservative: only the
    /// integer arithmetic opcodes that have an obvious reduction-tree
    /// counterpart in the code generator are candidates.
    pub fn is_reduction_candidate(self) -> bool {
        matches!(self, Opcode::AddI | Opcode::MulI)
    }

    /// True for opcodes whose scalar result type never changes under
    /// backward narrowing (`spec.md §4.7`'s "preserve higher-order bits"
    /// exceptions).
    pub fn preserves_high_bits(self) -> bool {
        matches!(self, Opcode::RShiftI | Opcode::URShiftI | Opcode::AbsI | Opcode::ReverseBytes)
    }
}

/// The inferred scalar element type of a node, narrowed by `VLoopTypes`.
///
/// `Bool` stands in for both genuine boolean results and unsigned-byte
/// loads, which `spec.md §4.7` treats identically ("sign-insensitive
/// handling").
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ElementKind {
    /// 1-byte, sign-insensitive (boolean or unsigned byte).
    Bool,
    /// Signed 8-bit.
    I8,
    /// Signed 16-bit ("short").
    I16,
    /// Signed 32-bit ("full int").
    I32,
    /// Signed 64-bit ("long").
    I64,
}

impl ElementKind {
    /// Size in bytes of this element kind.
    pub fn size_in_bytes(self) -> u32 {
        match self {
            ElementKind::Bool | ElementKind::I8 => 1,
            ElementKind::I16 => 2,
            ElementKind::I32 => 4,
            ElementKind::I64 => 8,
        }
    }

    /// The baseline "full int" kind integer arithmetic starts at before
    /// narrowing.
    pub fn full_int() -> ElementKind {
        ElementKind::I32
    }

    /// True if `self` is a strictly larger container than `other`.
    pub fn is_larger_than(self, other: ElementKind) -> bool {
        self.size_in_bytes() > other.size_in_bytes()
    }

    /// `self`'s opcode when widened to 64-bit for invariant-combining
    /// arithmetic (`spec.md §4.1`, "widen to 64-bit when either side is
    /// 64-bit").
    pub fn is_64(self) -> bool {
        self == ElementKind::I64
    }
}

/// The declared type of a memory access, before `VLoopTypes`'s initial
/// adjustments (`spec.md §4.7`).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MemType {
    /// Signed 8-bit.
    I8,
    /// Unsigned 8-bit ("unsigned byte").
    U8,
    /// Signed 16-bit ("short").
    I16,
    /// Unsigned 16-bit ("char").
    U16,
    /// Signed 32-bit.
    I32,
    /// Signed 64-bit.
    I64,
}

impl MemType {
    /// The initial `ElementKind` `VLoopTypes` assigns to a node of this
    /// declared memory type, applying the two adjustments named in
    /// `spec.md §4.7`: stored `char` becomes signed short; unsigned-byte
    /// loads become boolean-typed.
    pub fn initial_element_kind(self) -> ElementKind {
        match self {
            MemType::I8 => ElementKind::I8,
            MemType::U8 => ElementKind::Bool,
            MemType::I16 | MemType::U16 => ElementKind::I16,
            MemType::I32 => ElementKind::I32,
            MemType::I64 => ElementKind::I64,
        }
    }

    /// Size in bytes of this memory access type.
    pub fn size_in_bytes(self) -> u32 {
        match self {
            MemType::I8 | MemType::U8 => 1,
            MemType::I16 | MemType::U16 => 2,
            MemType::I32 => 4,
            MemType::I64 => 8,
        }
    }
}

/// Data carried by one node in the graph.
#[derive(Clone, Debug)]
pub struct NodeData {
    /// The node's opcode.
    pub opcode: Opcode,
    /// Data/address inputs, in operand order.
    pub inputs: SmallVec<[Node; 4]>,
    /// The control node this node is pinned to, if any. Memory ops are
    /// always pinned; pure arithmetic is not.
    pub ctrl: Option<Node>,
    /// Control predecessors, populated only for control opcodes
    /// (`Start`/`Region`/`CountedLoop`); consumed by `dominator_tree`.
    pub ctrl_preds: SmallVec<[Node; 2]>,
    /// The immediate value, for `ConstI`/`ConstL`.
    pub imm: i64,
    /// The declared memory access type, for `Load`/`Store`/`MemPhi`.
    pub mem_type: Option<MemType>,
    /// The alias class of the address this memory node reads/writes,
    /// standing in for the host's `get_alias_index` capability.
    pub alias_index: Option<u32>,
    /// For `Load`/`Store`: the memory-chain predecessor this op is
    /// ordered after (the nearest preceding store in its slice, or the
    /// slice's head `MemPhi` if none precedes it). Kept separate from
    /// `inputs` so that `inputs[0]` is uniformly the address operand for
    /// every memory opcode (`spec.md §4.1`, `VPointer::new`). Unused for
    /// `MemPhi`, whose entry/backedge memory values are its `inputs`.
    pub mem_in: Option<Node>,
    /// The loop this node is a member of, if any.
    pub loop_id: Option<LoopId>,
    /// Whether the host flags this node "top": an unknown/unsafe
    /// reference whose provenance the analyzer can't reason about
    /// (`spec.md §4.1`, the "top"/unsafe-base case).
    pub is_top: bool,
}

impl NodeData {
    /// Construct a node with no inputs, no control pin, in no loop.
    pub fn new(opcode: Opcode) -> Self {
        NodeData {
            opcode,
            inputs: SmallVec::new(),
            ctrl: None,
            ctrl_preds: SmallVec::new(),
            imm: 0,
            mem_type: None,
            alias_index: None,
            mem_in: None,
            loop_id: None,
            is_top: false,
        }
    }

    /// Builder: set the inputs.
    pub fn with_inputs<I: IntoIterator<Item = Node>>(mut self, inputs: I) -> Self {
        self.inputs = inputs.into_iter().collect();
        self
    }

    /// Builder: set the control pin.
    pub fn with_ctrl(mut self, ctrl: Node) -> Self {
        self.ctrl = Some(ctrl);
        self
    }

    /// Builder: set the control predecessors (for control opcodes).
    pub fn with_ctrl_preds<I: IntoIterator<Item = Node>>(mut self, preds: I) -> Self {
        self.ctrl_preds = preds.into_iter().collect();
        self
    }

    /// Builder: set the immediate.
    pub fn with_imm(mut self, imm: i64) -> Self {
        self.imm = imm;
        self
    }

    /// Builder: set the memory type.
    pub fn with_mem_type(mut self, ty: MemType) -> Self {
        self.mem_type = Some(ty);
        self
    }

    /// Builder: set the alias index.
    pub fn with_alias_index(mut self, idx: u32) -> Self {
        self.alias_index = Some(idx);
        self
    }

    /// Builder: set the memory-chain predecessor.
    pub fn with_mem_in(mut self, prev: Node) -> Self {
        self.mem_in = Some(prev);
        self
    }

    /// Builder: set the owning loop.
    pub fn with_loop(mut self, lp: LoopId) -> Self {
        self.loop_id = Some(lp);
        self
    }

    /// Builder: flag this node "top" (unknown/unsafe reference).
    pub fn with_top(mut self) -> Self {
        self.is_top = true;
        self
    }
}

/// Description of a counted loop the analyzer operates on.
#[derive(Clone, Debug)]
pub struct CountedLoopInfo {
    /// The loop header control node.
    pub header: Node,
    /// The induction variable phi.
    pub iv_phi: Node,
    /// The `iv`'s initial value on loop entry.
    pub init: Node,
    /// The opaque pre-loop limit node, rewritable by the alignment pass.
    /// `None` unless this is a main loop.
    pub pre_loop_limit: Option<Node>,
    /// Constant per-iteration stride of `iv` (may be negative).
    pub stride: i64,
    /// Whether this is the post-alignment "main" loop of a pre/main split.
    pub is_main: bool,
    /// Whether the loop has already been vectorized.
    pub already_vectorized: bool,
    /// Whether the loop is marked unroll-only (never vectorize).
    pub unroll_only: bool,
    /// Whether the loop body contains in-body control flow.
    pub has_inner_control_flow: bool,
    /// The single control user of the backedge, if there is exactly one.
    pub backedge_user: Option<Node>,
    /// The pre-loop's counted-loop id, when this is a main loop.
    pub pre_loop: Option<LoopId>,
    /// The host's maximum-safe-unroll signal for this loop, if computed.
    /// `VLoopAnalyzer` fails early when this is absent (`spec.md §4.9`,
    /// `§7`: "loop has no max-unroll signal").
    pub max_unroll: Option<u32>,
}

/// Owns all nodes reachable from one function/loop under analysis.
///
/// Exposes the capabilities `spec.md §6` lists as externally supplied:
/// loop membership, dominance (via `crate::dominator_tree`), alias
/// classification, and canonicalizing node creation.
pub struct Graph {
    nodes: PrimaryMap<Node, NodeData>,
    loops: PrimaryMap<LoopId, CountedLoopInfo>,
    value_numbers: HashMap<VnKey, Node>,
}

/// Key used by `value_number_or_insert` to detect structurally identical
/// nodes already present in the graph.
#[derive(PartialEq, Eq, Hash)]
struct VnKey {
    opcode: Opcode,
    inputs: SmallVec<[Node; 4]>,
    imm: i64,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Graph {
            nodes: PrimaryMap::new(),
            loops: PrimaryMap::new(),
            value_numbers: HashMap::new(),
        }
    }

    /// Insert a node unconditionally, bypassing value numbering. Used by
    /// test fixtures and by the initial construction of a loop body.
    pub fn push(&mut self, data: NodeData) -> Node {
        let key = vn_key(&data);
        let node = self.nodes.push(data);
        self.value_numbers.insert(key, node);
        node
    }

    /// Register a new counted loop and return its id.
    pub fn push_loop(&mut self, info: CountedLoopInfo) -> LoopId {
        self.loops.push(info)
    }

    /// Data for `node`.
    pub fn data(&self, node: Node) -> &NodeData {
        &self.nodes[node]
    }

    /// Mutable data for `node`.
    pub fn data_mut(&mut self, node: Node) -> &mut NodeData {
        &mut self.nodes[node]
    }

    /// The loop's metadata.
    pub fn loop_info(&self, lp: LoopId) -> &CountedLoopInfo {
        &self.loops[lp]
    }

    /// `is_member(node, loop)` (`spec.md §6`).
    pub fn is_member(&self, node: Node, lp: LoopId) -> bool {
        self.nodes[node].loop_id == Some(lp)
    }

    /// Whether the host flags `node` "top" (`spec.md §4.1`, the
    /// "top"/unsafe-base case).
    pub fn is_top(&self, node: Node) -> bool {
        self.nodes[node].is_top
    }

    /// `ctrl_of(node)` (`spec.md §6`).
    pub fn ctrl_of(&self, node: Node) -> Option<Node> {
        self.nodes[node].ctrl
    }

    /// `get_alias_index(type)` (`spec.md §6`), addressed by the memory
    /// node rather than a bare type, since this substrate doesn't model
    /// address types independently of the node that carries them.
    pub fn get_alias_index(&self, mem_node: Node) -> Option<u32> {
        self.nodes[mem_node].alias_index
    }

    /// `value_number_or_insert(node) -> node` (`spec.md §6`): returns the
    /// existing structurally-equal node if one exists, else inserts and
    /// returns a fresh one.
    pub fn value_number_or_insert(&mut self, data: NodeData) -> Node {
        let key = vn_key(&data);
        if let Some(&existing) = self.value_numbers.get(&key) {
            return existing;
        }
        let node = self.nodes.push(data);
        self.value_numbers.insert(key, node);
        node
    }

    /// `make_zero(kind)` (`spec.md §6`).
    pub fn make_zero(&mut self, kind: ElementKind) -> Node {
        let opcode = if kind.is_64() { Opcode::ConstL } else { Opcode::ConstI };
        self.value_number_or_insert(NodeData::new(opcode).with_imm(0))
    }

    /// `make_add(a, b, kind)` (`spec.md §6`).
    pub fn make_add(&mut self, a: Node, b: Node, kind: ElementKind) -> Node {
        let opcode = Opcode::AddI;
        let _ = kind; // kind selects legalization in the real IR; tracked via inputs here.
        self.value_number_or_insert(NodeData::new(opcode).with_inputs([a, b]))
    }

    /// `make_sub(a, b, kind)` (`spec.md §6`).
    pub fn make_sub(&mut self, a: Node, b: Node, kind: ElementKind) -> Node {
        let opcode = Opcode::SubI;
        let _ = kind;
        self.value_number_or_insert(NodeData::new(opcode).with_inputs([a, b]))
    }

    /// `make_shift_left(x, k, kind)` (`spec.md §6`).
    pub fn make_shift_left(&mut self, x: Node, k: Node, kind: ElementKind) -> Node {
        let _ = kind;
        self.value_number_or_insert(NodeData::new(Opcode::LShiftL).with_inputs([x, k]))
    }

    /// `make_conv_i_to_l(x)` (`spec.md §6`).
    pub fn make_conv_i_to_l(&mut self, x: Node) -> Node {
        self.value_number_or_insert(NodeData::new(Opcode::ConvI2L).with_inputs([x]))
    }

    /// All nodes currently in the graph, in insertion order. Used by
    /// `VLoopBody`'s raw-walk pass.
    pub fn iter(&self) -> impl Iterator<Item = Node> + '_ {
        self.nodes.keys()
    }

    /// Every node the host reports as a member of `lp`, in ascending
    /// entity order (for deterministic iteration across analysis passes
    /// that don't otherwise care about insertion order).
    pub fn members_of(&self, lp: LoopId) -> Vec<Node> {
        let mut v: Vec<Node> = self.iter().filter(|&n| self.is_member(n, lp)).collect();
        v.sort();
        v
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

fn vn_key(data: &NodeData) -> VnKey {
    VnKey {
        opcode: data.opcode,
        inputs: data.inputs.clone(),
        imm: data.imm,
    }
}

/// A `node -> position` side table, generalizing
/// `cranelift_codegen`'s dense `SecondaryMap` usage for per-node scratch
/// data computed by one analysis pass.
pub type NodeMap<V> = SecondaryMap<Node, V>;
