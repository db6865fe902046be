//! Alignment solver (`spec.md §4.2`).
//!
//! Given a `VPointer`-decoded memory reference plus loop stride/width data,
//! determines whether the pre-loop trip count can be chosen so that every
//! main-loop vector access lands on an `aw`-byte boundary, and if so
//! describes the admissible pre-loop counts. The solver never mutates the
//! IR and never panics on bad input shapes — "can't reason about this" is
//! always reported as `AlignmentSolution::Empty`, matching `spec.md §8`
//! scenario S3.

use crate::ir::{Graph, Node, Opcode};
use crate::vpointer::VPointer;

/// The outcome of `solve` (`spec.md §3`, "AlignmentSolution").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlignmentSolution {
    /// Every pre-loop trip count preserves main-loop alignment.
    Trivial,
    /// No pre-loop trip count preserves main-loop alignment.
    Empty(&'static str),
    /// Admissible pre-loop counts are `m*q + r - invar/(scale*pre_stride) -
    /// init/pre_stride` for any integer `m`.
    Constrained {
        /// The memory reference this solution was computed for.
        mem_ref: Node,
        /// Period of admissible pre-loop counts; a power of two, `>= 2`.
        q: u32,
        /// Residue in `[0, q)`.
        r: u32,
        /// The aggregated loop-invariant term from the `VPointer`, if any.
        invar: Option<Node>,
        /// The `VPointer`'s scale.
        scale: i64,
    },
}

/// Inputs to `solve`, one call per candidate vector memory reference
/// (`spec.md §4.2`, "Contract").
pub struct AlignmentQuery<'a> {
    /// The memory node being aligned.
    pub mem_ref: Node,
    /// Its `VPointer` decomposition.
    pub vptr: &'a VPointer,
    /// The induction variable's initial-value node.
    pub init_node: Node,
    /// `VPointer::invariant_factor` for this reference.
    pub invariant_factor: i64,
    /// The pre-loop's per-iteration stride.
    pub pre_stride: i64,
    /// The main-loop's per-iteration stride (`pre_stride * unroll factor`).
    pub main_stride: i64,
    /// `min(vector_width, object_alignment)`.
    pub aw: u32,
}

fn is_pow2_abs(x: i64) -> bool {
    let x = x.unsigned_abs();
    x != 0 && (x & (x - 1)) == 0
}

fn const_value(graph: &Graph, n: Node) -> Option<i64> {
    let data = graph.data(n);
    match data.opcode {
        Opcode::ConstI | Opcode::ConstL => Some(data.imm),
        _ => None,
    }
}

/// The classification of one of the three sub-equations (`spec.md §4.2`
/// table).
enum SubEq {
    Trivial,
    Empty,
    Constrained,
}

fn classify(c: i64, c_pre_abs: i64, aw: i64) -> SubEq {
    if c_pre_abs >= aw {
        if c % aw == 0 {
            SubEq::Trivial
        } else {
            SubEq::Empty
        }
    } else if c % c_pre_abs == 0 {
        SubEq::Constrained
    } else {
        SubEq::Empty
    }
}

/// Euclidean mod with the positive-remainder convention (`spec.md §4.2`,
/// "Numeric semantics").
fn pos_mod(a: i64, m: i64) -> i64 {
    let m = m.abs();
    let r = a % m;
    if r < 0 {
        r + m
    } else {
        r
    }
}

/// `AlignmentSolver::solve` (`spec.md §4.2`).
pub fn solve(graph: &Graph, q: &AlignmentQuery) -> AlignmentSolution {
    let scale = q.vptr.scale();
    let offset = q.vptr.offset();
    let aw = q.aw as i64;

    if scale == 0 {
        return AlignmentSolution::Empty("loop-invariant reference has no pre-loop alignment effect");
    }
    if !is_pow2_abs(scale) {
        return AlignmentSolution::Empty("non power-of-2 stride not supported");
    }
    if !is_pow2_abs(q.pre_stride) {
        return AlignmentSolution::Empty("non power-of-2 stride not supported");
    }
    debug_assert!(is_pow2_abs(q.main_stride), "main_stride must be a power of two");
    debug_assert!(aw > 0 && (aw & (aw - 1)) == 0, "aw must be a power of two");

    let init_const = const_value(graph, q.init_node);
    let init_is_const = init_const.is_some();

    let c_const = offset + init_const.map_or(0, |i| i * scale);
    let c_invar = q.invariant_factor.abs();
    let c_init = if init_is_const { 0 } else { scale };
    let c_pre = scale * q.pre_stride;
    let c_main = scale * q.main_stride;

    if c_main % aw != 0 {
        return AlignmentSolution::Empty("main-loop stride does not preserve alignment");
    }

    let c_pre_abs = c_pre.abs();
    if c_pre_abs == 0 {
        return AlignmentSolution::Empty("pre-loop stride does not move this reference");
    }

    let consts = [c_const, c_invar, c_init];
    let mut any_empty = false;
    let mut any_constrained = false;
    for &c in &consts {
        match classify(c, c_pre_abs, aw) {
            SubEq::Trivial => {}
            SubEq::Empty => any_empty = true,
            SubEq::Constrained => any_constrained = true,
        }
    }

    if any_empty {
        return AlignmentSolution::Empty("sub-equation unsatisfiable for any pre-loop count");
    }
    if !any_constrained {
        return AlignmentSolution::Trivial;
    }

    // All three are either TRIVIAL or CONSTRAINED, and at least one is
    // CONSTRAINED with `|c_pre| < aw`; every CONSTRAINED sub-equation
    // shares the same `c_pre`, hence the same `q`.
    let qv = (aw / c_pre_abs) as u32;
    debug_assert!(qv >= 2 && (qv & (qv - 1)) == 0);

    // `any_constrained` forced every sub-equation onto the `|c_pre| < aw`
    // branch of the table (the branch choice depends only on `c_pre` vs
    // `aw`, shared by all three), so `c_const % c_pre == 0` already holds
    // and this division is exact.
    let denom = scale * q.pre_stride;
    debug_assert_eq!(c_const % denom, 0);
    let r = pos_mod(-(c_const / denom), qv as i64);

    AlignmentSolution::Constrained {
        mem_ref: q.mem_ref,
        q: qv,
        r: r as u32,
        invar: q.vptr.invar(),
        scale,
    }
}
