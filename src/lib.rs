//! Auto-vectorization analysis core.
//!
//! Given one counted loop from the host compiler's IR, this crate
//! disassembles memory addresses into a canonical linear form, partitions
//! the loop's memory traffic into alias-disjoint slices, recognizes
//! reduction cycles, orders the body for lane-parallel codegen, infers the
//! narrowest safe element type for every value, and builds the dependence
//! graph the vectorizing code generator needs to decide which memory
//! accesses may be reordered into SIMD lanes. It analyzes; it does not
//! legalize, schedule, or emit code — those stay the host compiler's job.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]
#![cfg_attr(feature = "std", deny(unstable_features))]
#![no_std]

#[cfg(not(feature = "std"))]
#[macro_use]
extern crate alloc as std;
#[cfg(feature = "std")]
#[macro_use]
extern crate std;

#[cfg(not(feature = "std"))]
pub(crate) use hashmap_core::{HashMap, HashSet};
#[cfg(feature = "std")]
pub(crate) use std::collections::{HashMap, HashSet};

pub use cranelift_bforest as bforest;
pub use cranelift_entity as entity;

pub mod alignment;
pub mod analyzer;
pub mod body;
pub mod dependence;
pub mod dominator_tree;
pub mod ir;
pub mod isa;
pub mod memory_slices;
pub mod reductions;
pub mod result;
pub mod timing;
pub mod types;
pub mod vloop;
pub mod vpointer;

pub use crate::alignment::{solve as solve_alignment, AlignmentQuery, AlignmentSolution};
pub use crate::analyzer::{LoopAnalysis, VLoopAnalyzer};
pub use crate::body::VLoopBody;
pub use crate::dependence::{DepNode, VLoopDependenceGraph};
pub use crate::ir::{CountedLoopInfo, ElementKind, Graph, LoopId, MemType, Node, NodeData, Opcode};
pub use crate::isa::{HostIsa, VectorIsa};
pub use crate::memory_slices::{Slice, VLoopMemorySlices};
pub use crate::reductions::VLoopReductions;
pub use crate::result::{
    AlignmentInputError, AnalyzerFailure, AutovecError, AutovecResult, PreconditionFailure,
};
pub use crate::types::VLoopTypes;
pub use crate::vloop::VLoop;
pub use crate::vpointer::{VPointer, VPointerCmp};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
