//! Per-pass timing tokens.
//!
//! Mirrors `cranelift_codegen::timing` (referenced from
//! `cranelift-codegen/src/flowgraph.rs` and `regalloc/context.rs` as
//! `let _tt = timing::flowgraph();`, not shipped in this retrieval pack):
//! each pipeline stage in `analyzer.rs` opens a scope-guard token whose drop
//! records elapsed time. Outside of `std` builds there's nowhere to record
//! to, so the token degrades to a zero-sized no-op.

#[cfg(feature = "std")]
use std::time::Instant;

/// An RAII token for one pass's wall-clock time. Dropping it is the only
/// observable effect; there is no global registry to read back from in this
/// crate (the host compiler's profiler, if any, is out of scope).
pub struct PassTimer {
    #[cfg(feature = "std")]
    name: &'static str,
    #[cfg(feature = "std")]
    start: Instant,
}

impl PassTimer {
    fn new(_name: &'static str) -> Self {
        PassTimer {
            #[cfg(feature = "std")]
            name: _name,
            #[cfg(feature = "std")]
            start: Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Drop for PassTimer {
    fn drop(&mut self) {
        log::trace!("{} took {:?}", self.name, self.start.elapsed());
    }
}

/// Open a timing scope for `VLoop::check_preconditions`.
pub fn preconditions() -> PassTimer {
    PassTimer::new("check_preconditions")
}

/// Open a timing scope for `VLoopReductions`.
pub fn reductions() -> PassTimer {
    PassTimer::new("reductions")
}

/// Open a timing scope for `VLoopMemorySlices`.
pub fn memory_slices() -> PassTimer {
    PassTimer::new("memory_slices")
}

/// Open a timing scope for `VLoopBody`.
pub fn body() -> PassTimer {
    PassTimer::new("body")
}

/// Open a timing scope for `VLoopTypes`.
pub fn types() -> PassTimer {
    PassTimer::new("types")
}

/// Open a timing scope for `VLoopDependenceGraph`.
pub fn dependence_graph() -> PassTimer {
    PassTimer::new("dependence_graph")
}

/// Open a timing scope for the whole `VLoopAnalyzer::analyze` pipeline.
pub fn analyzer() -> PassTimer {
    PassTimer::new("analyzer")
}
