//! Typed failure reasons for the analysis pipeline.
//!
//! Every fallible operation in this crate returns a named reason rather
//! than panicking, mirroring `cranelift_codegen::result::{CodegenError,
//! CodegenResult}` (named from `cranelift-codegen/src/lib.rs`, not shipped
//! in this retrieval pack). Internal-consistency assertions that would
//! indicate a compiler bug — not a legitimate "can't vectorize this loop"
//! outcome — stay as `debug_assert!`s and are not represented here
//! (`spec.md §7`).

use failure_derive::Fail;

/// Why `VLoop::check_preconditions` rejected a loop (`spec.md §4.3`, `§7`).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Fail)]
pub enum PreconditionFailure {
    /// The platform has no usable power-of-two vector width.
    #[fail(display = "no usable vector width on this platform")]
    NoVectorWidth,
    /// The loop is not a valid counted integer loop.
    #[fail(display = "not a counted integer loop")]
    NotCountedLoop,
    /// The loop has already been vectorized.
    #[fail(display = "loop already vectorized")]
    AlreadyVectorized,
    /// The loop is marked unroll-only.
    #[fail(display = "loop is marked unroll-only")]
    UnrollOnly,
    /// The loop body has in-body control flow the caller did not allow.
    #[fail(display = "loop body contains disallowed control flow")]
    InBodyControlFlow,
    /// The backedge does not have exactly one control user.
    #[fail(display = "loop backedge does not have exactly one control user")]
    BackedgeNotUnique,
    /// This is a main loop but its pre-loop has no rewritable opaque limit.
    #[fail(display = "main loop's pre-loop has no rewritable limit")]
    MissingPreLoopLimit,
}

/// Why `VLoopAnalyzer::analyze` gave up after preconditions passed
/// (`spec.md §4.9`, `§7`).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Fail)]
pub enum AnalyzerFailure {
    /// Neither a reduction nor a store was found; vectorizing would be
    /// pointless.
    #[fail(display = "loop has neither a reduction nor a store")]
    NoReductionOrStore,
    /// `VLoopBody::construct` encountered a node kind it must reject.
    #[fail(display = "node not allowed in vector loop body")]
    NodeNotAllowed,
    /// The loop carries no max-unroll signal from the host compiler.
    #[fail(display = "loop has no max-unroll signal")]
    NoMaxUnrollSignal,
}

/// Why the alignment solver could not produce a usable answer
/// (`spec.md §4.2`, `§7`). `Empty` outcomes that *are* legitimate answers
/// (not failures) are represented by `AlignmentSolution::Empty` instead;
/// this type is for inputs the solver refuses to reason about at all.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Fail)]
pub enum AlignmentInputError {
    /// `pre_stride` or `scale` is not a power of two in magnitude.
    #[fail(display = "non-power-of-two stride or scale")]
    NonPowerOfTwoStride,
}

/// The union of every failure category this crate can report.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Fail)]
pub enum AutovecError {
    /// A precondition failure (`spec.md §4.3`).
    #[fail(display = "{}", _0)]
    Precondition(PreconditionFailure),
    /// An analyzer pipeline failure (`spec.md §4.9`).
    #[fail(display = "{}", _0)]
    Analyzer(AnalyzerFailure),
    /// An alignment solver input error (`spec.md §4.2`).
    #[fail(display = "{}", _0)]
    Alignment(AlignmentInputError),
}

impl From<PreconditionFailure> for AutovecError {
    fn from(e: PreconditionFailure) -> Self {
        AutovecError::Precondition(e)
    }
}

impl From<AnalyzerFailure> for AutovecError {
    fn from(e: AnalyzerFailure) -> Self {
        AutovecError::Analyzer(e)
    }
}

impl From<AlignmentInputError> for AutovecError {
    fn from(e: AlignmentInputError) -> Self {
        AutovecError::Alignment(e)
    }
}

/// The result type threaded through the analysis pipeline.
pub type AutovecResult<T> = Result<T, AutovecError>;
