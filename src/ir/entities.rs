//! Entity references into the analyzed loop's IR graph.
//!
//! Nodes in the host IR are not represented as Rust references, for the same
//! reasons Cranelift's own `ir::Value`/`ir::Inst`/`ir::Ebb` aren't: ownership
//! and mutability would fight the borrow checker, and a 64-bit pointer is
//! wasteful next to a 32-bit dense index. Instead each node is a small
//! struct wrapping a `u32` index into a table owned by `ir::Graph`, used as
//! the key into `PrimaryMap`/`SecondaryMap` side tables kept by the
//! analysis passes.
//!
//! The entity references implement `Display` the way Cranelift's do,
//! printing as `n42`.

use cranelift_entity::entity_impl;
use core::fmt;
use core::u32;
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// An opaque reference to a node (instruction, phi, or constant) in the
/// analyzed loop's IR graph.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Node(u32);
entity_impl!(Node, "n");

impl Node {
    /// Create a node reference from its number. For use by test fixtures.
    pub fn with_number(n: u32) -> Option<Self> {
        if n < u32::MAX {
            Some(Node(n))
        } else {
            None
        }
    }
}

/// An opaque reference to a loop recognized by the host compiler.
///
/// The analyzer only ever operates on one loop at a time, but the loop's
/// identity is still distinguished from any nesting siblings (e.g. when
/// `is_member` is asked about a node that belongs to an unrelated loop
/// reachable through the same control graph).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct LoopId(u32);
entity_impl!(LoopId, "loop");

/// A reference to any of the entities defined in this module.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum AnyEntity {
    /// A node in the analyzed graph.
    Node(Node),
    /// A loop.
    Loop(LoopId),
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AnyEntity::Node(n) => n.fmt(f),
            AnyEntity::Loop(l) => l.fmt(f),
        }
    }
}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

impl From<Node> for AnyEntity {
    fn from(n: Node) -> Self {
        AnyEntity::Node(n)
    }
}

impl From<LoopId> for AnyEntity {
    fn from(l: LoopId) -> Self {
        AnyEntity::Loop(l)
    }
}
