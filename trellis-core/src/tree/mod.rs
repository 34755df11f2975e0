//! Live Document Tree
//!
//! The component tree: an arena of typed component nodes with a
//! tree-wide unique-name invariant. Components own their state variables
//! (by ID into the dependency graph) and are created when the tree is
//! built or when a composite expands, and destroyed when their subtree is
//! removed.

mod arena;
mod node;

pub use arena::ComponentArena;
pub use node::{ComponentId, ComponentNode};
