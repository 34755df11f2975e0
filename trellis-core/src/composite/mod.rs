//! Composite Components
//!
//! Composites (`copy`, `collect`, `repeat`) stand for sets of replacement
//! components derived from a source. `spec` reads the descriptor off a
//! composite node; `expand` builds and diffs the replacement subtrees.

mod expand;
mod spec;

pub use expand::Expander;
pub use spec::{CompositeSpec, LinkMode, ReplacementSet, StableKey};
