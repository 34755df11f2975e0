//! Component Type Registry
//!
//! Concrete component types (points, numbers, sequences, pickers,
//! samples, containers, composites) and their state-variable and action
//! tables. The rest of the engine is type-agnostic; everything a type
//! means lives here.

mod registry;

pub use registry::{action_targets, create_component, is_composite, link_component};
