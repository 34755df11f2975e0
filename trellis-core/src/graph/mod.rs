//! State-Variable Dependency Graph
//!
//! This module implements the reactive core: every component's named
//! state variables, the dependency edges between them, and the lazy
//! freshening machinery with memoization, dirty propagation, dynamic
//! dependency redetermination, and cycle detection.
//!
//! # Concepts
//!
//! ## Essential variables
//!
//! An essential variable is an independent source of truth. It holds its
//! value directly and is the only kind of variable an action may write.
//!
//! ## Computed variables
//!
//! A computed variable's value is a pure function of declared
//! dependencies. It caches its result and recomputes only when an input
//! actually changed (change clocks, not mere staleness). A computed
//! variable may carry an inverse definition, which lets the dispatcher
//! map a requested new value back onto its dependencies.
//!
//! ## Dynamic dependencies
//!
//! Some variables cannot declare their dependencies up front ("depend on
//! whichever item the picker points to"). These carry an explicit
//! two-phase descriptor: determinant variables are freshened first, a
//! determine step maps their values to the actual source list, and only
//! then is the definition computed.

mod definition;
#[allow(clippy::module_inception)]
mod graph;
mod variable;

pub use definition::{
    ComputeFn, Definition, DependencySource, DependencySpec, DetermineFn, InverseFn,
    InverseResult,
};
pub use graph::DependencyGraph;
pub use variable::{Freshness, ResolvedDep, StateVariable, VarId};
