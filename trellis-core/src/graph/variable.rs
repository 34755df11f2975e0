//! State Variables
//!
//! A `StateVariable` belongs to exactly one component and carries its
//! name, cached value, freshness, definition, optional inverse, and the
//! edges currently connecting it into the dependency graph.
//!
//! Freshness has three states rather than two: `Resolving` marks a
//! variable whose freshening is in progress. Re-entering a `Resolving`
//! variable is how the graph detects dependency cycles without looping.
//!
//! The change/compute clocks implement the maybe-dirty short circuit: a
//! stale variable whose dependencies have not changed since its last
//! computation refreshes without recomputing, and an unchanged
//! recomputation does not advance `last_changed`, so downstream consumers
//! skip their own recomputation too.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::tree::ComponentId;
use crate::value::StateValue;

use super::definition::{Definition, InverseFn};

/// Unique identifier for a state variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(u64);

impl VarId {
    /// Generate a new unique variable ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for VarId {
    fn default() -> Self {
        Self::new()
    }
}

/// Freshness of a variable's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The cached value is exactly what the definition would produce from
    /// the current values of its dependencies.
    Fresh,
    /// A dependency (or the variable itself) changed; the cached value may
    /// be out of date.
    Stale,
    /// Freshening is in progress. Re-entry means a dependency cycle.
    Resolving,
}

/// A dependency edge after resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedDep {
    /// Another state variable, optionally one element of its list value.
    Var { id: VarId, index: Option<usize> },
    /// A constant captured at determination time (attribute values,
    /// placeholders for unresolved sources).
    Const(StateValue),
}

/// One state variable in the dependency graph.
pub struct StateVariable {
    pub id: VarId,
    pub owner: ComponentId,
    pub name: String,
    pub value: StateValue,
    pub freshness: Freshness,
    pub definition: Definition,
    pub inverse: Option<InverseFn>,
    /// Resolved dependency edges, in definition slot order.
    pub resolved: SmallVec<[ResolvedDep; 4]>,
    /// Resolved determinant edges (dynamic definitions only).
    pub determinants: SmallVec<[ResolvedDep; 2]>,
    /// Variables with a dependency edge pointing at this one.
    pub dependents: HashSet<VarId>,
    /// Clock value when this variable's value last changed.
    pub last_changed: u64,
    /// Clock value when the definition last ran.
    pub last_computed: u64,
    /// Clock value when dependencies were last (re)determined.
    pub last_determined: u64,
    /// Whether the definition has ever run.
    pub ever_computed: bool,
    /// Whether dependency determination has ever run.
    pub ever_determined: bool,
}

impl StateVariable {
    /// Create an essential variable with an initial value.
    pub fn essential(owner: ComponentId, name: impl Into<String>, value: StateValue) -> Self {
        Self {
            id: VarId::new(),
            owner,
            name: name.into(),
            value,
            freshness: Freshness::Fresh,
            definition: Definition::Essential,
            inverse: None,
            resolved: SmallVec::new(),
            determinants: SmallVec::new(),
            dependents: HashSet::new(),
            last_changed: 0,
            last_computed: 0,
            last_determined: 0,
            ever_computed: false,
            ever_determined: false,
        }
    }

    /// Create a computed variable. Starts stale so the first read runs the
    /// definition.
    pub fn computed(owner: ComponentId, name: impl Into<String>, definition: Definition) -> Self {
        Self {
            id: VarId::new(),
            owner,
            name: name.into(),
            value: StateValue::Invalid,
            freshness: Freshness::Stale,
            definition,
            inverse: None,
            resolved: SmallVec::new(),
            determinants: SmallVec::new(),
            dependents: HashSet::new(),
            last_changed: 0,
            last_computed: 0,
            last_determined: 0,
            ever_computed: false,
            ever_determined: false,
        }
    }

    /// Attach an inverse definition.
    pub fn with_inverse(mut self, inverse: InverseFn) -> Self {
        self.inverse = Some(inverse);
        self
    }

    /// Whether this variable is an independent source of truth.
    pub fn is_essential(&self) -> bool {
        matches!(self.definition, Definition::Essential)
    }

    /// IDs of all producer variables this one currently depends on,
    /// determinant edges included.
    pub fn producer_ids(&self) -> SmallVec<[VarId; 6]> {
        let mut ids = SmallVec::new();
        for dep in self.determinants.iter().chain(self.resolved.iter()) {
            if let ResolvedDep::Var { id, .. } = dep {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        ids
    }
}

impl Debug for StateVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateVariable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("value", &self.value)
            .field("freshness", &self.freshness)
            .field("essential", &self.is_essential())
            .field("dependents", &self.dependents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::definition::DependencySource;

    #[test]
    fn var_ids_are_unique() {
        assert_ne!(VarId::new(), VarId::new());
    }

    #[test]
    fn essential_starts_fresh() {
        let var = StateVariable::essential(ComponentId::new(), "x", StateValue::Number(1.0));
        assert_eq!(var.freshness, Freshness::Fresh);
        assert!(var.is_essential());
    }

    #[test]
    fn computed_starts_stale_and_invalid() {
        let owner = ComponentId::new();
        let var = StateVariable::computed(
            owner,
            "coords",
            Definition::computed(vec![DependencySource::variable(owner, "x")], |inputs| {
                inputs.first().cloned().unwrap_or(StateValue::Invalid)
            }),
        );
        assert_eq!(var.freshness, Freshness::Stale);
        assert!(var.value.is_invalid());
        assert!(!var.is_essential());
    }

    #[test]
    fn producer_ids_deduplicate_across_edge_lists() {
        let mut var = StateVariable::essential(ComponentId::new(), "x", StateValue::Invalid);
        let producer = VarId::new();
        var.determinants.push(ResolvedDep::Var {
            id: producer,
            index: None,
        });
        var.resolved.push(ResolvedDep::Var {
            id: producer,
            index: Some(0),
        });
        var.resolved.push(ResolvedDep::Const(StateValue::Number(1.0)));
        assert_eq!(var.producer_ids().as_slice(), &[producer]);
    }
}
