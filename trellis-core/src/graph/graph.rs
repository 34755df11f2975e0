//! Dependency Graph
//!
//! The reactive core: all state variables of a document, the edges between
//! them, and the freshening machinery.
//!
//! # Freshening
//!
//! Reads are pull-based. `get_value` on a stale variable:
//!
//! 1. Marks the variable `Resolving` (re-entry here is a dependency cycle:
//!    reported as a warning, and the variable resolves to the invalid
//!    sentinel instead of looping).
//! 2. (Re)runs dependency determination. Static dependency lists are
//!    re-resolved against the tree; dynamic lists first freshen their
//!    determinant variables and re-run the determine step only if a
//!    determinant changed. Every new edge is checked against the DAG
//!    invariant before it is installed.
//! 3. Recursively freshens the resolved dependencies.
//! 4. Recomputes only if an edge changed or some dependency changed since
//!    this variable last computed (change clocks). An unchanged
//!    recomputation does not advance the variable's change clock, which
//!    short-circuits recomputation downstream.
//!
//! # Writes
//!
//! Only essential variables are written (`set_essential`). A write bumps
//! the clock and marks all transitive dependents stale; recomputation
//! stays lazy, so marking is cheap metadata and no intermediate state is
//! observable between writes of a batch.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::error::Warning;
use crate::tree::ComponentArena;
use crate::value::StateValue;

use super::definition::{Definition, DependencySource, DependencySpec, DetermineFn, InverseFn};
use super::variable::{Freshness, ResolvedDep, StateVariable, VarId};

/// All state variables of one document, with their edges.
pub struct DependencyGraph {
    vars: IndexMap<VarId, StateVariable>,
    /// Monotonic change clock; bumped whenever any value changes.
    clock: u64,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            vars: IndexMap::new(),
            clock: 0,
        }
    }

    /// Add a variable to the graph. Its initial value counts as a change.
    pub fn add_variable(&mut self, mut var: StateVariable) -> VarId {
        self.clock += 1;
        var.last_changed = self.clock;
        let id = var.id;
        self.vars.insert(id, var);
        id
    }

    /// Get a reference to a variable.
    pub fn get(&self, id: VarId) -> Option<&StateVariable> {
        self.vars.get(&id)
    }

    /// The cached value, without freshening.
    pub fn cached_value(&self, id: VarId) -> StateValue {
        self.vars
            .get(&id)
            .map(|v| v.value.clone())
            .unwrap_or(StateValue::Invalid)
    }

    /// Number of variables in the graph.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Freshen (if needed) and return a variable's value.
    pub fn get_value(
        &mut self,
        id: VarId,
        tree: &ComponentArena,
        warnings: &mut Vec<Warning>,
    ) -> StateValue {
        self.freshen(id, tree, warnings);
        self.cached_value(id)
    }

    /// Write an essential variable directly.
    ///
    /// Returns false (rejected, no mutation) for derived variables.
    /// Writing an equal value is accepted but propagates nothing.
    pub fn set_essential(&mut self, id: VarId, value: StateValue) -> bool {
        match self.vars.get(&id) {
            Some(v) if v.is_essential() => {
                if v.value.equals(&value) {
                    return true;
                }
            }
            _ => return false,
        }
        self.clock += 1;
        let clock = self.clock;
        if let Some(v) = self.vars.get_mut(&id) {
            v.value = value;
            v.last_changed = clock;
        }
        self.mark_stale_dependents(id);
        true
    }

    /// Mark a variable and its transitive dependents stale.
    pub fn mark_stale(&mut self, id: VarId) {
        if let Some(v) = self.vars.get_mut(&id) {
            if v.freshness == Freshness::Fresh && !v.is_essential() {
                v.freshness = Freshness::Stale;
            }
        }
        self.mark_stale_dependents(id);
    }

    /// Mark every transitive dependent of a variable stale (BFS).
    pub fn mark_stale_dependents(&mut self, id: VarId) {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<VarId> = self
            .vars
            .get(&id)
            .map(|v| v.dependents.iter().copied().collect())
            .unwrap_or_default();

        while let Some(next) = queue.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            if let Some(v) = self.vars.get_mut(&next) {
                if v.freshness == Freshness::Fresh {
                    v.freshness = Freshness::Stale;
                }
                for dependent in v.dependents.iter() {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    /// Remove a variable, unlinking its edges.
    ///
    /// Consumers that still name the removed producer degrade to the
    /// invalid sentinel (with an unresolved-reference warning) the next
    /// time they freshen.
    pub fn remove_variable(&mut self, id: VarId) {
        if let Some(var) = self.vars.shift_remove(&id) {
            for producer in var.producer_ids() {
                if let Some(p) = self.vars.get_mut(&producer) {
                    p.dependents.remove(&id);
                }
            }
            for consumer in var.dependents {
                self.mark_stale(consumer);
            }
        }
    }

    /// Swap a variable's definition in place (used when a replacement
    /// variable becomes a shadow of its source, or is snapshotted into an
    /// essential). Clears its edges and forces redetermination.
    pub fn replace_definition(
        &mut self,
        id: VarId,
        definition: Definition,
        inverse: Option<InverseFn>,
    ) {
        let essential = matches!(definition, Definition::Essential);
        match self.vars.get_mut(&id) {
            Some(v) => {
                v.definition = definition;
                v.inverse = inverse;
                v.resolved.clear();
                v.determinants.clear();
                v.ever_computed = false;
                v.ever_determined = false;
                v.freshness = if essential {
                    Freshness::Fresh
                } else {
                    Freshness::Stale
                };
            }
            None => return,
        }
        self.relink(id);
        self.mark_stale_dependents(id);
    }

    /// Current values of a variable's resolved dependencies, in slot
    /// order. Callers freshen first; this reads caches only.
    pub fn dependency_values(&self, id: VarId, warnings: &mut Vec<Warning>) -> Vec<StateValue> {
        let deps: SmallVec<[ResolvedDep; 4]> = match self.vars.get(&id) {
            Some(v) => v.resolved.clone(),
            None => return Vec::new(),
        };
        self.edge_values(&deps, warnings)
    }

    /// The variable IDs reachable downstream of the given seeds,
    /// seeds included.
    pub fn dependents_transitive(&self, seeds: &[VarId]) -> HashSet<VarId> {
        let mut out = HashSet::new();
        let mut stack: Vec<VarId> = seeds.to_vec();
        while let Some(id) = stack.pop() {
            if !out.insert(id) {
                continue;
            }
            if let Some(v) = self.vars.get(&id) {
                stack.extend(v.dependents.iter().copied());
            }
        }
        out
    }

    /// Whether `start` (transitively) depends on `target`. Used to reject
    /// edges that would close a cycle before they are installed.
    pub fn depends_on(&self, start: VarId, target: VarId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(v) = self.vars.get(&id) {
                stack.extend(v.producer_ids());
            }
        }
        false
    }

    /// Freshen a variable. Returns whether its value changed.
    pub fn freshen(
        &mut self,
        id: VarId,
        tree: &ComponentArena,
        warnings: &mut Vec<Warning>,
    ) -> bool {
        let (state, essential) = match self.vars.get(&id) {
            Some(v) => (v.freshness, v.is_essential()),
            None => return false,
        };
        if essential || state == Freshness::Fresh {
            return false;
        }

        if state == Freshness::Resolving {
            // Freshening re-entered itself: dependency cycle.
            let name = self
                .vars
                .get(&id)
                .map(|v| v.name.clone())
                .unwrap_or_default();
            warn!(variable = %name, "dependency cycle during freshening");
            warnings.push(Warning::dependency_cycle(&name));
            self.clock += 1;
            let clock = self.clock;
            if let Some(v) = self.vars.get_mut(&id) {
                if !v.value.is_invalid() {
                    v.value = StateValue::Invalid;
                    v.last_changed = clock;
                }
            }
            return true;
        }

        if let Some(v) = self.vars.get_mut(&id) {
            v.freshness = Freshness::Resolving;
        }

        // Phase 1: (re)determine dependencies.
        let edges_changed = match self.redetermine(id, tree, warnings) {
            Ok(changed) => changed,
            Err(()) => return self.resolve_to_invalid(id),
        };

        // Phase 2: freshen the resolved dependencies.
        let deps: SmallVec<[ResolvedDep; 4]> = self
            .vars
            .get(&id)
            .map(|v| v.resolved.clone())
            .unwrap_or_default();
        for dep in &deps {
            if let ResolvedDep::Var { id: producer, .. } = dep {
                self.freshen(*producer, tree, warnings);
            }
        }

        // Short circuit: nothing changed underneath since the last run.
        let (last_computed, ever_computed) = self
            .vars
            .get(&id)
            .map(|v| (v.last_computed, v.ever_computed))
            .unwrap_or((0, false));
        let mut inputs_changed = edges_changed || !ever_computed;
        if !inputs_changed {
            for dep in &deps {
                if let ResolvedDep::Var { id: producer, .. } = dep {
                    let producer_changed = self
                        .vars
                        .get(producer)
                        .map(|p| p.last_changed)
                        .unwrap_or(u64::MAX);
                    if producer_changed > last_computed {
                        inputs_changed = true;
                        break;
                    }
                }
            }
        }
        if !inputs_changed {
            if let Some(v) = self.vars.get_mut(&id) {
                v.freshness = Freshness::Fresh;
            }
            return false;
        }

        let inputs = self.edge_values(&deps, warnings);
        let compute = match self.vars.get(&id).map(|v| v.definition.clone()) {
            Some(Definition::Computed { compute, .. }) => compute,
            _ => {
                if let Some(v) = self.vars.get_mut(&id) {
                    v.freshness = Freshness::Fresh;
                }
                return false;
            }
        };
        let new_value = compute(&inputs);

        self.clock += 1;
        let clock = self.clock;
        match self.vars.get_mut(&id) {
            Some(v) => {
                let changed = !v.value.equals(&new_value);
                if changed {
                    v.value = new_value;
                    v.last_changed = clock;
                }
                v.freshness = Freshness::Fresh;
                v.last_computed = clock;
                v.ever_computed = true;
                trace!(variable = %v.name, changed, "freshened");
                changed
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Dependency determination
    // ------------------------------------------------------------------

    /// Re-run the dependency-determination step for a variable.
    ///
    /// Returns whether the edge set changed; `Err` means a redeclaration
    /// would have closed a cycle and the variable must degrade to invalid.
    fn redetermine(
        &mut self,
        id: VarId,
        tree: &ComponentArena,
        warnings: &mut Vec<Warning>,
    ) -> Result<bool, ()> {
        enum Plan {
            Inert,
            Static(Vec<DependencySource>),
            Dynamic {
                determinants: Vec<DependencySource>,
                determine: DetermineFn,
            },
        }

        let plan = match self.vars.get(&id).map(|v| &v.definition) {
            Some(Definition::Computed { sources, .. }) => match sources {
                DependencySpec::Static(list) => Plan::Static(list.clone()),
                DependencySpec::Dynamic {
                    determinants,
                    determine,
                } => Plan::Dynamic {
                    determinants: determinants.clone(),
                    determine: determine.clone(),
                },
            },
            _ => Plan::Inert,
        };

        match plan {
            Plan::Inert => Ok(false),
            Plan::Static(sources) => {
                let new_resolved = self.resolve_sources(id, &sources, tree, warnings)?;
                Ok(self.install_resolved(id, new_resolved))
            }
            Plan::Dynamic {
                determinants,
                determine,
            } => {
                let new_det = self.resolve_sources(id, &determinants, tree, warnings)?;
                let det_changed = self.install_determinants(id, new_det);

                let det_edges: SmallVec<[ResolvedDep; 2]> = self
                    .vars
                    .get(&id)
                    .map(|v| v.determinants.clone())
                    .unwrap_or_default();
                for dep in &det_edges {
                    if let ResolvedDep::Var { id: producer, .. } = dep {
                        self.freshen(*producer, tree, warnings);
                    }
                }

                let (last_determined, ever_determined) = self
                    .vars
                    .get(&id)
                    .map(|v| (v.last_determined, v.ever_determined))
                    .unwrap_or((0, false));
                let mut need = det_changed || !ever_determined;
                if !need {
                    for dep in &det_edges {
                        if let ResolvedDep::Var { id: producer, .. } = dep {
                            let changed_at = self
                                .vars
                                .get(producer)
                                .map(|p| p.last_changed)
                                .unwrap_or(u64::MAX);
                            if changed_at > last_determined {
                                need = true;
                                break;
                            }
                        }
                    }
                }
                if !need {
                    return Ok(false);
                }

                let det_values = self.edge_values(&det_edges, warnings);
                let sources = determine(&det_values);
                let new_resolved = self.resolve_sources(id, &sources, tree, warnings)?;
                let changed = self.install_resolved(id, new_resolved);

                let clock = self.clock;
                if let Some(v) = self.vars.get_mut(&id) {
                    v.last_determined = clock;
                    v.ever_determined = true;
                }
                Ok(changed)
            }
        }
    }

    /// Resolve declared sources into concrete edges, checking the DAG
    /// invariant for each.
    fn resolve_sources(
        &mut self,
        consumer: VarId,
        sources: &[DependencySource],
        tree: &ComponentArena,
        warnings: &mut Vec<Warning>,
    ) -> Result<SmallVec<[ResolvedDep; 4]>, ()> {
        let mut out = SmallVec::new();
        for source in sources {
            match source {
                DependencySource::Variable {
                    component,
                    variable,
                    index,
                } => match tree.get(*component).and_then(|n| n.variable(variable)) {
                    Some(producer) => {
                        if producer == consumer || self.depends_on(producer, consumer) {
                            let name = self
                                .vars
                                .get(&consumer)
                                .map(|v| v.name.clone())
                                .unwrap_or_default();
                            warn!(variable = %name, "rejected edge that would close a cycle");
                            warnings.push(Warning::dependency_cycle(&name));
                            return Err(());
                        }
                        out.push(ResolvedDep::Var {
                            id: producer,
                            index: *index,
                        });
                    }
                    None => {
                        let owner = tree
                            .get(*component)
                            .map(|n| n.name.as_str())
                            .unwrap_or("<removed>");
                        warnings
                            .push(Warning::unresolved_reference(&format!("{owner}.{variable}")));
                        out.push(ResolvedDep::Const(StateValue::Invalid));
                    }
                },
                DependencySource::Attribute {
                    component,
                    attribute,
                } => {
                    let value = tree
                        .get(*component)
                        .and_then(|n| n.attributes.get(attribute))
                        .map(|raw| StateValue::Text(raw.clone()))
                        .unwrap_or(StateValue::Invalid);
                    out.push(ResolvedDep::Const(value));
                }
            }
        }
        Ok(out)
    }

    fn install_resolved(&mut self, id: VarId, new: SmallVec<[ResolvedDep; 4]>) -> bool {
        let old: SmallVec<[ResolvedDep; 4]> = self
            .vars
            .get(&id)
            .map(|v| v.resolved.clone())
            .unwrap_or_default();
        if old == new {
            return false;
        }
        if let Some(v) = self.vars.get_mut(&id) {
            v.resolved = new;
        }
        self.relink(id);
        true
    }

    fn install_determinants(&mut self, id: VarId, new: SmallVec<[ResolvedDep; 4]>) -> bool {
        let old: SmallVec<[ResolvedDep; 2]> = self
            .vars
            .get(&id)
            .map(|v| v.determinants.clone())
            .unwrap_or_default();
        if old.as_slice() == new.as_slice() {
            return false;
        }
        if let Some(v) = self.vars.get_mut(&id) {
            v.determinants = SmallVec::from_iter(new);
        }
        self.relink(id);
        true
    }

    /// Rebuild the dependent back-edges for one consumer from its current
    /// edge lists.
    fn relink(&mut self, consumer: VarId) {
        let producers = self
            .vars
            .get(&consumer)
            .map(|v| v.producer_ids())
            .unwrap_or_default();
        for var in self.vars.values_mut() {
            var.dependents.remove(&consumer);
        }
        for producer in producers {
            if let Some(v) = self.vars.get_mut(&producer) {
                v.dependents.insert(consumer);
            }
        }
    }

    fn edge_values(&self, deps: &[ResolvedDep], warnings: &mut Vec<Warning>) -> Vec<StateValue> {
        deps.iter()
            .map(|dep| match dep {
                ResolvedDep::Const(value) => value.clone(),
                ResolvedDep::Var { id, index } => match self.vars.get(id) {
                    Some(producer) => match index {
                        None => producer.value.clone(),
                        Some(i) => producer.value.list_element(*i),
                    },
                    None => {
                        warnings.push(Warning::unresolved_reference("<removed variable>"));
                        StateValue::Invalid
                    }
                },
            })
            .collect()
    }

    fn resolve_to_invalid(&mut self, id: VarId) -> bool {
        self.clock += 1;
        let clock = self.clock;
        match self.vars.get_mut(&id) {
            Some(v) => {
                let changed = !v.value.is_invalid();
                if changed {
                    v.value = StateValue::Invalid;
                    v.last_changed = clock;
                }
                v.freshness = Freshness::Fresh;
                changed
            }
            None => false,
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
