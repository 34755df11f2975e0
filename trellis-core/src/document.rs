//! Document Engine
//!
//! `Core` ties the subsystems together: it builds the live component
//! tree and dependency graph from a document description, expands
//! composites, dispatches actions, and produces renderable snapshots.
//!
//! # Build phases
//!
//! 1. **Create**: walk the document depth-first, creating every
//!    component and its locally-definable variables. Full names are
//!    path-qualified (`parent/local`); unnamed nodes get a generated
//!    local name.
//! 2. **Link**: wire cross-component variable definitions, now that
//!    every name exists regardless of document order.
//! 3. **Expand**: run composite expansion to a fixpoint.
//!
//! After an action the engine re-settles composites (a write may have
//! resized a repeat) and answers with snapshots of every component the
//! write could have reached.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::component;
use crate::composite::{CompositeSpec, Expander};
use crate::dispatch::{self, ActionRequest};
use crate::error::{CoreError, Position, Warning};
use crate::graph::DependencyGraph;
use crate::tree::{ComponentArena, ComponentId};
use crate::value::StateValue;
use crate::variant::VariantSampler;

/// Expansion rounds before the engine gives up on a composite fixpoint.
const MAX_SETTLE_ROUNDS: usize = 8;

/// One node of a document description, as supplied by the author.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentNode {
    pub component_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    #[serde(default)]
    pub children: Vec<DocumentNode>,
    #[serde(default)]
    pub position: Option<Position>,
}

/// The rendered state of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSnapshot {
    pub component_type: String,
    pub state_values: IndexMap<String, StateValue>,
}

/// The rendered state of the whole document, keyed by full name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub components: IndexMap<String, ComponentSnapshot>,
}

/// What an action changed: snapshots of every component whose state the
/// write could have reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub components: IndexMap<String, ComponentSnapshot>,
}

/// A live document: tree, graph, composites, and diagnostics.
pub struct Core {
    tree: ComponentArena,
    graph: DependencyGraph,
    expander: Expander,
    sampler: VariantSampler,
    composites: Vec<CompositeSpec>,
    warnings: Vec<Warning>,
    root: ComponentId,
    anon_counter: u64,
}

impl Core {
    /// Build a live document from its description for one variant.
    pub fn build(doc: &DocumentNode, variant_index: u64) -> Result<Self, CoreError> {
        if doc.component_type != "document" {
            return Err(CoreError::MissingRoot);
        }

        let mut core = Core {
            tree: ComponentArena::new(),
            graph: DependencyGraph::new(),
            expander: Expander::new(),
            sampler: VariantSampler::new(variant_index),
            composites: Vec::new(),
            warnings: Vec::new(),
            root: ComponentId::new(),
            anon_counter: 0,
        };

        let mut created = Vec::new();
        core.root = core.create_node(doc, None, None, &mut created)?;

        for &id in &created {
            component::link_component(id, &core.tree, &mut core.graph, &mut core.warnings);
        }
        for &id in &created {
            if let Some(node) = core.tree.get(id) {
                if let Some(spec) = CompositeSpec::from_node(node) {
                    core.composites.push(spec);
                }
            }
        }

        core.settle_composites();
        info!(
            components = core.tree.len(),
            variables = core.graph.len(),
            variant = variant_index,
            "document built"
        );
        Ok(core)
    }

    /// Dispatch one action and report what it changed.
    pub fn handle_action(&mut self, request: &ActionRequest) -> ActionResponse {
        let Some(id) = self.tree.by_name(&request.component) else {
            self.warnings
                .push(Warning::unresolved_reference(&request.component));
            return ActionResponse::default();
        };
        let targets = match self
            .tree
            .get(id)
            .and_then(|node| component::action_targets(node, &request.action, &request.args))
        {
            Some(targets) => targets,
            None => {
                debug!(
                    component = %request.component,
                    action = %request.action,
                    "action rejected"
                );
                return ActionResponse::default();
            }
        };

        let affected =
            dispatch::apply_action(targets, &mut self.graph, &self.tree, &mut self.warnings);
        self.settle_composites();

        // Everything downstream of the written variables may now read
        // differently; answer with their owners' snapshots.
        let reached = self.graph.dependents_transitive(&affected);
        let mut owners: Vec<ComponentId> = Vec::new();
        for var in reached {
            if let Some(owner) = self.graph.get(var).map(|v| v.owner) {
                if !owners.contains(&owner) {
                    owners.push(owner);
                }
            }
        }

        let mut components = IndexMap::new();
        for owner in owners {
            let Some(name) = self.tree.get(owner).map(|n| n.name.clone()) else {
                continue;
            };
            if let Some(snapshot) = self.snapshot_component(owner) {
                components.insert(name, snapshot);
            }
        }
        components.sort_keys();
        ActionResponse { components }
    }

    /// Freshen and snapshot the whole document.
    pub fn render_snapshot(&mut self) -> Snapshot {
        let ids: Vec<ComponentId> = self.tree.ids();
        let mut components = IndexMap::new();
        for id in ids {
            if !self.is_rendered(id) {
                continue;
            }
            let Some(name) = self.tree.get(id).map(|n| n.name.clone()) else {
                continue;
            };
            if let Some(snapshot) = self.snapshot_component(id) {
                components.insert(name, snapshot);
            }
        }
        components.sort_keys();
        Snapshot { components }
    }

    /// Freshen and snapshot one component by full name.
    pub fn component_snapshot(&mut self, name: &str) -> Option<ComponentSnapshot> {
        let id = self.tree.by_name(name)?;
        self.snapshot_component(id)
    }

    /// Diagnostics accumulated so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// The variant this document was built for.
    pub fn variant_index(&self) -> u64 {
        self.sampler.variant_index()
    }

    /// The root component of the live tree.
    pub fn root(&self) -> ComponentId {
        self.root
    }

    // ------------------------------------------------------------------
    // Build
    // ------------------------------------------------------------------

    fn create_node(
        &mut self,
        doc: &DocumentNode,
        parent: Option<ComponentId>,
        parent_name: Option<&str>,
        created: &mut Vec<ComponentId>,
    ) -> Result<ComponentId, CoreError> {
        let local = match &doc.name {
            Some(name) => name.clone(),
            None => {
                self.anon_counter += 1;
                format!("_{}{}", doc.component_type, self.anon_counter)
            }
        };
        let name = match parent_name {
            Some(parent_name) => format!("{parent_name}/{local}"),
            None => local,
        };

        let before = self.warnings.len();
        let id = component::create_component(
            &doc.component_type,
            &name,
            doc.attributes.clone(),
            parent,
            &mut self.tree,
            &mut self.graph,
            &self.sampler,
            &mut self.warnings,
        )?;
        if let Some(position) = doc.position {
            for warning in &mut self.warnings[before..] {
                if warning.position.is_none() {
                    warning.position = Some(position);
                }
            }
        }
        created.push(id);

        for child in &doc.children {
            self.create_node(child, Some(id), Some(&name), created)?;
        }
        Ok(id)
    }

    /// Re-run composite expansion until nothing changes (bounded).
    fn settle_composites(&mut self) {
        let Core {
            tree,
            graph,
            expander,
            sampler,
            composites,
            warnings,
            ..
        } = self;
        for _ in 0..MAX_SETTLE_ROUNDS {
            let mut changed = false;
            for spec in composites.iter() {
                let (_, expanded) = expander.expand(spec, tree, graph, sampler, warnings);
                changed |= expanded;
            }
            if !changed {
                return;
            }
        }
        warnings.push(Warning::structural_mismatch(
            "composite expansion did not settle",
        ));
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Composites and repeat templates do not render; their replacements
    /// do.
    fn is_rendered(&self, id: ComponentId) -> bool {
        let Some(node) = self.tree.get(id) else {
            return false;
        };
        if component::is_composite(&node.component_type) {
            return false;
        }
        if let Some(parent) = node.parent.and_then(|p| self.tree.get(p)) {
            if parent.component_type == "repeat"
                && node.name.starts_with(&format!("{}/", parent.name))
            {
                return false;
            }
        }
        true
    }

    fn snapshot_component(&mut self, id: ComponentId) -> Option<ComponentSnapshot> {
        let (component_type, vars): (String, Vec<(String, crate::graph::VarId)>) = {
            let node = self.tree.get(id)?;
            (
                node.component_type.clone(),
                node.variables
                    .iter()
                    .map(|(name, var)| (name.clone(), *var))
                    .collect(),
            )
        };
        let mut state_values = IndexMap::new();
        for (name, var) in vars {
            let value = self.graph.get_value(var, &self.tree, &mut self.warnings);
            state_values.insert(name, value);
        }
        Some(ComponentSnapshot {
            component_type,
            state_values,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
