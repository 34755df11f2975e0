//! Composite Expansion
//!
//! Turns composite descriptors into replacement subtrees and keeps them
//! in sync as the document changes. Expansion is idempotent and diffed
//! by stable key:
//!
//! 1. Resolve the source reference (failure degrades to an empty
//!    replacement set with a warning).
//! 2. Enumerate the desired replacement units, each with a stable key
//!    (copy: the source's local name; collect: each collected child's
//!    local name; repeat: the decimal index).
//! 3. Keys that already have a replacement keep it untouched. New keys
//!    build a subtree; keys that disappeared destroy theirs, variables
//!    included.
//!
//! Linked replacements shadow the source's essential variables (identity
//! computation with an identity inverse, so writes route back). Unlinked
//! replacements snapshot the source's current values into their own
//! essentials and evolve independently. Derived variables are never
//! wired either way: they recompute from the replacement's own
//! variables.

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::component;
use crate::error::Warning;
use crate::graph::{Definition, DependencyGraph, VarId};
use crate::resolver;
use crate::tree::{ComponentArena, ComponentId};
use crate::variant::VariantSampler;

use super::spec::{CompositeSpec, LinkMode, ReplacementSet, StableKey};

/// Mirror recursion bound; a copy whose source contains the copy itself
/// stops here instead of looping.
const MAX_MIRROR_DEPTH: usize = 64;

/// How one replacement is built.
enum Unit {
    /// Mirror an existing component subtree.
    Mirror(ComponentId),
    /// Fresh instance of a repeat template, bound to one sequence item.
    Instance {
        template: ComponentId,
        sequence: ComponentId,
        index: usize,
    },
}

/// One desired replacement: its identity key, the local name its root
/// takes, and the build recipe. Key and local name usually coincide;
/// they differ when the key also encodes source shape.
struct Planned {
    key: StableKey,
    local: String,
    unit: Unit,
}

/// Owns the replacement sets of every composite in a document.
pub struct Expander {
    replacements: IndexMap<ComponentId, IndexMap<StableKey, ComponentId>>,
}

impl Expander {
    pub fn new() -> Self {
        Self {
            replacements: IndexMap::new(),
        }
    }

    /// The current replacement roots of a composite, in order.
    pub fn replacement_roots(&self, composite: ComponentId) -> Vec<ComponentId> {
        self.replacements
            .get(&composite)
            .map(|m| m.values().copied().collect())
            .unwrap_or_default()
    }

    /// A component's children with composites substituted by their
    /// replacement roots. Asking about a composite itself yields its
    /// replacement roots.
    pub fn effective_children(&self, id: ComponentId, tree: &ComponentArena) -> Vec<ComponentId> {
        let Some(node) = tree.get(id) else {
            return Vec::new();
        };
        if component::is_composite(&node.component_type) {
            return self.replacement_roots(id);
        }
        let mut out = Vec::new();
        for &child in &node.children {
            match tree.get(child) {
                Some(c) if component::is_composite(&c.component_type) => {
                    out.extend(self.replacement_roots(child));
                }
                Some(_) => out.push(child),
                None => {}
            }
        }
        out
    }

    /// Bring a composite's replacements in line with its current source.
    ///
    /// Returns the resulting set and whether anything was built or
    /// destroyed.
    pub fn expand(
        &mut self,
        spec: &CompositeSpec,
        tree: &mut ComponentArena,
        graph: &mut DependencyGraph,
        sampler: &VariantSampler,
        warnings: &mut Vec<Warning>,
    ) -> (ReplacementSet, bool) {
        let Some(composite_name) = tree.get(spec.composite).map(|n| n.name.clone()) else {
            return (ReplacementSet::default(), false);
        };

        let source =
            resolver::resolve_component(&spec.source, Some(spec.composite), tree, graph, warnings);
        let Some(source) = source else {
            let changed = self.destroy_all(spec.composite, tree, graph);
            return (ReplacementSet::default(), changed);
        };

        let units = self.desired_units(spec, source, &composite_name, tree, graph, warnings);

        let existing = self
            .replacements
            .shift_remove(&spec.composite)
            .unwrap_or_default();
        let mut changed = false;

        // Destroy first so a rebuilt key can reuse its name.
        let mut kept: IndexMap<StableKey, ComponentId> = IndexMap::new();
        for (key, id) in existing {
            if units.iter().any(|u| u.key == key) {
                kept.insert(key, id);
            } else {
                changed = true;
                destroy_subtree(id, tree, graph);
            }
        }

        let mut next: IndexMap<StableKey, ComponentId> = IndexMap::new();
        for Planned { key, local, unit } in units {
            if let Some(&reused) = kept.get(&key) {
                // Surviving key: the subtree is reused untouched, edits
                // and all.
                next.insert(key, reused);
                continue;
            }
            changed = true;
            let name = format!("{composite_name}:{local}");
            let built = match unit {
                Unit::Mirror(src) => self.mirror(
                    src,
                    &name,
                    Some(&spec.overrides),
                    Some(spec.mode),
                    spec.composite,
                    0,
                    tree,
                    graph,
                    sampler,
                    warnings,
                ),
                Unit::Instance {
                    template,
                    sequence,
                    index,
                } => self.instance(
                    template,
                    sequence,
                    index,
                    &name,
                    spec.mode,
                    spec.composite,
                    tree,
                    graph,
                    sampler,
                    warnings,
                ),
            };
            if let Some(id) = built {
                next.insert(key, id);
            }
        }

        if changed {
            debug!(composite = %composite_name, count = next.len(), "expanded composite");
        }

        let set = ReplacementSet {
            elements: next.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        };
        self.replacements.insert(spec.composite, next);
        (set, changed)
    }

    /// Tear down every replacement of a composite.
    pub fn destroy_all(
        &mut self,
        composite: ComponentId,
        tree: &mut ComponentArena,
        graph: &mut DependencyGraph,
    ) -> bool {
        match self.replacements.shift_remove(&composite) {
            Some(existing) if !existing.is_empty() => {
                for (_, root) in existing {
                    destroy_subtree(root, tree, graph);
                }
                true
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Unit enumeration
    // ------------------------------------------------------------------

    fn desired_units(
        &self,
        spec: &CompositeSpec,
        source: ComponentId,
        composite_name: &str,
        tree: &ComponentArena,
        graph: &mut DependencyGraph,
        warnings: &mut Vec<Warning>,
    ) -> Vec<Planned> {
        let Some(composite_node) = tree.get(spec.composite) else {
            return Vec::new();
        };
        match composite_node.component_type.as_str() {
            "copy" => {
                let local = tree
                    .get(source)
                    .map(|n| n.local_name().to_string())
                    .unwrap_or_default();
                // A mirror of a composite must rebuild when the source's
                // replacement set reshapes, so the shape is part of the
                // identity key (but not of the name).
                let key = match self.replacements.get(&source) {
                    Some(keys) => {
                        let shape: Vec<&str> = keys.keys().map(String::as_str).collect();
                        format!("{local}[{}]", shape.join(","))
                    }
                    None => local.clone(),
                };
                vec![Planned {
                    key,
                    local,
                    unit: Unit::Mirror(source),
                }]
            }
            "collect" => {
                let filter = composite_node.attributes.get("componentType").cloned();
                self.effective_children(source, tree)
                    .into_iter()
                    .filter_map(|child| {
                        let node = tree.get(child)?;
                        if let Some(wanted) = &filter {
                            if &node.component_type != wanted {
                                return None;
                            }
                        }
                        let local = node.local_name().to_string();
                        Some(Planned {
                            key: local.clone(),
                            local,
                            unit: Unit::Mirror(child),
                        })
                    })
                    .collect()
            }
            "repeat" => {
                // The template is the composite's one plain child;
                // replacement roots are siblings but never start with the
                // composite's own path.
                let template = composite_node.children.iter().copied().find(|&c| {
                    tree.get(c)
                        .map(|n| n.name.starts_with(&format!("{composite_name}/")))
                        .unwrap_or(false)
                });
                let Some(template) = template else {
                    warnings.push(Warning::structural_mismatch(format!(
                        "repeat `{composite_name}` has no template child"
                    )));
                    return Vec::new();
                };

                let length = tree
                    .get(source)
                    .and_then(|n| n.variable("length"))
                    .map(|var| graph.get_value(var, tree, warnings));
                let count = match length.as_ref().and_then(|v| v.as_number()) {
                    Some(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
                    _ => {
                        warnings.push(Warning::structural_mismatch(format!(
                            "repeat `{composite_name}` source has no usable length"
                        )));
                        0
                    }
                };

                (1..=count)
                    .map(|i| Planned {
                        key: i.to_string(),
                        local: i.to_string(),
                        unit: Unit::Instance {
                            template,
                            sequence: source,
                            index: i - 1,
                        },
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Replacement construction
    // ------------------------------------------------------------------

    /// Build a replacement mirroring an existing component subtree.
    ///
    /// Overrides apply only at the root of the mirrored subtree; an
    /// overridden variable keeps its override value instead of being
    /// wired to the source. `wire: None` copies structure only, leaving
    /// every variable at its attribute-derived value (fresh template
    /// instantiation).
    #[allow(clippy::too_many_arguments)]
    fn mirror(
        &mut self,
        source: ComponentId,
        name: &str,
        overrides: Option<&IndexMap<String, String>>,
        wire: Option<LinkMode>,
        parent: ComponentId,
        depth: usize,
        tree: &mut ComponentArena,
        graph: &mut DependencyGraph,
        sampler: &VariantSampler,
        warnings: &mut Vec<Warning>,
    ) -> Option<ComponentId> {
        if depth > MAX_MIRROR_DEPTH {
            warnings.push(Warning::structural_mismatch(format!(
                "mirror recursion limit reached at `{name}`"
            )));
            return None;
        }
        let src_node = tree.get(source)?;
        let src_is_composite = component::is_composite(&src_node.component_type);

        // A mirror of a composite is a plain group over the composite's
        // current replacements.
        let component_type = if src_is_composite {
            "group".to_string()
        } else {
            src_node.component_type.clone()
        };
        let mut attributes = if src_is_composite {
            IndexMap::new()
        } else {
            src_node.attributes.clone()
        };
        if let Some(overrides) = overrides {
            for (k, v) in overrides {
                attributes.insert(k.clone(), v.clone());
            }
        }

        let id = match component::create_component(
            &component_type,
            name,
            attributes,
            Some(parent),
            tree,
            graph,
            sampler,
            warnings,
        ) {
            Ok(id) => id,
            Err(err) => {
                warnings.push(Warning::structural_mismatch(err.to_string()));
                return None;
            }
        };

        // Wire essentials to the source, except where an override pins
        // the value.
        if let Some(mode) = wire {
            let wired: SmallVec<[(String, VarId); 4]> = tree
                .get(id)
                .map(|n| {
                    n.variables
                        .iter()
                        .filter(|(var_name, var_id)| {
                            graph.get(**var_id).map(|v| v.is_essential()).unwrap_or(false)
                                && overrides
                                    .map(|ov| !ov.contains_key(*var_name))
                                    .unwrap_or(true)
                        })
                        .map(|(var_name, var_id)| (var_name.clone(), *var_id))
                        .collect()
                })
                .unwrap_or_default();
            for (var_name, var_id) in wired {
                let Some(source_var) = tree.get(source).and_then(|n| n.variable(&var_name))
                else {
                    continue;
                };
                match mode {
                    LinkMode::Linked => {
                        let (definition, inverse) = Definition::shadow(source, &var_name, None);
                        graph.replace_definition(var_id, definition, inverse);
                    }
                    LinkMode::Unlinked => {
                        // Snapshot through any shadow chain on the source
                        // side.
                        let snapshot = graph.get_value(source_var, tree, warnings);
                        graph.set_essential(var_id, snapshot);
                    }
                }
            }
        }

        let children = self.effective_children(source, tree);
        for child in children {
            let Some(local) = tree.get(child).map(|n| n.local_name().to_string()) else {
                continue;
            };
            let child_name = format!("{name}/{local}");
            self.mirror(
                child, &child_name, None, wire, id, depth + 1, tree, graph, sampler, warnings,
            );
        }

        component::link_component(id, tree, graph, warnings);
        Some(id)
    }

    /// Build one fresh repeat instance from the template, binding its
    /// `value` variable to the sequence item at `index`.
    #[allow(clippy::too_many_arguments)]
    fn instance(
        &mut self,
        template: ComponentId,
        sequence: ComponentId,
        index: usize,
        name: &str,
        mode: LinkMode,
        parent: ComponentId,
        tree: &mut ComponentArena,
        graph: &mut DependencyGraph,
        sampler: &VariantSampler,
        warnings: &mut Vec<Warning>,
    ) -> Option<ComponentId> {
        let t_node = tree.get(template)?;
        let component_type = t_node.component_type.clone();
        let attributes = t_node.attributes.clone();

        let id = match component::create_component(
            &component_type,
            name,
            attributes,
            Some(parent),
            tree,
            graph,
            sampler,
            warnings,
        ) {
            Ok(id) => id,
            Err(err) => {
                warnings.push(Warning::structural_mismatch(err.to_string()));
                return None;
            }
        };

        if let Some(value_var) = tree.get(id).and_then(|n| n.variable("value")) {
            match mode {
                LinkMode::Linked => {
                    // Element shadows carry no inverse; editing a linked
                    // instance's value is rejected upstream.
                    let (definition, _) = Definition::shadow(sequence, "items", Some(index));
                    graph.replace_definition(value_var, definition, None);
                }
                LinkMode::Unlinked => {
                    let is_essential = graph
                        .get(value_var)
                        .map(|v| v.is_essential())
                        .unwrap_or(false);
                    if is_essential {
                        if let Some(items) = tree.get(sequence).and_then(|n| n.variable("items")) {
                            let snapshot =
                                graph.get_value(items, tree, warnings).list_element(index);
                            if !snapshot.is_invalid() {
                                graph.set_essential(value_var, snapshot);
                            }
                        }
                    }
                }
            }
        }

        // Template children become fresh, unwired parts of the instance.
        let children = self.effective_children(template, tree);
        for child in children {
            let Some(local) = tree.get(child).map(|n| n.local_name().to_string()) else {
                continue;
            };
            let child_name = format!("{name}/{local}");
            self.mirror(
                child, &child_name, None, None, id, 0, tree, graph, sampler, warnings,
            );
        }

        component::link_component(id, tree, graph, warnings);
        Some(id)
    }
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove a replacement subtree and every state variable it owns.
fn destroy_subtree(root: ComponentId, tree: &mut ComponentArena, graph: &mut DependencyGraph) {
    for node in tree.remove_subtree(root) {
        for (_, var) in node.variables {
            graph.remove_variable(var);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
