//! Composite Descriptors
//!
//! A composite component (`copy`, `collect`, `repeat`) does not render
//! itself; it is a recipe for a set of *replacement* components derived
//! from a source. The descriptor here is what the expansion engine
//! consumes: the source reference, the link mode, and any attribute
//! overrides to apply to the replacement roots.

use indexmap::IndexMap;

use crate::tree::{ComponentId, ComponentNode};

/// Attributes with engine meaning on composite nodes; everything else is
/// an override.
const RESERVED: &[&str] = &["source", "link", "componentType"];

/// Whether replacements track their source or snapshot it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Replacements shadow the source's variables: reads follow the
    /// source, writes route back to it.
    Linked,
    /// Replacements capture the source's values at expansion time and
    /// evolve independently afterwards.
    Unlinked,
}

/// Everything the expansion engine needs to know about one composite.
#[derive(Clone)]
pub struct CompositeSpec {
    pub composite: ComponentId,
    /// Reference string naming the source component.
    pub source: String,
    /// Attribute overrides applied to replacement roots; overridden
    /// variables are never shadowed or snapshotted.
    pub overrides: IndexMap<String, String>,
    pub mode: LinkMode,
}

impl CompositeSpec {
    /// Read the descriptor off a composite node. `None` for
    /// non-composite types or a composite with no source attribute.
    pub fn from_node(node: &ComponentNode) -> Option<Self> {
        if !crate::component::is_composite(&node.component_type) {
            return None;
        }
        let source = node.attributes.get("source")?.clone();
        let mode = match node.attributes.get("link").map(String::as_str) {
            Some("false") => LinkMode::Unlinked,
            _ => LinkMode::Linked,
        };
        let overrides = node
            .attributes
            .iter()
            .filter(|(k, _)| !RESERVED.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Self {
            composite: node.id,
            source,
            overrides,
            mode,
        })
    }
}

/// Identity of one replacement within its composite, stable across
/// re-expansions. Replacements whose key survives a resize keep their
/// components (and therefore their accumulated state).
pub type StableKey = String;

/// The ordered replacements a composite currently stands for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplacementSet {
    pub elements: Vec<(StableKey, ComponentId)>,
}

impl ReplacementSet {
    /// Replacement root components, in document order.
    pub fn roots(&self) -> Vec<ComponentId> {
        self.elements.iter().map(|(_, id)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(component_type: &str, attrs: &[(&str, &str)]) -> ComponentNode {
        ComponentNode::new(
            component_type,
            "c",
            attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn linked_by_default() {
        let spec = CompositeSpec::from_node(&node("copy", &[("source", "p")])).expect("spec");
        assert_eq!(spec.mode, LinkMode::Linked);
        assert_eq!(spec.source, "p");
        assert!(spec.overrides.is_empty());
    }

    #[test]
    fn link_false_means_unlinked() {
        let spec = CompositeSpec::from_node(&node("copy", &[("source", "p"), ("link", "false")]))
            .expect("spec");
        assert_eq!(spec.mode, LinkMode::Unlinked);
    }

    #[test]
    fn reserved_attributes_are_not_overrides() {
        let spec = CompositeSpec::from_node(&node(
            "collect",
            &[
                ("source", "g"),
                ("componentType", "point"),
                ("link", "false"),
                ("x", "9"),
            ],
        ))
        .expect("spec");
        assert_eq!(spec.overrides.len(), 1);
        assert_eq!(spec.overrides.get("x").map(String::as_str), Some("9"));
    }

    #[test]
    fn non_composites_have_no_spec() {
        assert!(CompositeSpec::from_node(&node("point", &[("source", "p")])).is_none());
        assert!(CompositeSpec::from_node(&node("copy", &[])).is_none());
    }
}
