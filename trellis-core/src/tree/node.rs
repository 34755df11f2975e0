//! Component Nodes
//!
//! A `ComponentNode` is one typed entity in the live document tree: a
//! component type, a full (path-qualified) name, an attribute map, child
//! links, and the state variables it owns.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::graph::VarId;

/// Unique identifier for a component in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Generate a new unique component ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

/// A single component in the live tree.
///
/// `name` is the full slash-separated path (`"g/p"`), unique across the
/// whole tree. Children are exclusively owned by their parent; the only
/// exception is replacement-tree roots, whose parent is the composite that
/// expanded them.
#[derive(Debug)]
pub struct ComponentNode {
    pub id: ComponentId,
    pub component_type: String,
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<ComponentId>,
    pub parent: Option<ComponentId>,
    /// State variables owned by this component, by local variable name.
    pub variables: IndexMap<String, VarId>,
}

impl ComponentNode {
    /// Create a node with no children and no variables yet.
    pub fn new(
        component_type: impl Into<String>,
        name: impl Into<String>,
        attributes: IndexMap<String, String>,
    ) -> Self {
        Self {
            id: ComponentId::new(),
            component_type: component_type.into(),
            name: name.into(),
            attributes,
            children: Vec::new(),
            parent: None,
            variables: IndexMap::new(),
        }
    }

    /// Look up one of this component's state variables by local name.
    pub fn variable(&self, name: &str) -> Option<VarId> {
        self.variables.get(name).copied()
    }

    /// The local (last) segment of the full name.
    pub fn local_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}
