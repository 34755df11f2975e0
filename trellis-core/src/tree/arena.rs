//! Component Arena
//!
//! The single live document tree is held as one arena of components,
//! addressed by `ComponentId` and by full name. The arena is created when
//! a document is loaded, torn down wholesale on unload, and passed
//! explicitly to every subsystem — there is no ambient global tree.
//!
//! Holding nodes in an arena (rather than as owned pointers) is what makes
//! replacement reuse on composite re-expansion an index lookup instead of
//! object resurrection: a kept stable key simply keeps its arena slot.

use indexmap::IndexMap;

use crate::error::CoreError;

use super::node::{ComponentId, ComponentNode};

/// Arena of all live components plus the unique-name table.
pub struct ComponentArena {
    nodes: IndexMap<ComponentId, ComponentNode>,
    names: IndexMap<String, ComponentId>,
}

impl ComponentArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            names: IndexMap::new(),
        }
    }

    /// Insert a node, enforcing the unique-name invariant.
    ///
    /// A collision is an internal invariant violation and therefore fatal.
    pub fn insert(&mut self, node: ComponentNode) -> Result<ComponentId, CoreError> {
        if self.names.contains_key(&node.name) {
            return Err(CoreError::NameCollision {
                name: node.name.clone(),
            });
        }
        let id = node.id;
        self.names.insert(node.name.clone(), id);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Get a reference to a node.
    pub fn get(&self, id: ComponentId) -> Option<&ComponentNode> {
        self.nodes.get(&id)
    }

    /// Get a mutable reference to a node.
    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut ComponentNode> {
        self.nodes.get_mut(&id)
    }

    /// Look up a component by full name.
    pub fn by_name(&self, name: &str) -> Option<ComponentId> {
        self.names.get(name).copied()
    }

    /// Link `child` under `parent`, appending to the child list.
    pub fn add_child(&mut self, parent: ComponentId, child: ComponentId) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    /// Remove a component and its whole subtree.
    ///
    /// Returns every removed node so the caller can destroy the state
    /// variables they own. The subtree root is also unlinked from its
    /// parent's child list.
    pub fn remove_subtree(&mut self, root: ComponentId) -> Vec<ComponentNode> {
        // Unlink from parent first.
        if let Some(parent) = self.nodes.get(&root).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != root);
            }
        }

        let mut removed = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.shift_remove(&id) {
                self.names.shift_remove(&node.name);
                stack.extend(node.children.iter().copied());
                removed.push(node);
            }
        }
        removed
    }

    /// Number of live components.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all live components in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentNode> {
        self.nodes.values()
    }

    /// IDs of all live components in insertion order.
    pub fn ids(&self) -> Vec<ComponentId> {
        self.nodes.keys().copied().collect()
    }
}

impl Default for ComponentArena {
    fn default() -> Self {
        Self::new()
    }
}
