//! Name/Reference Resolver
//!
//! Resolves textual references to concrete (component, state variable,
//! index) targets. Pure lookup: resolution never mutates engine state,
//! though resolving an index expression may trigger a value-freshening
//! read on the index's own dependency chain (freshening is idempotent).
//!
//! # Reference grammar
//!
//! ```text
//! reference  := ['$'] path ['.' variable ['[' index ']']]
//! path       := segment ('/' segment)*
//! index      := integer literal (1-based) | reference
//! ```
//!
//! Paths resolve relative-first: a reference made from inside component
//! `g/inner` tries `g/inner/<path>`, then `g/<path>`, then `<path>`
//! globally. This is what lets a replacement subtree refer to its own
//! children while plain documents use short global names.

use tracing::trace;

use crate::error::Warning;
use crate::graph::DependencyGraph;
use crate::tree::{ComponentArena, ComponentId};

/// A fully resolved reference target.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub component: ComponentId,
    /// State variable name, when the reference names one.
    pub variable: Option<String>,
    /// Element index into a list-valued variable, 0-based internally
    /// (reference strings are 1-based).
    pub index: Option<usize>,
}

/// Resolve a reference string from an originating component.
///
/// On failure an `UnresolvedReference` warning is recorded and `None` is
/// returned; callers degrade (empty replacement set, invalid value).
pub fn resolve(
    reference: &str,
    origin: Option<ComponentId>,
    tree: &ComponentArena,
    graph: &mut DependencyGraph,
    warnings: &mut Vec<Warning>,
) -> Option<Target> {
    match resolve_inner(reference, origin, tree, graph, warnings) {
        Some(target) => Some(target),
        None => {
            warnings.push(Warning::unresolved_reference(reference));
            None
        }
    }
}

/// Resolve a reference that must name a component (no variable part).
pub fn resolve_component(
    reference: &str,
    origin: Option<ComponentId>,
    tree: &ComponentArena,
    graph: &mut DependencyGraph,
    warnings: &mut Vec<Warning>,
) -> Option<ComponentId> {
    let target = resolve(reference, origin, tree, graph, warnings)?;
    if target.variable.is_some() {
        warnings.push(Warning::unresolved_reference(reference));
        return None;
    }
    Some(target.component)
}

fn resolve_inner(
    reference: &str,
    origin: Option<ComponentId>,
    tree: &ComponentArena,
    graph: &mut DependencyGraph,
    warnings: &mut Vec<Warning>,
) -> Option<Target> {
    let trimmed = reference.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }

    // Split off a bracketed index expression, if any.
    let (head, index_expr) = match trimmed.strip_suffix(']') {
        Some(rest) => {
            let open = rest.find('[')?;
            (&rest[..open], Some(rest[open + 1..].trim()))
        }
        None => (trimmed, None),
    };

    // Split component path from variable name.
    let (path, variable) = match head.split_once('.') {
        Some((path, variable)) if !variable.is_empty() => (path, Some(variable)),
        Some(_) => return None,
        None => (head, None),
    };

    let component = lookup_path(path, origin, tree)?;
    trace!(reference, component = %tree.get(component).map(|n| n.name.as_str()).unwrap_or("?"), "resolved path");

    let variable = match variable {
        Some(name) => {
            // The variable must exist on the resolved component.
            tree.get(component)?.variable(name)?;
            Some(name.to_string())
        }
        None => None,
    };

    let index = match index_expr {
        None => None,
        Some(expr) => {
            if variable.is_none() {
                return None;
            }
            Some(resolve_index(expr, origin, tree, graph, warnings)?)
        }
    };

    Some(Target {
        component,
        variable,
        index,
    })
}

/// Resolve a component path against the origin's scope chain, then
/// globally.
fn lookup_path(
    path: &str,
    origin: Option<ComponentId>,
    tree: &ComponentArena,
) -> Option<ComponentId> {
    if let Some(origin_name) = origin.and_then(|id| tree.get(id)).map(|n| n.name.as_str()) {
        let mut scope = origin_name;
        loop {
            if let Some(id) = tree.by_name(&format!("{scope}/{path}")) {
                return Some(id);
            }
            match scope.rfind('/') {
                Some(split) => scope = &scope[..split],
                None => break,
            }
        }
    }
    tree.by_name(path)
}

/// Resolve an index expression to a 0-based element index.
///
/// Literals are 1-based. A reference index is resolved and freshened
/// before resolution of the outer reference completes.
fn resolve_index(
    expr: &str,
    origin: Option<ComponentId>,
    tree: &ComponentArena,
    graph: &mut DependencyGraph,
    warnings: &mut Vec<Warning>,
) -> Option<usize> {
    if let Ok(literal) = expr.parse::<usize>() {
        return literal.checked_sub(1);
    }
    let target = resolve_inner(expr, origin, tree, graph, warnings)?;
    let variable = target.variable.as_deref()?;
    let var_id = tree.get(target.component)?.variable(variable)?;
    let value = graph.get_value(var_id, tree, warnings);
    let value = match target.index {
        Some(i) => value.list_element(i),
        None => value,
    };
    value.as_index().and_then(|i| i.checked_sub(1))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
