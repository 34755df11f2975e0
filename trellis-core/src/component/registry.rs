//! Built-in Component Types
//!
//! The registry knows, for each component type, which state variables a
//! fresh instance carries, how they are defined, and which actions target
//! which variables. Components are created in two steps:
//!
//! 1. `create_component` — insert the node and its locally-definable
//!    variables (essential values from attributes, derived values over the
//!    component's own variables).
//! 2. `link_component` — wire variables that reference *other* components
//!    (a picker's dynamic dependency on its source's items). Run after the
//!    whole tree exists, so document order does not matter.
//!
//! Malformed attribute values warn (`InvalidAttribute`) and fall back to
//! the type's default; unknown component types build as bare containers
//! with a warning. Neither aborts the document.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{CoreError, Warning};
use crate::graph::{
    Definition, DependencyGraph, DependencySource, InverseResult, StateVariable, VarId,
};
use crate::resolver;
use crate::tree::{ComponentArena, ComponentId, ComponentNode};
use crate::value::StateValue;
use crate::variant::VariantSampler;

/// Composite component types are expanded by the composite engine, not
/// rendered directly.
pub fn is_composite(component_type: &str) -> bool {
    matches!(component_type, "copy" | "collect" | "repeat")
}

/// Container types with no state variables of their own.
fn is_container(component_type: &str) -> bool {
    matches!(component_type, "group" | "document")
}

/// Create a component node with its locally-definable state variables.
pub fn create_component(
    component_type: &str,
    name: &str,
    attributes: IndexMap<String, String>,
    parent: Option<ComponentId>,
    tree: &mut ComponentArena,
    graph: &mut DependencyGraph,
    sampler: &VariantSampler,
    warnings: &mut Vec<Warning>,
) -> Result<ComponentId, CoreError> {
    let node = ComponentNode::new(component_type, name, attributes);
    let id = tree.insert(node)?;
    if let Some(parent) = parent {
        tree.add_child(parent, id);
    }

    match component_type {
        "number" => {
            let value = number_attr(tree, id, "value", 0.0, warnings);
            add_var(
                tree,
                graph,
                id,
                StateVariable::essential(id, "value", StateValue::Number(value)),
            );
        }
        "text" => {
            let value = text_attr(tree, id, "value");
            add_var(
                tree,
                graph,
                id,
                StateVariable::essential(id, "value", StateValue::Text(value)),
            );
        }
        "point" => {
            let x = number_attr(tree, id, "x", 0.0, warnings);
            let y = number_attr(tree, id, "y", 0.0, warnings);
            add_var(
                tree,
                graph,
                id,
                StateVariable::essential(id, "x", StateValue::Number(x)),
            );
            add_var(
                tree,
                graph,
                id,
                StateVariable::essential(id, "y", StateValue::Number(y)),
            );
            add_var(tree, graph, id, coords_variable(id));
        }
        "sequence" => {
            let from = number_attr(tree, id, "from", 1.0, warnings);
            let length = number_attr(tree, id, "length", 0.0, warnings);
            add_var(
                tree,
                graph,
                id,
                StateVariable::essential(id, "from", StateValue::Number(from)),
            );
            add_var(
                tree,
                graph,
                id,
                StateVariable::essential(id, "length", StateValue::Number(length)),
            );
            add_var(tree, graph, id, items_variable(id));
        }
        "sample" => {
            let low = number_attr(tree, id, "low", 0.0, warnings);
            let high = number_attr(tree, id, "high", 1.0, warnings);
            // Deterministic draw keyed by the full name, which embeds the
            // replacement stable key when inside a composite.
            let draw = sampler.sample_range(name, low, high);
            add_var(
                tree,
                graph,
                id,
                StateVariable::essential(id, "value", StateValue::Number(draw)),
            );
        }
        "picker" => {
            let choice = number_attr(tree, id, "choice", 1.0, warnings);
            add_var(
                tree,
                graph,
                id,
                StateVariable::essential(id, "choice", StateValue::Number(choice)),
            );
            // Placeholder until link_component wires the source.
            add_var(
                tree,
                graph,
                id,
                StateVariable::computed(
                    id,
                    "value",
                    Definition::computed(Vec::new(), |_| StateValue::Invalid),
                ),
            );
        }
        t if is_container(t) || is_composite(t) => {}
        other => {
            warnings.push(Warning::structural_mismatch(format!(
                "unknown component type `{other}` for `{name}`; treating as container"
            )));
        }
    }

    debug!(component = name, component_type, "created component");
    Ok(id)
}

/// Wire cross-component variable definitions. Run once the whole tree
/// exists.
pub fn link_component(
    id: ComponentId,
    tree: &ComponentArena,
    graph: &mut DependencyGraph,
    warnings: &mut Vec<Warning>,
) {
    let (component_type, source_ref, value_var) = match tree.get(id) {
        Some(node) => (
            node.component_type.clone(),
            node.attributes.get("source").cloned(),
            node.variable("value"),
        ),
        None => return,
    };

    if component_type == "picker" {
        let Some(value_var) = value_var else { return };
        let Some(source_ref) = source_ref else {
            warnings.push(Warning::structural_mismatch(format!(
                "picker `{}` has no source attribute",
                tree.get(id).map(|n| n.name.as_str()).unwrap_or("?")
            )));
            return;
        };
        let Some(source) = resolver::resolve_component(&source_ref, Some(id), tree, graph, warnings)
        else {
            return;
        };

        let definition = Definition::dynamic(
            vec![DependencySource::variable(id, "choice")],
            move |determinants| match determinants.first().and_then(|v| v.as_index()) {
                Some(choice) => vec![DependencySource::variable_element(
                    source,
                    "items",
                    choice - 1,
                )],
                None => Vec::new(),
            },
            |inputs| inputs.first().cloned().unwrap_or(StateValue::Invalid),
        );
        graph.replace_definition(value_var, definition, None);
    }
}

/// Resolve an action name to its target (variable, requested value)
/// pairs. `None` means the action is rejected for this component.
pub fn action_targets(
    node: &ComponentNode,
    action: &str,
    args: &IndexMap<String, StateValue>,
) -> Option<Vec<(VarId, StateValue)>> {
    match (node.component_type.as_str(), action) {
        // A point move is a single atomic batch over both coordinates.
        ("point", "movePoint") => Some(vec![
            (node.variable("x")?, args.get("x")?.clone()),
            (node.variable("y")?, args.get("y")?.clone()),
        ]),
        ("sequence", "setLength") => {
            Some(vec![(node.variable("length")?, args.get("length")?.clone())])
        }
        ("sequence", "setFrom") => {
            Some(vec![(node.variable("from")?, args.get("from")?.clone())])
        }
        ("picker", "choose") => {
            Some(vec![(node.variable("choice")?, args.get("choice")?.clone())])
        }
        (_, "updateValue") => Some(vec![(node.variable("value")?, args.get("value")?.clone())]),
        (_, "setStateVariable") => {
            let name = args.get("name")?.as_text()?;
            Some(vec![(node.variable(name)?, args.get("value")?.clone())])
        }
        _ => None,
    }
}

// ------------------------------------------------------------------
// Variable builders
// ------------------------------------------------------------------

/// `coords` = [x, y], with an exact inverse distributing a requested
/// pair back onto x and y.
fn coords_variable(id: ComponentId) -> StateVariable {
    StateVariable::computed(
        id,
        "coords",
        Definition::computed(
            vec![
                DependencySource::variable(id, "x"),
                DependencySource::variable(id, "y"),
            ],
            |inputs| match inputs {
                [x, y] => StateValue::List(vec![x.clone(), y.clone()]),
                _ => StateValue::Invalid,
            },
        ),
    )
    .with_inverse(std::sync::Arc::new(|requested, _inputs| match requested {
        StateValue::List(items) if items.len() == 2 => InverseResult::Set(vec![
            (0, items[0].clone()),
            (1, items[1].clone()),
        ]),
        _ => InverseResult::Rejected,
    }))
}

/// `items` = the arithmetic progression `from, from+1, ...` of `length`
/// terms.
fn items_variable(id: ComponentId) -> StateVariable {
    StateVariable::computed(
        id,
        "items",
        Definition::computed(
            vec![
                DependencySource::variable(id, "from"),
                DependencySource::variable(id, "length"),
            ],
            |inputs| {
                let from = inputs.first().and_then(|v| v.as_number());
                let length = inputs.get(1).and_then(|v| v.as_number());
                match (from, length) {
                    (Some(from), Some(length)) if length >= 0.0 && length.fract() == 0.0 => {
                        let count = length as usize;
                        StateValue::List(
                            (0..count)
                                .map(|i| StateValue::Number(from + i as f64))
                                .collect(),
                        )
                    }
                    _ => StateValue::Invalid,
                }
            },
        ),
    )
}

fn add_var(
    tree: &mut ComponentArena,
    graph: &mut DependencyGraph,
    owner: ComponentId,
    var: StateVariable,
) -> VarId {
    let name = var.name.clone();
    let id = graph.add_variable(var);
    if let Some(node) = tree.get_mut(owner) {
        node.variables.insert(name, id);
    }
    id
}

fn number_attr(
    tree: &ComponentArena,
    id: ComponentId,
    attribute: &str,
    default: f64,
    warnings: &mut Vec<Warning>,
) -> f64 {
    let Some(node) = tree.get(id) else {
        return default;
    };
    match node.attributes.get(attribute) {
        None => default,
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                warnings.push(Warning::invalid_attribute(&node.name, attribute, raw));
                default
            }
        },
    }
}

fn text_attr(tree: &ComponentArena, id: ComponentId, attribute: &str) -> String {
    tree.get(id)
        .and_then(|n| n.attributes.get(attribute))
        .cloned()
        .unwrap_or_default()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ComponentArena, DependencyGraph, VariantSampler, Vec<Warning>) {
        (
            ComponentArena::new(),
            DependencyGraph::new(),
            VariantSampler::new(1),
            Vec::new(),
        )
    }

    fn attrs(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn point_exposes_coords_with_inverse() {
        let (mut tree, mut graph, sampler, mut warnings) = setup();
        let p = create_component(
            "point",
            "p",
            attrs(&[("x", "1"), ("y", "2")]),
            None,
            &mut tree,
            &mut graph,
            &sampler,
            &mut warnings,
        )
        .expect("create");

        let coords = tree.get(p).and_then(|n| n.variable("coords")).expect("coords");
        assert_eq!(
            graph.get_value(coords, &tree, &mut warnings),
            StateValue::List(vec![StateValue::Number(1.0), StateValue::Number(2.0)])
        );
        assert!(graph.get(coords).and_then(|v| v.inverse.clone()).is_some());
    }

    #[test]
    fn malformed_attribute_warns_and_defaults() {
        let (mut tree, mut graph, sampler, mut warnings) = setup();
        let p = create_component(
            "point",
            "p",
            attrs(&[("x", "abc")]),
            None,
            &mut tree,
            &mut graph,
            &sampler,
            &mut warnings,
        )
        .expect("create");

        let x = tree.get(p).and_then(|n| n.variable("x")).expect("x");
        assert_eq!(graph.get_value(x, &tree, &mut warnings), StateValue::Number(0.0));
        assert!(warnings.iter().any(|w| w.message.contains("invalid value")));
    }

    #[test]
    fn sequence_items_follow_from_and_length() {
        let (mut tree, mut graph, sampler, mut warnings) = setup();
        let seq = create_component(
            "sequence",
            "seq",
            attrs(&[("from", "3"), ("length", "3")]),
            None,
            &mut tree,
            &mut graph,
            &sampler,
            &mut warnings,
        )
        .expect("create");

        let items = tree.get(seq).and_then(|n| n.variable("items")).expect("items");
        assert_eq!(
            graph.get_value(items, &tree, &mut warnings),
            StateValue::List(vec![
                StateValue::Number(3.0),
                StateValue::Number(4.0),
                StateValue::Number(5.0),
            ])
        );
    }

    #[test]
    fn picker_tracks_its_choice_dynamically() {
        let (mut tree, mut graph, sampler, mut warnings) = setup();
        create_component(
            "sequence",
            "seq",
            attrs(&[("from", "10"), ("length", "3")]),
            None,
            &mut tree,
            &mut graph,
            &sampler,
            &mut warnings,
        )
        .expect("seq");
        let picker = create_component(
            "picker",
            "pick",
            attrs(&[("source", "seq"), ("choice", "2")]),
            None,
            &mut tree,
            &mut graph,
            &sampler,
            &mut warnings,
        )
        .expect("picker");
        link_component(picker, &tree, &mut graph, &mut warnings);

        let value = tree.get(picker).and_then(|n| n.variable("value")).expect("value");
        assert_eq!(
            graph.get_value(value, &tree, &mut warnings),
            StateValue::Number(11.0)
        );

        let choice = tree.get(picker).and_then(|n| n.variable("choice")).expect("choice");
        graph.set_essential(choice, StateValue::Number(3.0));
        assert_eq!(
            graph.get_value(value, &tree, &mut warnings),
            StateValue::Number(12.0)
        );
    }

    #[test]
    fn sample_draw_is_deterministic_per_name() {
        let (mut tree, mut graph, sampler, mut warnings) = setup();
        let s = create_component(
            "sample",
            "s",
            attrs(&[("low", "0"), ("high", "10")]),
            None,
            &mut tree,
            &mut graph,
            &sampler,
            &mut warnings,
        )
        .expect("sample");
        let value = tree.get(s).and_then(|n| n.variable("value")).expect("value");
        let drawn = graph.get_value(value, &tree, &mut warnings);
        assert_eq!(
            drawn.as_number(),
            Some(sampler.sample_range("s", 0.0, 10.0))
        );
    }

    #[test]
    fn unknown_type_warns_but_builds() {
        let (mut tree, mut graph, sampler, mut warnings) = setup();
        assert!(create_component(
            "mystery",
            "m",
            IndexMap::new(),
            None,
            &mut tree,
            &mut graph,
            &sampler,
            &mut warnings,
        )
        .is_ok());
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("unknown component type")));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let (mut tree, mut graph, sampler, mut warnings) = setup();
        let p = create_component(
            "point",
            "p",
            IndexMap::new(),
            None,
            &mut tree,
            &mut graph,
            &sampler,
            &mut warnings,
        )
        .expect("create");
        let node = tree.get(p).expect("node");
        assert!(action_targets(node, "teleport", &IndexMap::new()).is_none());
    }
}
