//! End-to-end scenarios over the public API: document build, action
//! dispatch, composite expansion, and the JSON session boundary.

use indexmap::IndexMap;

use trellis_core::dispatch::ActionRequest;
use trellis_core::document::{Core, DocumentNode};
use trellis_core::value::StateValue;
use trellis_core::{Response, Session};

fn node(component_type: &str, name: &str, attrs: &[(&str, &str)]) -> DocumentNode {
    DocumentNode {
        component_type: component_type.to_string(),
        name: Some(name.to_string()),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        children: Vec::new(),
        position: None,
    }
}

fn with_children(mut parent: DocumentNode, children: Vec<DocumentNode>) -> DocumentNode {
    parent.children = children;
    parent
}

fn doc(children: Vec<DocumentNode>) -> DocumentNode {
    with_children(node("document", "doc", &[]), children)
}

fn action(component: &str, action: &str, args: &[(&str, StateValue)]) -> ActionRequest {
    ActionRequest {
        component: component.to_string(),
        action: action.to_string(),
        args: args
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    }
}

fn number(core: &mut Core, component: &str, variable: &str) -> f64 {
    core.component_snapshot(component)
        .and_then(|s| s.state_values.get(variable).cloned())
        .and_then(|v| v.as_number())
        .unwrap_or_else(|| panic!("expected number at {component}.{variable}"))
}

#[test]
fn snapshots_are_idempotent() {
    let mut core = Core::build(
        &doc(vec![
            node("point", "p", &[("x", "1"), ("y", "2")]),
            node("copy", "c", &[("source", "p")]),
        ]),
        1,
    )
    .expect("build");

    let first = core.render_snapshot();
    let second = core.render_snapshot();
    assert_eq!(first, second);
}

#[test]
fn move_point_round_trips_through_coords() {
    let mut core = Core::build(&doc(vec![node("point", "p", &[("x", "1"), ("y", "2")])]), 1)
        .expect("build");

    core.handle_action(&action(
        "doc/p",
        "movePoint",
        &[
            ("x", StateValue::Number(3.0)),
            ("y", StateValue::Number(4.0)),
        ],
    ));

    let snapshot = core.component_snapshot("doc/p").expect("snapshot");
    assert_eq!(
        snapshot.state_values.get("coords"),
        Some(&StateValue::List(vec![
            StateValue::Number(3.0),
            StateValue::Number(4.0),
        ]))
    );
}

#[test]
fn linked_and_unlinked_copies_diverge_correctly() {
    // g2 is a linked copy of p; g3 is an unlinked copy of g2 taken at
    // build time. Moving p must move g2's replacement but not g3's.
    let mut core = Core::build(
        &doc(vec![
            node("point", "p", &[("x", "1"), ("y", "2")]),
            node("copy", "g2", &[("source", "p")]),
            node("copy", "g3", &[("source", "g2"), ("link", "false")]),
        ]),
        1,
    )
    .expect("build");

    assert_eq!(number(&mut core, "doc/g2:p", "x"), 1.0);
    assert_eq!(number(&mut core, "doc/g3:g2/g2:p", "x"), 1.0);

    core.handle_action(&action(
        "doc/p",
        "movePoint",
        &[
            ("x", StateValue::Number(3.0)),
            ("y", StateValue::Number(4.0)),
        ],
    ));

    assert_eq!(number(&mut core, "doc/g2:p", "x"), 3.0);
    assert_eq!(number(&mut core, "doc/g3:g2/g2:p", "x"), 1.0);
}

#[test]
fn writes_on_a_linked_replacement_route_back_to_the_source() {
    let mut core = Core::build(
        &doc(vec![
            node("point", "p", &[("x", "1"), ("y", "2")]),
            node("copy", "c", &[("source", "p")]),
        ]),
        1,
    )
    .expect("build");

    core.handle_action(&action(
        "doc/c:p",
        "movePoint",
        &[
            ("x", StateValue::Number(8.0)),
            ("y", StateValue::Number(9.0)),
        ],
    ));

    assert_eq!(number(&mut core, "doc/p", "x"), 8.0);
    assert_eq!(number(&mut core, "doc/c:p", "x"), 8.0);
}

#[test]
fn repeat_resize_preserves_edits_on_surviving_keys() {
    let mut core = Core::build(
        &doc(vec![
            node("sequence", "seq", &[("from", "10"), ("length", "2")]),
            with_children(
                node("repeat", "rep", &[("source", "seq"), ("link", "false")]),
                vec![node("number", "t", &[])],
            ),
        ]),
        1,
    )
    .expect("build");

    core.handle_action(&action(
        "doc/rep:1",
        "updateValue",
        &[("value", StateValue::Number(99.0))],
    ));
    assert_eq!(number(&mut core, "doc/rep:1", "value"), 99.0);

    // Grow 2 -> 4: kept keys untouched, new keys freshly bound.
    core.handle_action(&action("doc/seq", "setLength", &[("length", StateValue::Number(4.0))]));
    assert_eq!(number(&mut core, "doc/rep:1", "value"), 99.0);
    assert_eq!(number(&mut core, "doc/rep:4", "value"), 13.0);

    // Shrink 4 -> 2: the edit on key 1 still survives.
    core.handle_action(&action("doc/seq", "setLength", &[("length", StateValue::Number(2.0))]));
    assert_eq!(number(&mut core, "doc/rep:1", "value"), 99.0);
    assert!(core.component_snapshot("doc/rep:4").is_none());

    // Grow back 2 -> 5: keys 3..5 are rebuilt from scratch.
    core.handle_action(&action("doc/seq", "setLength", &[("length", StateValue::Number(5.0))]));
    assert_eq!(number(&mut core, "doc/rep:1", "value"), 99.0);
    assert_eq!(number(&mut core, "doc/rep:3", "value"), 12.0);
}

#[test]
fn picker_follows_choice_and_upstream_edits() {
    let mut core = Core::build(
        &doc(vec![
            node("sequence", "seq", &[("from", "100"), ("length", "5")]),
            node("picker", "pick", &[("source", "seq"), ("choice", "2")]),
        ]),
        1,
    )
    .expect("build");

    assert_eq!(number(&mut core, "doc/pick", "value"), 101.0);

    core.handle_action(&action("doc/pick", "choose", &[("choice", StateValue::Number(5.0))]));
    assert_eq!(number(&mut core, "doc/pick", "value"), 104.0);

    // The chosen item tracks upstream edits too.
    core.handle_action(&action("doc/seq", "setFrom", &[("from", StateValue::Number(0.0))]));
    assert_eq!(number(&mut core, "doc/pick", "value"), 4.0);
}

#[test]
fn sample_draws_are_stable_under_unrelated_growth() {
    let description = doc(vec![
        node("sequence", "seq", &[("from", "1"), ("length", "2")]),
        with_children(
            node("repeat", "rep", &[("source", "seq"), ("link", "false")]),
            vec![with_children(
                node("group", "g", &[]),
                vec![node("sample", "s", &[("low", "0"), ("high", "1")])],
            )],
        ),
    ]);
    let mut core = Core::build(&description, 7).expect("build");
    let before = number(&mut core, "doc/rep:1/s", "value");
    assert_ne!(before, number(&mut core, "doc/rep:2/s", "value"));

    // Growing the repeat must not reshuffle existing draws.
    core.handle_action(&action("doc/seq", "setLength", &[("length", StateValue::Number(6.0))]));
    assert_eq!(number(&mut core, "doc/rep:1/s", "value"), before);

    // And a rebuilt document on the same variant reproduces them.
    let mut rebuilt = Core::build(&description, 7).expect("rebuild");
    assert_eq!(number(&mut rebuilt, "doc/rep:1/s", "value"), before);
}

#[test]
fn collect_gathers_matching_children_across_the_group() {
    let mut core = Core::build(
        &doc(vec![
            with_children(
                node("group", "g", &[]),
                vec![
                    node("point", "a", &[("x", "1")]),
                    node("text", "label", &[("value", "ignore")]),
                    node("point", "b", &[("x", "2")]),
                ],
            ),
            node("collect", "pts", &[("source", "g"), ("componentType", "point")]),
        ]),
        1,
    )
    .expect("build");

    let snapshot = core.render_snapshot();
    assert!(snapshot.components.contains_key("doc/pts:a"));
    assert!(snapshot.components.contains_key("doc/pts:b"));
    assert!(!snapshot.components.contains_key("doc/pts:label"));

    // Linked by default: the collected points track their sources.
    core.handle_action(&action(
        "doc/g/a",
        "movePoint",
        &[
            ("x", StateValue::Number(5.0)),
            ("y", StateValue::Number(5.0)),
        ],
    ));
    assert_eq!(number(&mut core, "doc/pts:a", "x"), 5.0);
}

#[test]
fn unresolved_composite_source_degrades_with_a_warning() {
    let mut core = Core::build(&doc(vec![node("copy", "c", &[("source", "ghost")])]), 1)
        .expect("build");

    let snapshot = core.render_snapshot();
    assert!(!snapshot.components.keys().any(|k| k.starts_with("doc/c:")));
    assert!(core
        .warnings()
        .iter()
        .any(|w| w.message.contains("ghost")));
}

#[test]
fn actions_over_the_session_boundary() {
    let description = doc(vec![node("point", "p", &[("x", "1"), ("y", "2")])]);
    let session = Session::new(Core::build(&description, 1).expect("build"));

    let answer = session.process(
        r#"{"kind":"action","component":"doc/p","action":"movePoint",
            "args":{"x":{"type":"number","value":7},"y":{"type":"number","value":8}}}"#,
    );
    let response: Response = serde_json::from_str(&answer).expect("parse");
    let Response::Action(action) = response else {
        panic!("expected action response");
    };
    assert_eq!(
        action
            .components
            .get("doc/p")
            .and_then(|c| c.state_values.get("y")),
        Some(&StateValue::Number(8.0))
    );

    let answer = session.process(r#"{"kind":"snapshot","component":"doc/p"}"#);
    let Response::Snapshot(snapshot) = serde_json::from_str(&answer).expect("parse") else {
        panic!("expected snapshot response");
    };
    assert_eq!(
        snapshot
            .components
            .get("doc/p")
            .and_then(|c| c.state_values.get("x")),
        Some(&StateValue::Number(7.0))
    );
}

#[test]
fn warnings_accumulate_and_are_queryable() {
    let core = Core::build(
        &doc(vec![node("point", "p", &[("x", "not-a-number")])]),
        1,
    )
    .expect("build");
    let session = Session::new(core);

    let answer = session.process(r#"{"kind":"warnings"}"#);
    let Response::Warnings { warnings } = serde_json::from_str(&answer).expect("parse") else {
        panic!("expected warnings response");
    };
    assert!(warnings
        .iter()
        .any(|w| w.message.contains("not-a-number")));
}

#[test]
fn setting_state_by_name_works_generically() {
    let mut core = Core::build(&doc(vec![node("number", "n", &[("value", "1")])]), 1)
        .expect("build");

    let mut args: IndexMap<String, StateValue> = IndexMap::new();
    args.insert("name".to_string(), StateValue::Text("value".to_string()));
    args.insert("value".to_string(), StateValue::Number(42.0));
    core.handle_action(&ActionRequest {
        component: "doc/n".to_string(),
        action: "setStateVariable".to_string(),
        args,
    });
    assert_eq!(number(&mut core, "doc/n", "value"), 42.0);
}
