use super::*;
use serde_json::json;

fn tile(id: &str, left: f64, total: usize) -> serde_json::Value {
    json!({
        "tag": "div",
        "attrs": { "id": id, "data-item-id": id },
        "positioned": true,
        "left": left,
        "top": 4.0,
        "width": 100.0,
        "height": 150.0,
        "children": [{ "tag": "article", "attrs": { "data-total": total.to_string() } }]
    })
}

fn late_mount() -> serde_json::Value {
    json!({
        "host": "library.example.com",
        "route": "/assets",
        "document": [{
            "tag": "div",
            "attrs": { "id": "g", "role": "grid" },
            "width": 400.0,
            "height": 170.0,
            "children": [tile("a", 8.0, 3)]
        }],
        "tags": [
            { "selector": "#a", "customer": "X" },
            { "matchRule": "#b", "customerId": "Y" }
        ],
        "filter": "X",
        "opts": {
            "collections": [{
                "name": "cards",
                "kind": "grid",
                "root": "[role=\"grid\"]",
                "item": "article",
                "expected_count_attr": "data-total"
            }]
        },
        "steps": [
            { "at_ms": 300, "do": "mount", "parent": "g", "node": tile("b", 118.0, 3) },
            { "at_ms": 300, "do": "mount", "parent": "g", "node": tile("c", 228.0, 3) }
        ]
    })
}

fn parse(value: serde_json::Value) -> Scenario {
    Scenario::from_reader(value.to_string().as_bytes()).unwrap()
}

#[test]
fn late_mount_replay_compacts_once_everything_is_there() {
    let report = parse(late_mount()).run().unwrap();
    assert_eq!(report.filter, "X");
    let a = report.node("a").unwrap();
    assert_eq!((a.left, a.top), (Some(8.0), Some(4.0)));
    let c = report.node("c").unwrap();
    assert_eq!((c.left, c.top), (Some(118.0), Some(4.0)));
    let b = report.node("b").unwrap();
    assert!(b.suppressed);
    assert_eq!(b.left, Some(-9999.0));
    assert_eq!(report.node("g").unwrap().height, Some(174.0));
    assert!(report.ended_at_ms >= 600);
}

#[test]
fn clearing_the_filter_restores_everything() {
    let mut value = late_mount();
    value["steps"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "at_ms": 5000, "do": "set_filter", "customer": "ALL" }));
    let report = parse(value).run().unwrap();
    assert_eq!(report.filter, "ALL");
    for (id, left) in [("a", 8.0), ("b", 118.0), ("c", 228.0)] {
        let n = report.node(id).unwrap();
        assert_eq!(n.left, Some(left), "{id}");
        assert!(!n.suppressed, "{id}");
    }
    assert_eq!(report.node("g").unwrap().height, Some(170.0));
}

#[test]
fn toggles_and_unmounts_replay_in_order() {
    let mut value = late_mount();
    let steps = value["steps"].as_array_mut().unwrap();
    steps.push(json!({ "at_ms": 3000, "do": "toggle", "rule": "#b", "customer": "X" }));
    steps.push(json!({ "at_ms": 4000, "do": "unmount", "id": "a" }));
    let report = parse(value).run().unwrap();
    assert!(report.node("a").is_none());
    let b = report.node("b").unwrap();
    assert!(!b.suppressed);
    assert_eq!(b.left, Some(118.0));
}

#[test]
fn unknown_fields_are_rejected() {
    let err = Scenario::from_reader(r#"{"hosts": "x"}"#.as_bytes()).unwrap_err();
    assert!(err.to_string().starts_with("serialization error:"));
}

#[test]
fn mounting_under_a_missing_parent_fails() {
    let scenario = Scenario {
        steps: vec![Step {
            at_ms: 10,
            action: Action::Mount {
                parent: Some("nope".to_string()),
                node: NodeSpec::new("div"),
            },
        }],
        ..Scenario::default()
    };
    let err = scenario.run().unwrap_err();
    assert!(err.to_string().starts_with("surface error:"));
}
