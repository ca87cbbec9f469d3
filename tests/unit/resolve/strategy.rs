use super::*;
use crate::surface::memory::{MemorySurface, NodeSpec};

fn resolver() -> Resolver {
    Resolver::from_opts(&ResolveOpts::default()).unwrap()
}

fn card(id: &str, left: f64) -> NodeSpec {
    NodeSpec::new("div")
        .at(left, 0.0)
        .size(100.0, 120.0)
        .child(
            NodeSpec::new("article")
                .attr("data-testid", &format!("card-{id}"))
                .child(NodeSpec::new("span").id(id)),
        )
}

#[test]
fn precedence_is_fixed() {
    let names: Vec<_> = resolver().strategies().iter().map(|s| s.name()).collect();
    assert_eq!(
        names,
        ["content_id", "list_key", "positioned_item", "structural", "self"]
    );
}

#[test]
fn content_id_ancestor_wins_over_positioned_wrapper() {
    let mut s = MemorySurface::new();
    let root = s.root();
    let wrapper = s
        .mount(
            root,
            &NodeSpec::new("div").at(0.0, 0.0).child(
                NodeSpec::new("article")
                    .attr("data-item-id", "urn:1")
                    .child(NodeSpec::new("span").id("t")),
            ),
        )
        .unwrap();
    let span = s.find_by_id("t").unwrap();
    let r = resolver();
    let article = s.children(wrapper)[0];
    assert_eq!(r.display_container(&s, span), article);
}

#[test]
fn keyed_option_lifts_to_presentation_wrapper() {
    let mut s = MemorySurface::new();
    let root = s.root();
    let list = s
        .mount(
            root,
            &NodeSpec::new("div").attr("role", "listbox").child(
                NodeSpec::new("div")
                    .attr("role", "presentation")
                    .at(0.0, 8.0)
                    .child(
                        NodeSpec::new("div")
                            .attr("role", "option")
                            .attr("data-key", "k1")
                            .child(NodeSpec::new("span").id("label")),
                    ),
            ),
        )
        .unwrap();
    let wrapper = s.children(list)[0];
    let label = s.find_by_id("label").unwrap();
    assert_eq!(resolver().display_container(&s, label), wrapper);
}

#[test]
fn positioned_wrapper_with_article_is_the_container() {
    let mut s = MemorySurface::new();
    let root = s.root();
    let grid = s
        .mount(
            root,
            &NodeSpec::new("div")
                .attr("role", "grid")
                .child(card("a", 0.0))
                .child(card("b", 120.0)),
        )
        .unwrap();
    let cells = s.children(grid);
    let span = s.find_by_id("b").unwrap();
    assert_eq!(resolver().display_container(&s, span), cells[1]);
}

#[test]
fn structural_fallback_then_self() {
    let mut s = MemorySurface::new();
    let root = s.root();
    let cell = s
        .mount(
            root,
            &NodeSpec::new("div")
                .attr("role", "gridcell")
                .child(NodeSpec::new("p").id("inner")),
        )
        .unwrap();
    let lone = s.mount(root, &NodeSpec::new("p").id("lone")).unwrap();
    let r = resolver();
    let inner = s.find_by_id("inner").unwrap();
    assert_eq!(r.display_container(&s, inner), cell);
    assert_eq!(r.display_container(&s, lone), lone);
}

#[test]
fn resolve_rule_dedups_and_ignores_invalid_rules() {
    let mut s = MemorySurface::new();
    let root = s.root();
    s.mount(
        root,
        &NodeSpec::new("div").attr("role", "grid").child(card("a", 0.0)),
    )
    .unwrap();
    let r = resolver();
    let hits = r.resolve_rule(&s, "article, #a");
    assert_eq!(hits.len(), 1);
    assert!(r.resolve_rule(&s, "div:hover").is_empty());
    assert!(r.resolve_rule(&s, "#missing").is_empty());
}

#[test]
fn bad_options_fail_to_build() {
    let mut opts = ResolveOpts::default();
    opts.structural_rules.push("div[".to_string());
    let err = Resolver::from_opts(&opts).unwrap_err();
    assert!(err.to_string().starts_with("config error:"));
}
