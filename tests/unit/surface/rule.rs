use super::*;
use crate::surface::memory::{MemorySurface, NodeSpec};

fn page() -> MemorySurface {
    let mut s = MemorySurface::new();
    let spec = NodeSpec::new("div")
        .attr("role", "listbox")
        .class("menu")
        .child(
            NodeSpec::new("div")
                .attr("role", "presentation")
                .child(
                    NodeSpec::new("div")
                        .attr("role", "option")
                        .attr("data-key", "k1")
                        .id("opt-1"),
                ),
        )
        .child(
            NodeSpec::new("article")
                .attr("data-testid", "card-42")
                .attr("data-item-id", "urn:aaa:1"),
        )
        .child(NodeSpec::new("article").attr("data-testid", "other"));
    let root = s.root();
    s.mount(root, &spec).unwrap();
    s
}

fn count(s: &MemorySurface, rule: &str) -> usize {
    let rule = MatchRule::parse(rule).unwrap();
    s.match_all(&rule, s.root()).len()
}

#[test]
fn simple_selectors_match() {
    let s = page();
    assert_eq!(count(&s, "article"), 2);
    assert_eq!(count(&s, "#opt-1"), 1);
    assert_eq!(count(&s, ".menu"), 1);
    assert_eq!(count(&s, "[role]"), 3);
    assert_eq!(count(&s, "[role=\"option\"]"), 1);
    assert_eq!(count(&s, "[role=option]"), 1);
    assert_eq!(count(&s, "*"), 5);
}

#[test]
fn attribute_operators_match() {
    let s = page();
    assert_eq!(count(&s, "article[data-testid^=\"card-\"]"), 1);
    assert_eq!(count(&s, "[data-item-id*='aaa']"), 1);
    assert_eq!(count(&s, "[data-item-id=\"urn:aaa:1\"]"), 1);
}

#[test]
fn combinators_and_lists_match() {
    let s = page();
    assert_eq!(count(&s, "[role=\"listbox\"] [role=\"option\"]"), 1);
    assert_eq!(count(&s, "[role=\"listbox\"] > [role=\"option\"]"), 0);
    assert_eq!(
        count(&s, "[role=\"listbox\"] > [role=\"presentation\"] > [role=\"option\"]"),
        1
    );
    assert_eq!(count(&s, "#opt-1, article"), 3);
}

#[test]
fn nth_of_type_counts_same_tag_siblings() {
    let s = page();
    assert_eq!(count(&s, "article:nth-of-type(1)"), 1);
    assert_eq!(count(&s, "article:nth-of-type(2)[data-testid=other]"), 1);
    assert_eq!(count(&s, "article:nth-of-type(3)"), 0);
}

#[test]
fn invalid_rules_are_rejected() {
    for bad in [
        "",
        "   ",
        "[data-key",
        "div >",
        "a,",
        "div:hover",
        "div:nth-of-type(0)",
        "[x~=y]",
        "div)",
        "\"quoted\"",
    ] {
        let err = MatchRule::parse(bad).unwrap_err();
        assert!(err.to_string().contains("match rule error:"), "{bad}");
    }
}

#[test]
fn escaped_values_round_trip() {
    let mut s = MemorySurface::new();
    let root = s.root();
    s.mount(root, &NodeSpec::new("div").attr("data-key", "a\"b\\c").id("x:y"))
        .unwrap();
    let rule = format!("[data-key=\"{}\"]", escape_attr_value("a\"b\\c"));
    assert_eq!(count(&s, &rule), 1);
    let rule = format!("#{}", escape_ident("x:y"));
    assert_eq!(count(&s, &rule), 1);
}

#[test]
fn display_keeps_source() {
    let rule = MatchRule::parse("#a ,  .b").unwrap();
    assert_eq!(rule.to_string(), "#a ,  .b");
    assert_eq!(rule.as_str(), "#a ,  .b");
}
