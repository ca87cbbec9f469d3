//! Turning a user-picked element into a persistable match rule.

use crate::foundation::core::NodeId;
use crate::foundation::opts::ResolveOpts;
use crate::surface::Surface;
use crate::surface::rule::{MatchRule, escape_attr_value, escape_ident, nth_of_type};

/// Derive a rule that re-finds `node` (or its logical item) on a later render.
///
/// Precedence: a content-id ancestor, a list-key ancestor, the element id, then a child path of
/// `tag.class:nth-of-type(n)` segments below the document root. Returns `None` for detached nodes.
pub fn derive_match_rule<S: Surface + ?Sized>(
    surface: &S,
    node: NodeId,
    opts: &ResolveOpts,
) -> Option<String> {
    if !surface.is_attached(node) || node == surface.root() {
        return None;
    }
    let lineage: Vec<NodeId> = std::iter::successors(Some(node), |n| surface.parent(*n))
        .take_while(|n| *n != surface.root())
        .collect();

    for n in &lineage {
        for attr in &opts.content_id_attrs {
            if let Some(v) = surface.attribute(*n, attr).filter(|v| !v.is_empty()) {
                return Some(format!("[{attr}=\"{}\"]", escape_attr_value(&v)));
            }
        }
    }
    let key_attr = &opts.list_key_attr;
    if let Some(v) = lineage
        .iter()
        .find_map(|n| surface.attribute(*n, key_attr).filter(|v| !v.is_empty()))
    {
        return Some(format!("[{key_attr}=\"{}\"]", escape_attr_value(&v)));
    }
    if let Some(id) = surface.attribute(node, "id").filter(|v| !v.is_empty()) {
        return Some(format!("#{}", escape_ident(&id)));
    }

    let mut parts = Vec::with_capacity(lineage.len());
    for n in &lineage {
        let mut seg = surface.tag_name(*n)?;
        if let Some(classes) = surface.attribute(*n, "class") {
            for class in classes.split_whitespace() {
                seg.push('.');
                seg.push_str(&escape_ident(class));
            }
        }
        if same_tag_siblings(surface, *n) > 1 {
            let idx = nth_of_type(surface, *n)?;
            seg.push_str(&format!(":nth-of-type({idx})"));
        }
        parts.push(seg);
    }
    parts.reverse();
    Some(parts.join(" > "))
}

/// Nearest inclusive ancestor of `node` that a tag gesture may target.
pub fn taggable_target<S: Surface + ?Sized>(
    surface: &S,
    node: NodeId,
    taggable: &[MatchRule],
) -> Option<NodeId> {
    std::iter::successors(Some(node), |n| surface.parent(*n))
        .take_while(|n| *n != surface.root())
        .find(|n| taggable.iter().any(|r| r.matches(surface, *n)))
}

fn same_tag_siblings<S: Surface + ?Sized>(surface: &S, node: NodeId) -> usize {
    let (Some(parent), Some(tag)) = (surface.parent(node), surface.tag_name(node)) else {
        return 0;
    };
    surface
        .children(parent)
        .into_iter()
        .filter(|c| surface.tag_name(*c).as_deref() == Some(tag.as_str()))
        .count()
}

#[cfg(test)]
#[path = "../../tests/unit/resolve/derive.rs"]
mod tests;
