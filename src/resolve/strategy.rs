use std::collections::HashSet;

use crate::foundation::core::NodeId;
use crate::foundation::error::{TileError, TileResult};
use crate::foundation::opts::ResolveOpts;
use crate::surface::Surface;
use crate::surface::rule::MatchRule;

/// One way of lifting a matched node to its display container.
///
/// Strategies are tried in the order [`Resolver`] holds them; the first that yields a node wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// Nearest inclusive ancestor carrying any of these stable content-id attributes.
    ContentId(Vec<String>),
    /// Nearest inclusive ancestor carrying the list-key attribute, lifted to its positioned
    /// wrapper when the parent has `wrapper_role`.
    ListKey {
        /// Key attribute.
        attr: String,
        /// Role of the wrapper the host positions instead of the keyed node.
        wrapper_role: String,
    },
    /// Nearest positioned ancestor that contains a node matching the item marker.
    PositionedItem(MatchRule),
    /// Nearest ancestor matching one of the known structural rules, first rule first.
    Structural(Vec<MatchRule>),
    /// The matched node itself.
    SelfNode,
}

impl ResolveStrategy {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContentId(_) => "content_id",
            Self::ListKey { .. } => "list_key",
            Self::PositionedItem(_) => "positioned_item",
            Self::Structural(_) => "structural",
            Self::SelfNode => "self",
        }
    }

    /// The container this strategy picks for `node`, if it applies.
    pub fn apply<S: Surface + ?Sized>(&self, surface: &S, node: NodeId) -> Option<NodeId> {
        match self {
            Self::ContentId(attrs) => ancestors(surface, node).find(|n| {
                attrs
                    .iter()
                    .any(|a| surface.attribute(*n, a).is_some_and(|v| !v.is_empty()))
            }),
            Self::ListKey { attr, wrapper_role } => {
                let keyed = ancestors(surface, node)
                    .find(|n| surface.attribute(*n, attr).is_some_and(|v| !v.is_empty()))?;
                let wrapper = surface
                    .parent(keyed)
                    .filter(|p| surface.attribute(*p, "role").as_deref() == Some(wrapper_role));
                Some(wrapper.unwrap_or(keyed))
            }
            Self::PositionedItem(marker) => ancestors(surface, node)
                .take_while(|n| *n != surface.root())
                .find(|n| surface.is_positioned(*n) && has_descendant(surface, *n, marker)),
            Self::Structural(rules) => rules.iter().find_map(|r| surface.closest(node, r)),
            Self::SelfNode => Some(node),
        }
    }
}

/// Ordered resolution strategies plus the rules that make an element taggable.
#[derive(Clone, Debug)]
pub struct Resolver {
    strategies: Vec<ResolveStrategy>,
    taggable: Vec<MatchRule>,
    opts: ResolveOpts,
}

impl Resolver {
    /// Build the fixed precedence chain from options.
    pub fn from_opts(opts: &ResolveOpts) -> TileResult<Self> {
        let parse = |r: &String| {
            MatchRule::parse(r).map_err(|e| TileError::config(format!("resolve rule: {e}")))
        };
        let marker = parse(&opts.item_marker)?;
        let structural = opts
            .structural_rules
            .iter()
            .map(parse)
            .collect::<TileResult<Vec<_>>>()?;
        let taggable = opts
            .taggable_rules
            .iter()
            .map(parse)
            .collect::<TileResult<Vec<_>>>()?;
        let strategies = vec![
            ResolveStrategy::ContentId(opts.content_id_attrs.clone()),
            ResolveStrategy::ListKey {
                attr: opts.list_key_attr.clone(),
                wrapper_role: opts.wrapper_role.clone(),
            },
            ResolveStrategy::PositionedItem(marker),
            ResolveStrategy::Structural(structural),
            ResolveStrategy::SelfNode,
        ];
        Ok(Self {
            strategies,
            taggable,
            opts: opts.clone(),
        })
    }

    /// Strategies in precedence order.
    pub fn strategies(&self) -> &[ResolveStrategy] {
        &self.strategies
    }

    /// Options the resolver was built from.
    pub fn opts(&self) -> &ResolveOpts {
        &self.opts
    }

    /// Rules identifying taggable elements.
    pub fn taggable_rules(&self) -> &[MatchRule] {
        &self.taggable
    }

    /// Display container of a rendered node.
    pub fn display_container<S: Surface + ?Sized>(&self, surface: &S, node: NodeId) -> NodeId {
        for strategy in &self.strategies {
            if let Some(container) = strategy.apply(surface, node) {
                tracing::trace!(%node, %container, strategy = strategy.name(), "resolved container");
                return container;
            }
        }
        node
    }

    /// Containers of every node matching `rule`, de-duplicated, in document order of first match.
    ///
    /// An invalid rule matches nothing.
    pub fn resolve_rule<S: Surface + ?Sized>(&self, surface: &S, rule: &str) -> Vec<NodeId> {
        match MatchRule::parse(rule) {
            Ok(parsed) => self.resolve_parsed(surface, &parsed),
            Err(e) => {
                tracing::warn!(rule, error = %e, "ignoring invalid match rule");
                Vec::new()
            }
        }
    }

    /// [`Resolver::resolve_rule`] for an already parsed rule.
    pub fn resolve_parsed<S: Surface + ?Sized>(&self, surface: &S, rule: &MatchRule) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        surface
            .match_all(rule, surface.root())
            .into_iter()
            .map(|n| self.display_container(surface, n))
            .filter(|c| seen.insert(*c))
            .collect()
    }
}

fn ancestors<S: Surface + ?Sized>(surface: &S, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    std::iter::successors(Some(node), move |n| surface.parent(*n))
}

fn has_descendant<S: Surface + ?Sized>(surface: &S, scope: NodeId, rule: &MatchRule) -> bool {
    let mut stack = surface.children(scope);
    while let Some(n) = stack.pop() {
        if rule.matches(surface, n) {
            return true;
        }
        stack.extend(surface.children(n));
    }
    false
}

#[cfg(test)]
#[path = "../../tests/unit/resolve/strategy.rs"]
mod tests;
