//! Visibility classification under the active filter.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::foundation::core::{FilterTarget, NodeId};
use crate::resolve::Resolver;
use crate::store::tags::TagSet;
use crate::surface::Surface;

/// Customers tagging one container, sorted and unique.
pub type CustomerList = SmallVec<[String; 2]>;

/// Which customers reach which mounted container, after resolving every tag record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagHits {
    by_container: BTreeMap<NodeId, CustomerList>,
}

impl TagHits {
    /// Resolve every record of `tags` against the live surface.
    #[tracing::instrument(skip_all, fields(records = tags.len()))]
    pub fn collect<S: Surface + ?Sized>(surface: &S, resolver: &Resolver, tags: &TagSet) -> Self {
        let mut hits = Self::default();
        for record in tags.iter() {
            for container in resolver.resolve_rule(surface, &record.match_rule) {
                hits.insert(container, &record.customer_id);
            }
        }
        tracing::debug!(containers = hits.by_container.len(), "collected tag hits");
        hits
    }

    /// Record that `customer` tags `container`.
    pub fn insert(&mut self, container: NodeId, customer: &str) {
        let list = self.by_container.entry(container).or_default();
        if let Err(pos) = list.binary_search_by(|c| c.as_str().cmp(customer)) {
            list.insert(pos, customer.to_string());
        }
    }

    /// Customers tagging `container` (empty when untagged).
    pub fn customers(&self, container: NodeId) -> &[String] {
        self.by_container
            .get(&container)
            .map(|l| l.as_slice())
            .unwrap_or(&[])
    }

    /// Whether any record reaches `container`.
    pub fn is_tagged(&self, container: NodeId) -> bool {
        self.by_container.contains_key(&container)
    }

    /// Every tagged container, in handle order.
    pub fn containers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.by_container.keys().copied()
    }

    /// Badge annotations: each tagged container with its customers.
    pub fn badges(&self) -> impl Iterator<Item = (NodeId, &[String])> + '_ {
        self.by_container.iter().map(|(n, l)| (*n, l.as_slice()))
    }

    /// Number of tagged containers.
    pub fn len(&self) -> usize {
        self.by_container.len()
    }

    /// Whether nothing is tagged.
    pub fn is_empty(&self) -> bool {
        self.by_container.is_empty()
    }
}

/// Disjoint visible/suppressed split of one set of containers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    /// Containers that stay on screen, in input order. Includes untagged ones.
    pub visible: Vec<NodeId>,
    /// Containers tagged only to other customers, in input order.
    pub suppressed: Vec<NodeId>,
}

/// Outcome of classifying under a filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// No filter: put the host's own layout back.
    Restore,
    /// Filter active: apply this split.
    Partition(Partition),
}

/// Split `containers` under `filter`.
///
/// Untagged containers stay visible; a container tagged to the active customer is visible even
/// when other customers tag it too; anything else tagged is suppressed.
pub fn classify(
    filter: &FilterTarget,
    hits: &TagHits,
    containers: impl IntoIterator<Item = NodeId>,
) -> Classification {
    let Some(active) = filter.customer() else {
        return Classification::Restore;
    };
    let mut partition = Partition::default();
    for container in containers {
        let customers = hits.customers(container);
        if customers.is_empty() || customers.iter().any(|c| c == active) {
            partition.visible.push(container);
        } else {
            partition.suppressed.push(container);
        }
    }
    Classification::Partition(partition)
}

#[cfg(test)]
#[path = "../../tests/unit/classify/mod.rs"]
mod tests;
