//! The rendering-surface boundary.
//!
//! The host owns the rendered tree; the engine only reads structure and geometry through
//! [`Surface`] and writes the three things it is allowed to touch: a container's offset, a
//! parent's height, and a container's suppressed flag.

pub mod memory;
pub mod rule;

use crate::foundation::core::{NodeId, Point, Rect};
use crate::foundation::error::TileResult;
use crate::surface::rule::MatchRule;

/// Handle for one subtree watch registered with [`Surface::observe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub u64);

/// Monotonic counter identifying one batch of the engine's own writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

/// What changed under a watched root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Nodes were mounted or unmounted.
    ChildList,
    /// Position, size or visibility of a node changed.
    Attributes,
}

/// One mutation notification delivered for a watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationRecord {
    /// The watch whose subtree changed.
    pub watch: WatchId,
    /// Kind of change.
    pub kind: MutationKind,
    /// The node whose children or attributes changed.
    pub target: NodeId,
    /// Set when the change was produced while the engine was writing under that generation.
    pub self_write: Option<Generation>,
}

/// Query and write access to an externally owned rendering surface.
pub trait Surface {
    /// Document root; every mounted node descends from it.
    fn root(&self) -> NodeId;

    /// Parent of a mounted node.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Children of a node in document order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Lowercase tag name.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    /// Attribute value (`id` and `class` included).
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Class membership.
    fn has_class(&self, node: NodeId, class: &str) -> bool;

    /// Whether the node is absolutely positioned by the host.
    fn is_positioned(&self, node: NodeId) -> bool;

    /// Whether the node is still part of the document.
    fn is_attached(&self, node: NodeId) -> bool;

    /// Observed box relative to the node's positioned parent.
    fn bounding_box(&self, node: NodeId) -> Option<Rect>;

    /// Inline offset (left/top) the host assigned.
    fn offset(&self, node: NodeId) -> Option<Point>;

    /// Overwrite the inline offset (`None` clears it).
    fn set_offset(&mut self, node: NodeId, offset: Option<Point>) -> TileResult<()>;

    /// Inline height.
    fn height(&self, node: NodeId) -> Option<f64>;

    /// Overwrite the inline height (`None` clears it).
    fn set_height(&mut self, node: NodeId, height: Option<f64>) -> TileResult<()>;

    /// Whether the engine flagged the node as suppressed.
    fn is_suppressed(&self, node: NodeId) -> bool;

    /// Flag or unflag a node as suppressed.
    fn set_suppressed(&mut self, node: NodeId, suppressed: bool) -> TileResult<()>;

    /// Start delivering mutation records for the subtree rooted at `root`.
    fn observe(&mut self, root: NodeId) -> WatchId;

    /// Stop delivering records for a watch. Unknown ids are ignored.
    fn unobserve(&mut self, watch: WatchId);

    /// Drain pending mutation records.
    fn take_records(&mut self) -> Vec<MutationRecord>;

    /// Stamp records produced from now on with `generation` (`None` ends the batch).
    fn stamp_self_writes(&mut self, generation: Option<Generation>);

    /// All descendants of `scope` (excluding `scope`) matching `rule`, in document order.
    fn match_all(&self, rule: &MatchRule, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if rule.matches(self, node) {
                out.push(node);
            }
            stack.extend(self.children(node).into_iter().rev());
        }
        out
    }

    /// Nearest inclusive ancestor matching `rule`.
    fn closest(&self, node: NodeId, rule: &MatchRule) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if rule.matches(self, n) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }
}
