//! Deterministic in-memory rendering surface.
//!
//! Used by the test-suite and the scenario replayer to stand in for a host page: it keeps a node
//! tree with attributes, classes and absolute geometry, and produces mutation records for watched
//! subtrees the way a DOM mutation observer would.

use std::collections::BTreeMap;

use crate::foundation::core::{NodeId, Point, Rect, Size};
use crate::foundation::error::{TileError, TileResult};
use crate::surface::{Generation, MutationKind, MutationRecord, Surface, WatchId};

/// Declarative description of a node subtree to mount.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeSpec {
    /// Tag name (lowercased on mount).
    pub tag: String,
    /// Attributes, `id` included.
    pub attrs: BTreeMap<String, String>,
    /// Class list.
    pub classes: Vec<String>,
    /// Absolutely positioned by the host.
    pub positioned: bool,
    /// Inline `left`.
    pub left: Option<f64>,
    /// Inline `top`.
    pub top: Option<f64>,
    /// Rendered width.
    pub width: f64,
    /// Rendered height; also the inline height when `inline_height` is unset.
    pub height: f64,
    /// Inline height when it differs from the rendered one.
    pub inline_height: Option<f64>,
    /// Child subtrees in document order.
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    /// A bare element.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    /// Add an attribute.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// Shorthand for the `id` attribute.
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    /// Add a class.
    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    /// Absolutely position at `(left, top)`.
    pub fn at(mut self, left: f64, top: f64) -> Self {
        self.positioned = true;
        self.left = Some(left);
        self.top = Some(top);
        self
    }

    /// Set the rendered size.
    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Append a child subtree.
    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Clone, Debug)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    classes: Vec<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    positioned: bool,
    offset: Option<Point>,
    size: Size,
    height: Option<f64>,
    suppressed: bool,
    detached: bool,
}

/// In-memory [`Surface`] implementation.
#[derive(Clone, Debug)]
pub struct MemorySurface {
    nodes: Vec<NodeData>,
    watches: BTreeMap<WatchId, NodeId>,
    next_watch: u64,
    records: Vec<MutationRecord>,
    stamp: Option<Generation>,
    writes: u64,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySurface {
    /// An empty document with a `body` root.
    pub fn new() -> Self {
        let root = NodeData {
            tag: "body".to_string(),
            attrs: BTreeMap::new(),
            classes: Vec::new(),
            parent: None,
            children: Vec::new(),
            positioned: false,
            offset: None,
            size: Size::ZERO,
            height: None,
            suppressed: false,
            detached: false,
        };
        Self {
            nodes: vec![root],
            watches: BTreeMap::new(),
            next_watch: 0,
            records: Vec::new(),
            stamp: None,
            writes: 0,
        }
    }

    /// Mount `spec` as the last child of `parent`; returns the new subtree root.
    pub fn mount(&mut self, parent: NodeId, spec: &NodeSpec) -> TileResult<NodeId> {
        if !self.is_attached(parent) {
            return Err(TileError::surface(format!(
                "cannot mount under detached node {parent}"
            )));
        }
        let id = self.build(parent, spec);
        self.node_mut(parent)?.children.push(id);
        self.record(parent, MutationKind::ChildList);
        Ok(id)
    }

    fn build(&mut self, parent: NodeId, spec: &NodeSpec) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        let offset = match (spec.left, spec.top) {
            (None, None) => None,
            (l, t) => Some(Point::new(l.unwrap_or(0.0), t.unwrap_or(0.0))),
        };
        self.nodes.push(NodeData {
            tag: spec.tag.to_ascii_lowercase(),
            attrs: spec.attrs.clone(),
            classes: spec.classes.clone(),
            parent: Some(parent),
            children: Vec::new(),
            positioned: spec.positioned,
            offset,
            size: Size::new(spec.width, spec.height),
            height: Some(spec.inline_height.unwrap_or(spec.height)),
            suppressed: false,
            detached: false,
        });
        let children: Vec<NodeId> = spec.children.iter().map(|c| self.build(id, c)).collect();
        self.nodes[id.0 as usize].children = children;
        id
    }

    /// Remove a subtree from the document. Its handles stay valid but report detached.
    pub fn unmount(&mut self, node: NodeId) -> TileResult<()> {
        if node == self.root() {
            return Err(TileError::surface("cannot unmount the document root"));
        }
        let parent = self
            .node(node)?
            .parent
            .ok_or_else(|| TileError::surface(format!("{node} has no parent")))?;
        let was_attached = self.is_attached(node);
        self.node_mut(parent)?.children.retain(|c| *c != node);
        self.node_mut(node)?.parent = None;
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            let data = &mut self.nodes[n.0 as usize];
            data.detached = true;
            stack.extend(data.children.iter().copied());
        }
        if was_attached {
            self.record(parent, MutationKind::ChildList);
        }
        Ok(())
    }

    /// Set (or replace) an attribute.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> TileResult<()> {
        self.node_mut(node)?
            .attrs
            .insert(name.to_string(), value.to_string());
        self.record(node, MutationKind::Attributes);
        Ok(())
    }

    /// First attached node whose `id` attribute equals `id`.
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        (0..self.nodes.len())
            .map(|i| NodeId(i as u64))
            .find(|n| {
                self.is_attached(*n)
                    && self.nodes[n.0 as usize].attrs.get("id").map(String::as_str) == Some(id)
            })
    }

    /// Number of registered watches; a leak shows up as a count that never drops.
    pub fn live_watches(&self) -> usize {
        self.watches.len()
    }

    /// Number of engine writes applied so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn node(&self, node: NodeId) -> TileResult<&NodeData> {
        self.nodes
            .get(node.0 as usize)
            .ok_or_else(|| TileError::surface(format!("unknown node {node}")))
    }

    fn node_mut(&mut self, node: NodeId) -> TileResult<&mut NodeData> {
        self.nodes
            .get_mut(node.0 as usize)
            .ok_or_else(|| TileError::surface(format!("unknown node {node}")))
    }

    fn writable(&mut self, node: NodeId) -> TileResult<&mut NodeData> {
        if !self.is_attached(node) {
            return Err(TileError::surface(format!("write to detached node {node}")));
        }
        self.writes += 1;
        self.node_mut(node)
    }

    fn record(&mut self, target: NodeId, kind: MutationKind) {
        let watching: Vec<WatchId> = self
            .watches
            .iter()
            .filter(|(_, root)| self.is_attached(**root) && self.contains(**root, target))
            .map(|(w, _)| *w)
            .collect();
        for watch in watching {
            self.records.push(MutationRecord {
                watch,
                kind,
                target,
                self_write: self.stamp,
            });
        }
    }
}

impl Surface for MemorySurface {
    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0 as usize).and_then(|n| n.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node.0 as usize)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.nodes.get(node.0 as usize).map(|n| n.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let data = self.nodes.get(node.0 as usize)?;
        if name == "class" && !data.classes.is_empty() {
            return Some(data.classes.join(" "));
        }
        data.attrs.get(name).cloned()
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.nodes
            .get(node.0 as usize)
            .is_some_and(|n| n.classes.iter().any(|c| c == class))
    }

    fn is_positioned(&self, node: NodeId) -> bool {
        self.nodes.get(node.0 as usize).is_some_and(|n| n.positioned)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.nodes.get(node.0 as usize).is_some_and(|n| !n.detached)
    }

    fn bounding_box(&self, node: NodeId) -> Option<Rect> {
        let data = self.nodes.get(node.0 as usize)?;
        if data.detached {
            return None;
        }
        let origin = data.offset.unwrap_or(Point::ZERO);
        Some(Rect::from_origin_size(origin, data.size))
    }

    fn offset(&self, node: NodeId) -> Option<Point> {
        self.nodes.get(node.0 as usize).and_then(|n| n.offset)
    }

    fn set_offset(&mut self, node: NodeId, offset: Option<Point>) -> TileResult<()> {
        self.writable(node)?.offset = offset;
        self.record(node, MutationKind::Attributes);
        Ok(())
    }

    fn height(&self, node: NodeId) -> Option<f64> {
        self.nodes.get(node.0 as usize).and_then(|n| n.height)
    }

    fn set_height(&mut self, node: NodeId, height: Option<f64>) -> TileResult<()> {
        let data = self.writable(node)?;
        data.height = height;
        if let Some(h) = height {
            data.size.height = h;
        }
        self.record(node, MutationKind::Attributes);
        Ok(())
    }

    fn is_suppressed(&self, node: NodeId) -> bool {
        self.nodes.get(node.0 as usize).is_some_and(|n| n.suppressed)
    }

    fn set_suppressed(&mut self, node: NodeId, suppressed: bool) -> TileResult<()> {
        self.writable(node)?.suppressed = suppressed;
        self.record(node, MutationKind::Attributes);
        Ok(())
    }

    fn observe(&mut self, root: NodeId) -> WatchId {
        let id = WatchId(self.next_watch);
        self.next_watch += 1;
        self.watches.insert(id, root);
        id
    }

    fn unobserve(&mut self, watch: WatchId) {
        self.watches.remove(&watch);
    }

    fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    fn stamp_self_writes(&mut self, generation: Option<Generation>) {
        self.stamp = generation;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surface/memory.rs"]
mod tests;
