use std::collections::HashMap;

use crate::classify::Partition;
use crate::foundation::core::{NodeId, Point, Rect};
use crate::foundation::opts::GeometryOpts;
use crate::layout::geometry::{ListModel, infer_grid, infer_list};
use crate::surface::Surface;

/// Pre-reflow state of every container and parent the engine has written to.
///
/// Entries are recorded once and survive repeated reflows, so a restore always goes back to what
/// the host itself rendered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotBook {
    containers: HashMap<NodeId, ContainerSnapshot>,
    parents: HashMap<NodeId, Option<f64>>,
}

impl SnapshotBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a container's inline offset and rendered origin unless already remembered.
    /// Returns `true` when recorded.
    ///
    /// Only the offset is written back on restore; the origin feeds later reflows.
    pub fn record_container(&mut self, node: NodeId, offset: Option<Point>, origin: Point) -> bool {
        if self.containers.contains_key(&node) {
            return false;
        }
        self.containers.insert(node, ContainerSnapshot { offset, origin });
        true
    }

    /// Remember a parent's height unless already remembered.
    pub fn record_parent(&mut self, node: NodeId, height: Option<f64>) -> bool {
        if self.parents.contains_key(&node) {
            return false;
        }
        self.parents.insert(node, height);
        true
    }

    /// Snapshot offset of a container: `None` when not snapshotted.
    pub fn original_offset(&self, node: NodeId) -> Option<Option<Point>> {
        self.containers.get(&node).map(|c| c.offset)
    }

    /// Snapshot rendered origin of a container.
    pub fn original_origin(&self, node: NodeId) -> Option<Point> {
        self.containers.get(&node).map(|c| c.origin)
    }

    /// Snapshot height of a parent.
    pub fn original_height(&self, node: NodeId) -> Option<Option<f64>> {
        self.parents.get(&node).copied()
    }

    /// Drop entries for nodes the host has unmounted.
    pub fn prune<S: Surface + ?Sized>(&mut self, surface: &S) -> usize {
        let before = self.len();
        self.containers.retain(|n, _| surface.is_attached(*n));
        self.parents.retain(|n, _| surface.is_attached(*n));
        before - self.len()
    }

    /// Number of snapshotted nodes.
    pub fn len(&self) -> usize {
        self.containers.len() + self.parents.len()
    }

    /// Whether nothing is snapshotted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A container as the host left it.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ContainerSnapshot {
    /// Inline offset; `None` when the host positions the node through a stylesheet.
    offset: Option<Point>,
    /// Where the node was rendered.
    origin: Point,
}

/// Shape-specific reflow input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupShape {
    /// Two-dimensional grid.
    Grid,
    /// Single-column list.
    List,
}

/// What one reflow pass did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReflowStats {
    /// Visible containers placed in a slot.
    pub placed: usize,
    /// Suppressed containers parked off-screen.
    pub parked: usize,
    /// Containers skipped because they failed the defensive checks or could not be written.
    pub skipped: usize,
    /// Height assigned to the shared parent.
    pub parent_height: f64,
}

/// Result of a reflow attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum ReflowOutcome {
    /// Nothing usable is mounted; try again on the next signal.
    NotReady,
    /// Positions were applied.
    Applied(ReflowStats),
}

/// Position a container was rendered at by the host: the snapshot when present, else the live one.
pub fn original_box<S: Surface + ?Sized>(
    surface: &S,
    book: &SnapshotBook,
    node: NodeId,
) -> Option<Rect> {
    let live = surface.bounding_box(node)?;
    let origin = book
        .original_origin(node)
        .unwrap_or_else(|| surface.offset(node).unwrap_or(live.origin()));
    Some(Rect::from_origin_size(origin, live.size()))
}

/// Compact `partition` inside `parent`, snapshotting everything it touches first.
///
/// Containers that are not direct children of `parent` are skipped; writes that fail (the host
/// unmounted the node mid-pass) count as skipped too.
#[tracing::instrument(skip_all, fields(%parent, ?shape, visible = partition.visible.len(), suppressed = partition.suppressed.len()))]
pub fn reflow<S: Surface + ?Sized>(
    surface: &mut S,
    parent: NodeId,
    shape: GroupShape,
    partition: &Partition,
    book: &mut SnapshotBook,
    opts: &GeometryOpts,
) -> ReflowOutcome {
    let mut stats = ReflowStats::default();
    let mut visible: Vec<(NodeId, Rect)> = Vec::with_capacity(partition.visible.len());
    let mut suppressed: Vec<(NodeId, Rect)> = Vec::with_capacity(partition.suppressed.len());
    for (list, out) in [
        (&partition.visible, &mut visible),
        (&partition.suppressed, &mut suppressed),
    ] {
        for node in list {
            let member = surface.is_attached(*node) && surface.parent(*node) == Some(parent);
            match original_box(surface, book, *node).filter(|_| member) {
                Some(rect) => out.push((*node, rect)),
                None => {
                    tracing::warn!(%node, "skipping container outside the reflow group");
                    stats.skipped += 1;
                }
            }
        }
    }
    visible.sort_by(|(na, a), (nb, b)| {
        a.y0.total_cmp(&b.y0)
            .then(a.x0.total_cmp(&b.x0))
            .then(na.cmp(nb))
    });

    let slots: Vec<Point> = match shape {
        GroupShape::Grid => {
            let boxes: Vec<Rect> = visible.iter().chain(&suppressed).map(|(_, r)| *r).collect();
            let Some(model) = infer_grid(&boxes, opts) else {
                return ReflowOutcome::NotReady;
            };
            stats.parent_height = model.height_for(visible.len());
            (0..visible.len()).map(|i| model.slot(i)).collect()
        }
        GroupShape::List => {
            let Some(model) = list_model(surface, &visible, &suppressed, opts) else {
                return ReflowOutcome::NotReady;
            };
            stats.parent_height = model.height_for(visible.len(), opts.list_safety_buffer_px);
            visible
                .iter()
                .enumerate()
                .map(|(i, (_, r))| Point::new(r.x0, model.slot_top(i)))
                .collect()
        }
    };

    for ((node, rect), slot) in visible.iter().zip(slots) {
        match place(surface, book, *node, rect.origin(), Some(slot), false) {
            Ok(()) => stats.placed += 1,
            Err(e) => {
                tracing::debug!(%node, error = %e, "could not place container");
                stats.skipped += 1;
            }
        }
    }
    let parked = Point::new(opts.offscreen_px, opts.offscreen_px);
    for (node, rect) in &suppressed {
        match place(surface, book, *node, rect.origin(), Some(parked), true) {
            Ok(()) => stats.parked += 1,
            Err(e) => {
                tracing::debug!(%node, error = %e, "could not park container");
                stats.skipped += 1;
            }
        }
    }

    book.record_parent(parent, surface.height(parent));
    if surface.height(parent) != Some(stats.parent_height)
        && let Err(e) = surface.set_height(parent, Some(stats.parent_height))
    {
        tracing::debug!(error = %e, "could not resize reflow parent");
    }
    tracing::debug!(?stats, "reflowed group");
    ReflowOutcome::Applied(stats)
}

/// Put every snapshotted node back exactly as the host left it and clear the book.
///
/// Detached nodes are dropped silently. Returns how many nodes were restored.
#[tracing::instrument(skip_all, fields(snapshots = book.len()))]
pub fn restore<S: Surface + ?Sized>(surface: &mut S, book: &mut SnapshotBook) -> usize {
    let mut restored = 0usize;
    let mut containers: Vec<_> = book.containers.drain().collect();
    containers.sort_by_key(|(n, _)| *n);
    for (node, ContainerSnapshot { offset, .. }) in containers {
        if !surface.is_attached(node) {
            continue;
        }
        let res = surface
            .set_offset(node, offset)
            .and_then(|()| surface.set_suppressed(node, false));
        match res {
            Ok(()) => restored += 1,
            Err(e) => tracing::debug!(%node, error = %e, "could not restore container"),
        }
    }
    let mut parents: Vec<_> = book.parents.drain().collect();
    parents.sort_by_key(|(n, _)| *n);
    for (node, height) in parents {
        if !surface.is_attached(node) {
            continue;
        }
        match surface.set_height(node, height) {
            Ok(()) => restored += 1,
            Err(e) => tracing::debug!(%node, error = %e, "could not restore parent height"),
        }
    }
    tracing::debug!(restored, "restored host layout");
    restored
}

fn list_model<S: Surface + ?Sized>(
    surface: &S,
    visible: &[(NodeId, Rect)],
    suppressed: &[(NodeId, Rect)],
    opts: &GeometryOpts,
) -> Option<ListModel> {
    let (first, first_box) = visible.first().or_else(|| suppressed.first())?;
    let base = if visible.is_empty() { 0.0 } else { first_box.y0 };
    let height = surface
        .height(*first)
        .or_else(|| Some(first_box.height()).filter(|h| *h > 0.0));
    Some(infer_list(base, height, opts))
}

fn place<S: Surface + ?Sized>(
    surface: &mut S,
    book: &mut SnapshotBook,
    node: NodeId,
    origin: Point,
    offset: Option<Point>,
    suppressed: bool,
) -> crate::foundation::error::TileResult<()> {
    book.record_container(node, surface.offset(node), origin);
    if surface.offset(node) != offset {
        surface.set_offset(node, offset)?;
    }
    if surface.is_suppressed(node) != suppressed {
        surface.set_suppressed(node, suppressed)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/layout/reflow.rs"]
mod tests;
