use crate::foundation::core::{Point, Rect};
use crate::foundation::opts::GeometryOpts;

/// Grid parameters inferred from observed container boxes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutModel {
    /// Position of the top-left item; the host may inset it.
    pub origin: Point,
    /// Horizontal pitch between columns.
    pub column_width: f64,
    /// Vertical pitch between rows.
    pub row_height: f64,
    /// Items per row, at least 1.
    pub columns_per_row: usize,
}

impl LayoutModel {
    /// Slot of the `index`-th visible item.
    pub fn slot(&self, index: usize) -> Point {
        let col = index % self.columns_per_row;
        let row = index / self.columns_per_row;
        Point::new(
            self.origin.x + col as f64 * self.column_width,
            self.origin.y + row as f64 * self.row_height,
        )
    }

    /// Parent height needed for `count` visible items.
    pub fn height_for(&self, count: usize) -> f64 {
        count.div_ceil(self.columns_per_row) as f64 * self.row_height
    }
}

/// One-dimensional model of a single-column list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListModel {
    /// Top of the first slot (the first visible item's original top).
    pub base_offset: f64,
    /// Height of every slot.
    pub row_height: f64,
}

impl ListModel {
    /// Top of the `index`-th visible item.
    pub fn slot_top(&self, index: usize) -> f64 {
        self.base_offset + index as f64 * self.row_height
    }

    /// Parent height for `count` visible items, including the eviction safety buffer.
    pub fn height_for(&self, count: usize, safety_buffer: f64) -> f64 {
        self.base_offset + count as f64 * self.row_height + safety_buffer
    }
}

/// Infer grid parameters from the boxes of every mounted container of a group.
///
/// Boxes parked off-screen (negative coordinates) are ignored. `None` means nothing usable is
/// mounted yet and the reflow should wait.
pub fn infer_grid(boxes: &[Rect], opts: &GeometryOpts) -> Option<LayoutModel> {
    let mut items: Vec<Rect> = boxes
        .iter()
        .copied()
        .filter(|r| r.x0 >= 0.0 && r.y0 >= 0.0 && r.x0.is_finite() && r.y0.is_finite())
        .collect();
    if items.is_empty() {
        return None;
    }
    items.sort_by(|a, b| a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0)));

    let first = items[0];
    let noise = opts.row_noise_px;
    let mut first_row: Vec<Rect> = items
        .iter()
        .copied()
        .filter(|r| r.y0 - first.y0 < noise || r.y0 == first.y0)
        .collect();
    // Tops wobble inside the noise band; column deltas need left-to-right order.
    first_row.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    let columns_per_row = first_row.len().max(1);

    let column_width = first_row
        .windows(2)
        .map(|w| w[1].x0 - w[0].x0)
        .filter(|d| *d > 0.0)
        .min_by(f64::total_cmp)
        .unwrap_or(first.width() + opts.fallback_gap_px);

    let row_height = min_row_delta(&items, noise).unwrap_or(first.height() + opts.fallback_gap_px);

    let model = LayoutModel {
        origin: first.origin(),
        column_width,
        row_height,
        columns_per_row,
    };
    tracing::debug!(?model, items = items.len(), "inferred grid");
    Some(model)
}

/// Infer list parameters from the first visible item's original top and a measured item height.
pub fn infer_list(first_top: f64, item_height: Option<f64>, opts: &GeometryOpts) -> ListModel {
    let row_height = item_height
        .filter(|h| h.is_finite() && *h > 0.0)
        .unwrap_or(opts.list_item_height_px);
    ListModel {
        base_offset: first_top.max(0.0),
        row_height,
    }
}

// `items` is sorted by top, so the first later item clearing the noise floor is the closest one.
fn min_row_delta(items: &[Rect], noise: f64) -> Option<f64> {
    let mut best: Option<f64> = None;
    for (i, a) in items.iter().enumerate() {
        if let Some(d) = items[i + 1..]
            .iter()
            .map(|b| b.y0 - a.y0)
            .find(|d| *d > noise)
        {
            best = Some(best.map_or(d, |b| b.min(d)));
        }
    }
    best
}

#[cfg(test)]
#[path = "../../tests/unit/layout/geometry.rs"]
mod tests;
