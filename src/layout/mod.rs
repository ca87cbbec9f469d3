//! Geometry inference and gap-free reflow of virtualized collections.

/// Grid and list parameter inference.
pub mod geometry;
/// Snapshotting, compaction and restoration.
pub mod reflow;

pub use geometry::{LayoutModel, ListModel, infer_grid, infer_list};
pub use reflow::{GroupShape, ReflowOutcome, ReflowStats, SnapshotBook, reflow, restore};
