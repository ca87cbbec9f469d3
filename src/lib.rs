#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! Per-customer tile tagging and gap-free filtering for externally virtualized grids and lists.
//!
//! The host renders its collections however it likes; this crate watches them through a
//! [`surface::Surface`], classifies every display container against the tags stored for the page
//! and the active customer filter, and compacts the survivors into a gap-free layout. Clearing the
//! filter restores the host's own positions exactly.

pub mod bus;
pub mod classify;
pub mod foundation;
pub mod layout;
pub mod resolve;
pub mod session;
pub mod stabilize;
pub mod store;
pub mod surface;

pub use bus::{BusMessage, Envelope, LocalBus, MessageBus};
pub use classify::{Classification, Partition, TagHits, classify};
pub use foundation::core::{FilterTarget, FrameId, Millis, NodeId, PageKey, Point, Rect, Size};
pub use foundation::error::{TileError, TileResult};
pub use foundation::opts::{
    CollectionKind, CollectionProfile, GeometryOpts, ReconcilerOpts, ResolveOpts, StabilizeOpts,
};
pub use resolve::{Resolver, derive_match_rule};
pub use session::{FilterState, ReplayReport, Reconciler, Scenario, SharedServices};
pub use store::kv::{KvStore, MemoryKv};
pub use store::prefs::{CycleDirection, Preferences};
pub use store::tags::{TagRecord, TagSet, TagStore};
pub use surface::Surface;
pub use surface::memory::{MemorySurface, NodeSpec};
